use drift_domain::token;
use drift_storage::models::{LibraryEntry, STATUS_ACTIVE};

use crate::{DriftService, ServiceError, ServiceResult};

/// Hard cap on one bulk-import batch.
pub const BULK_BATCH_CAP: usize = 50;
/// Base64 data URIs above this many characters are refused outright.
const MAX_IMAGE_DATA_CHARS: usize = 5_000_000;

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
	#[serde(rename = "type")]
	pub kind: String,
	pub title: Option<String>,
	pub text_content: Option<String>,
	pub image_data: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkAddReport {
	pub results: Vec<BulkAddResult>,
	pub summary: BulkAddSummary,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BulkAddResult {
	pub url: String,
	pub status: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BulkAddSummary {
	pub added: usize,
	pub duplicates: usize,
	pub errors: usize,
}

impl DriftService {
	/// Save a text note or an uploaded image. Neither goes anywhere near the
	/// unfurler; categories come from the title and text alone.
	pub async fn upload(&self, user_id: &str, req: UploadRequest) -> ServiceResult<LibraryEntry> {
		let (content_type, text_content, image_data) = match req.kind.as_str() {
			"text" => {
				let text = req
					.text_content
					.as_deref()
					.map(str::trim)
					.filter(|text| !text.is_empty())
					.ok_or_else(|| {
						ServiceError::validation("textContent is required for text uploads.")
					})?;
				("text", Some(text.to_string()), None)
			},
			"image" => {
				let data = req.image_data.as_deref().filter(|data| !data.is_empty()).ok_or_else(
					|| ServiceError::validation("imageData is required for image uploads."),
				)?;
				if !data.starts_with("data:image/") {
					return Err(ServiceError::validation(
						"imageData must be a base64 image data URI.",
					));
				}
				if data.len() > MAX_IMAGE_DATA_CHARS {
					return Err(ServiceError::validation("imageData is too large."));
				}
				("image", None, Some(data.to_string()))
			},
			_ => {
				return Err(ServiceError::validation("type must be image or text."));
			},
		};

		let title = req.title.as_deref().map(str::trim).filter(|t| !t.is_empty());
		let labels = self
			.categorize_with_fallback(
				title.unwrap_or_default(),
				text_content.as_deref().unwrap_or_default(),
			)
			.await;
		let joined_labels = labels.join(" ");
		let embedding_source = [
			title.unwrap_or_default(),
			text_content.as_deref().unwrap_or_default(),
			joined_labels.as_str(),
		]
		.join("\n");
		let embedding = self.embed_text(embedding_source.trim()).await;

		let entry = sqlx::query_as::<_, LibraryEntry>(
			"INSERT INTO links \
			 (id, user_id, title, content_type, text_content, image_data, categories, \
			  embedding, status) \
			 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9) \
			 RETURNING *",
		)
		.bind(token::new_id())
		.bind(user_id)
		.bind(title)
		.bind(content_type)
		.bind(&text_content)
		.bind(&image_data)
		.bind(&labels)
		.bind(&embedding)
		.bind(STATUS_ACTIVE)
		.fetch_one(&self.db.pool)
		.await?;
		Ok(entry)
	}

	/// Import up to [`BULK_BATCH_CAP`] URLs in one call, reporting per-URL
	/// outcomes instead of failing the batch on the first bad link.
	pub async fn bulk_add(&self, user_id: &str, urls: &[String]) -> ServiceResult<BulkAddReport> {
		if urls.is_empty() {
			return Err(ServiceError::validation("urls must be non-empty."));
		}
		if urls.len() > BULK_BATCH_CAP {
			return Err(ServiceError::validation("At most 50 URLs per batch."));
		}

		let mut results = Vec::with_capacity(urls.len());
		let mut summary = BulkAddSummary { added: 0, duplicates: 0, errors: 0 };
		for url in urls {
			let status = match self.add_link(user_id, url).await {
				Ok(_) => {
					summary.added += 1;
					"added"
				},
				Err(ServiceError::DuplicateUrl { .. }) => {
					summary.duplicates += 1;
					"duplicate"
				},
				Err(_) => {
					summary.errors += 1;
					"error"
				},
			};
			results.push(BulkAddResult { url: url.clone(), status: status.to_string() });
		}
		Ok(BulkAddReport { results, summary })
	}
}

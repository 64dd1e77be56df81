use sqlx::QueryBuilder;
use tracing::warn;

use drift_domain::{categories, token};
use drift_providers::{
	guard::{self, FetchError},
	unfurl::{self as unfurler, UnfurlResult},
};
use drift_storage::models::{LibraryEntry, STATUS_ACTIVE, STATUS_ARCHIVED};

use crate::{DriftService, ServiceError, ServiceResult};

const DEFAULT_LIST_LIMIT: i64 = 100;
const MAX_LIST_LIMIT: i64 = 500;

/// Response shape for a library entry. Embeddings never leave the server,
/// so they have no field here.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkView {
	pub id: String,
	pub user_id: String,
	pub url: Option<String>,
	pub title: Option<String>,
	pub description: Option<String>,
	pub thumbnail: Option<String>,
	pub site_name: Option<String>,
	pub content_type: String,
	pub text_content: Option<String>,
	pub image_data: Option<String>,
	pub categories: Vec<String>,
	pub ai_summary: Option<String>,
	pub metadata: serde_json::Value,
	pub status: String,
	#[serde(with = "crate::time_serde")]
	pub added_at: time::OffsetDateTime,
	#[serde(with = "crate::time_serde::option")]
	pub archived_at: Option<time::OffsetDateTime>,
	#[serde(with = "crate::time_serde::option")]
	pub last_shown_at: Option<time::OffsetDateTime>,
	pub shown_count: i64,
	pub engagement_score: f64,
	pub avg_dwell_ms: f64,
	pub open_count: i64,
	#[serde(with = "crate::time_serde::option")]
	pub liked_at: Option<time::OffsetDateTime>,
}

impl From<LibraryEntry> for LinkView {
	fn from(entry: LibraryEntry) -> Self {
		Self {
			id: entry.id,
			user_id: entry.user_id,
			url: entry.url,
			title: entry.title,
			description: entry.description,
			thumbnail: entry.thumbnail,
			site_name: entry.site_name,
			content_type: entry.content_type,
			text_content: entry.text_content,
			image_data: entry.image_data,
			categories: entry.categories,
			ai_summary: entry.ai_summary,
			metadata: entry.metadata,
			status: entry.status,
			added_at: entry.added_at,
			archived_at: entry.archived_at,
			last_shown_at: entry.last_shown_at,
			shown_count: entry.shown_count,
			engagement_score: entry.engagement_score,
			avg_dwell_ms: entry.avg_dwell_ms,
			open_count: entry.open_count,
			liked_at: entry.liked_at,
		}
	}
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct LinkStats {
	pub active: i64,
	pub archived: i64,
	pub total: i64,
	pub categories: Vec<String>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkPatch {
	pub status: Option<String>,
	pub shown_count: Option<i64>,
	pub increment_shown: Option<bool>,
	pub liked: Option<bool>,
}

impl DriftService {
	/// Save a URL: unfurl it under the SSRF guard, classify and embed the
	/// preview, and insert the entry. An already-saved URL is a conflict
	/// carrying the existing row.
	pub async fn add_link(&self, user_id: &str, raw_url: &str) -> ServiceResult<LibraryEntry> {
		let url = parse_link_url(raw_url)?;

		if let Some(existing) = self.find_by_url(user_id, url.as_str()).await? {
			return Err(ServiceError::DuplicateUrl { existing: Box::new(existing) });
		}

		let unfurled = match self.providers.unfurler.unfurl(&url).await {
			Ok(result) => result,
			Err(err @ FetchError::Unsafe { .. }) => return Err(err.into()),
			Err(FetchError::Upstream { message }) => {
				warn!(error = %message, "Unfurl failed; falling back to bare metadata.");
				unfurler::fallback_result(&url)
			},
		};

		let labels = self
			.categorize_with_fallback(
				unfurled.title.as_deref().unwrap_or_default(),
				unfurled.description.as_deref().unwrap_or_default(),
			)
			.await;
		let embedding = self.embed_text(&embedding_input(&unfurled, &labels)).await;

		let entry_id = token::new_id();
		let inserted = sqlx::query_as::<_, LibraryEntry>(
			"INSERT INTO links \
			 (id, user_id, url, title, description, thumbnail, site_name, content_type, \
			  categories, embedding, status) \
			 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11) \
			 RETURNING *",
		)
		.bind(&entry_id)
		.bind(user_id)
		.bind(url.as_str())
		.bind(&unfurled.title)
		.bind(&unfurled.description)
		.bind(&unfurled.thumbnail)
		.bind(&unfurled.site_name)
		.bind(&unfurled.content_type)
		.bind(&labels)
		.bind(&embedding)
		.bind(STATUS_ACTIVE)
		.fetch_one(&self.db.pool)
		.await;

		match inserted {
			Ok(entry) => Ok(entry),
			Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
				// Lost a race with a concurrent save of the same URL.
				match self.find_by_url(user_id, url.as_str()).await? {
					Some(existing) =>
						Err(ServiceError::DuplicateUrl { existing: Box::new(existing) }),
					None => Err(ServiceError::validation("URL could not be saved.")),
				}
			},
			Err(err) => Err(err.into()),
		}
	}

	pub async fn list_links(
		&self,
		user_id: &str,
		status: Option<&str>,
		limit: Option<i64>,
	) -> ServiceResult<Vec<LibraryEntry>> {
		let status = match status {
			None => STATUS_ACTIVE,
			Some(value) if value == STATUS_ACTIVE || value == STATUS_ARCHIVED => value,
			Some(_) => {
				return Err(ServiceError::validation("status must be active or archived."));
			},
		};
		let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);

		let entries = sqlx::query_as::<_, LibraryEntry>(
			"SELECT * FROM links WHERE user_id = $1 AND status = $2 \
			 ORDER BY added_at DESC LIMIT $3",
		)
		.bind(user_id)
		.bind(status)
		.bind(limit)
		.fetch_all(&self.db.pool)
		.await?;
		Ok(entries)
	}

	pub async fn link_stats(&self, user_id: &str) -> ServiceResult<LinkStats> {
		let (active, archived, total): (i64, i64, i64) = sqlx::query_as(
			"SELECT COUNT(*) FILTER (WHERE status = 'active'), \
			        COUNT(*) FILTER (WHERE status = 'archived'), \
			        COUNT(*) \
			 FROM links WHERE user_id = $1",
		)
		.bind(user_id)
		.fetch_one(&self.db.pool)
		.await?;

		let categories: Vec<String> = sqlx::query_scalar(
			"SELECT DISTINCT unnest(categories) FROM links \
			 WHERE user_id = $1 AND status = 'active' ORDER BY 1",
		)
		.bind(user_id)
		.fetch_all(&self.db.pool)
		.await?;

		Ok(LinkStats { active, archived, total, categories })
	}

	pub async fn update_link(
		&self,
		user_id: &str,
		link_id: &str,
		patch: LinkPatch,
	) -> ServiceResult<LibraryEntry> {
		let increment_shown = patch.increment_shown == Some(true);
		if patch.status.is_none()
			&& patch.shown_count.is_none()
			&& !increment_shown
			&& patch.liked.is_none()
		{
			return Err(ServiceError::validation("Nothing to update."));
		}

		let mut builder = QueryBuilder::new("UPDATE links SET ");
		let mut fields = builder.separated(", ");
		if let Some(status) = &patch.status {
			match status.as_str() {
				STATUS_ACTIVE => {
					fields.push("status = 'active'");
					fields.push("archived_at = NULL");
				},
				STATUS_ARCHIVED => {
					fields.push("status = 'archived'");
					fields.push("archived_at = now()");
				},
				_ => {
					return Err(ServiceError::validation("status must be active or archived."));
				},
			}
		}
		if let Some(shown_count) = patch.shown_count {
			if shown_count < 0 {
				return Err(ServiceError::validation("shownCount must be non-negative."));
			}
			// shown_count only ever grows.
			fields.push("shown_count = GREATEST(shown_count, ");
			fields.push_bind_unseparated(shown_count);
			fields.push_unseparated(")");
		}
		if increment_shown {
			fields.push("shown_count = shown_count + 1");
			fields.push("last_shown_at = now()");
		}
		if let Some(liked) = patch.liked {
			if liked {
				fields.push("liked_at = COALESCE(liked_at, now())");
			} else {
				fields.push("liked_at = NULL");
			}
		}

		builder.push(" WHERE id = ");
		builder.push_bind(link_id);
		builder.push(" AND user_id = ");
		builder.push_bind(user_id);
		builder.push(" RETURNING *");

		let updated: Option<LibraryEntry> =
			builder.build_query_as().fetch_optional(&self.db.pool).await?;
		updated.ok_or(ServiceError::NotFound)
	}

	pub async fn delete_link(&self, user_id: &str, link_id: &str) -> ServiceResult<()> {
		let result = sqlx::query("DELETE FROM links WHERE id = $1 AND user_id = $2")
			.bind(link_id)
			.bind(user_id)
			.execute(&self.db.pool)
			.await?;
		if result.rows_affected() == 0 {
			return Err(ServiceError::NotFound);
		}
		Ok(())
	}

	pub async fn unfurl_preview(&self, raw_url: &str) -> ServiceResult<UnfurlResult> {
		let url = parse_link_url(raw_url)?;
		match self.providers.unfurler.unfurl(&url).await {
			Ok(result) => Ok(result),
			Err(err @ FetchError::Unsafe { .. }) => Err(err.into()),
			Err(FetchError::Upstream { message }) => {
				warn!(error = %message, "Unfurl failed; returning fallback preview.");
				Ok(unfurler::fallback_result(&url))
			},
		}
	}

	pub(crate) async fn find_by_url(
		&self,
		user_id: &str,
		url: &str,
	) -> ServiceResult<Option<LibraryEntry>> {
		let entry = sqlx::query_as::<_, LibraryEntry>(
			"SELECT * FROM links WHERE user_id = $1 AND url = $2",
		)
		.bind(user_id)
		.bind(url)
		.fetch_optional(&self.db.pool)
		.await?;
		Ok(entry)
	}

	pub(crate) async fn categorize_with_fallback(
		&self,
		title: &str,
		description: &str,
	) -> Vec<String> {
		match self
			.providers
			.categorizer
			.categorize(&self.cfg.providers.categorizer, title, description)
			.await
		{
			Ok(labels) if !labels.is_empty() => labels,
			Ok(_) => vec![categories::FALLBACK_CATEGORY.to_string()],
			Err(err) => {
				warn!(error = %err, "Categorizer failed; using the fallback category.");
				vec![categories::FALLBACK_CATEGORY.to_string()]
			},
		}
	}

	pub(crate) async fn embed_text(&self, text: &str) -> Option<Vec<f32>> {
		if text.trim().is_empty() {
			return None;
		}
		let texts = [text.to_string()];
		let embedded =
			self.providers.embedding.embed(&self.cfg.providers.embedding, &texts).await;
		match embedded {
			Ok(mut vectors) if !vectors.is_empty() => Some(vectors.remove(0)),
			Ok(_) => None,
			Err(err) => {
				warn!(error = %err, "Embedding failed; entry stays without a vector.");
				None
			},
		}
	}
}

fn parse_link_url(raw: &str) -> ServiceResult<reqwest::Url> {
	let url = reqwest::Url::parse(raw.trim())
		.map_err(|_| ServiceError::validation("URL is not valid."))?;
	guard::validate_url(&url)?;
	Ok(url)
}

fn embedding_input(unfurled: &UnfurlResult, labels: &[String]) -> String {
	[
		unfurled.title.clone().unwrap_or_default(),
		unfurled.description.clone().unwrap_or_default(),
		labels.join(" "),
		unfurled.site_name.clone().unwrap_or_default(),
	]
	.join("\n")
	.trim()
	.to_string()
}

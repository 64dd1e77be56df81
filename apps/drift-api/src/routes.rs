use axum::{
	Json, Router,
	extract::{Path, Query, State},
	http::{StatusCode, header},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};

use drift_service::{
	AuthCredentials, EngagementBatch, FeedQuery, LinkPatch, LinkView, ServiceError, UploadRequest,
};

use crate::{
	session::{self, CurrentUser, MaybeUser},
	state::AppState,
};

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/auth/signup", post(signup))
		.route("/auth/login", post(login))
		.route("/auth/me", get(me))
		.route("/links", post(links_create).get(links_list))
		.route("/links/{id}", axum::routing::patch(links_update).delete(links_delete))
		.route("/upload", post(upload_create).put(upload_bulk))
		.route("/unfurl", post(unfurl))
		.route("/engagement", post(engagement))
		.route("/feed", get(feed))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn signup(
	State(state): State<AppState>,
	Json(payload): Json<AuthCredentials>,
) -> Result<Response, ApiError> {
	let profile = state.service.signup(payload).await?;
	let cookie = issue_session(&state, &profile.id)?;
	Ok((StatusCode::CREATED, [(header::SET_COOKIE, cookie)], Json(profile)).into_response())
}

async fn login(
	State(state): State<AppState>,
	Json(payload): Json<AuthCredentials>,
) -> Result<Response, ApiError> {
	let profile = state.service.login(payload).await?;
	let cookie = issue_session(&state, &profile.id)?;
	Ok(([(header::SET_COOKIE, cookie)], Json(profile)).into_response())
}

async fn me(
	State(state): State<AppState>,
	MaybeUser(user_id): MaybeUser,
) -> Result<Json<serde_json::Value>, ApiError> {
	let profile = match user_id {
		Some(user_id) => state.service.user_profile(&user_id).await?,
		None => None,
	};
	Ok(Json(serde_json::json!({ "user": profile })))
}

#[derive(Debug, Deserialize)]
struct CreateLinkRequest {
	url: String,
}

async fn links_create(
	State(state): State<AppState>,
	CurrentUser(user_id): CurrentUser,
	Json(payload): Json<CreateLinkRequest>,
) -> Result<Response, ApiError> {
	let entry = state.service.add_link(&user_id, &payload.url).await?;
	Ok((StatusCode::CREATED, Json(LinkView::from(entry))).into_response())
}

#[derive(Debug, Deserialize)]
struct LinksQuery {
	status: Option<String>,
	limit: Option<i64>,
	stats: Option<bool>,
}

async fn links_list(
	State(state): State<AppState>,
	CurrentUser(user_id): CurrentUser,
	Query(params): Query<LinksQuery>,
) -> Result<Response, ApiError> {
	if params.stats == Some(true) {
		let stats = state.service.link_stats(&user_id).await?;
		return Ok(Json(stats).into_response());
	}
	let entries =
		state.service.list_links(&user_id, params.status.as_deref(), params.limit).await?;
	let views: Vec<LinkView> = entries.into_iter().map(LinkView::from).collect();
	Ok(Json(views).into_response())
}

async fn links_update(
	State(state): State<AppState>,
	CurrentUser(user_id): CurrentUser,
	Path(link_id): Path<String>,
	Json(patch): Json<LinkPatch>,
) -> Result<Json<LinkView>, ApiError> {
	let entry = state.service.update_link(&user_id, &link_id, patch).await?;
	Ok(Json(entry.into()))
}

async fn links_delete(
	State(state): State<AppState>,
	CurrentUser(user_id): CurrentUser,
	Path(link_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
	state.service.delete_link(&user_id, &link_id).await?;
	Ok(Json(serde_json::json!({ "success": true })))
}

async fn upload_create(
	State(state): State<AppState>,
	CurrentUser(user_id): CurrentUser,
	Json(payload): Json<UploadRequest>,
) -> Result<Response, ApiError> {
	let entry = state.service.upload(&user_id, payload).await?;
	Ok((StatusCode::CREATED, Json(LinkView::from(entry))).into_response())
}

#[derive(Debug, Deserialize)]
struct BulkAddRequest {
	urls: Vec<String>,
}

async fn upload_bulk(
	State(state): State<AppState>,
	CurrentUser(user_id): CurrentUser,
	Json(payload): Json<BulkAddRequest>,
) -> Result<Json<drift_service::BulkAddReport>, ApiError> {
	let report = state.service.bulk_add(&user_id, &payload.urls).await?;
	Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct UnfurlRequest {
	url: String,
}

async fn unfurl(
	State(state): State<AppState>,
	CurrentUser(_user_id): CurrentUser,
	Json(payload): Json<UnfurlRequest>,
) -> Result<Json<drift_providers::unfurl::UnfurlResult>, ApiError> {
	let preview = state.service.unfurl_preview(&payload.url).await?;
	Ok(Json(preview))
}

async fn engagement(
	State(state): State<AppState>,
	CurrentUser(user_id): CurrentUser,
	Json(batch): Json<EngagementBatch>,
) -> Result<Json<drift_service::EngagementReceipt>, ApiError> {
	let receipt = state.service.ingest_engagements(&user_id, batch).await?;
	Ok(Json(receipt))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedParams {
	category: Option<String>,
	limit: Option<u32>,
	offset: Option<u32>,
	session_id: Option<String>,
	exclude_ids: Option<String>,
	engaged_ids: Option<String>,
	engaged_cats: Option<String>,
	skipped_cats: Option<String>,
	cards_shown: Option<u32>,
}

async fn feed(
	State(state): State<AppState>,
	CurrentUser(user_id): CurrentUser,
	Query(params): Query<FeedParams>,
) -> Result<Json<drift_service::FeedPage>, ApiError> {
	let query = FeedQuery {
		category: params.category.unwrap_or_else(|| "All".to_string()),
		limit: params.limit.unwrap_or(state.service.cfg.feed.default_limit),
		offset: params.offset.unwrap_or(0),
		session_id: params.session_id,
		exclude_ids: split_csv(params.exclude_ids.as_deref()),
		engaged_ids: split_csv(params.engaged_ids.as_deref()),
		engaged_cats: split_csv(params.engaged_cats.as_deref()),
		skipped_cats: split_csv(params.skipped_cats.as_deref()),
		cards_shown: params.cards_shown.unwrap_or(0),
	};
	let page = state.service.feed(&user_id, query).await?;
	Ok(Json(page))
}

fn split_csv(raw: Option<&str>) -> Vec<String> {
	raw.map(|value| {
		value
			.split(',')
			.map(str::trim)
			.filter(|part| !part.is_empty())
			.map(str::to_string)
			.collect()
	})
	.unwrap_or_default()
}

fn issue_session(state: &AppState, user_id: &str) -> Result<String, ApiError> {
	session::issue_cookie(
		&state.service.cfg.auth.session_secret,
		user_id,
		state.service.cfg.auth.cookie_secure,
	)
	.map_err(|err| {
		tracing::error!(error = %err, "Session cookie could not be issued.");
		ApiError::internal("Session could not be created.")
	})
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error: String,
	message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	link: Option<LinkView>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	link: Option<LinkView>,
}

impl ApiError {
	fn new(status: StatusCode, error_code: &str, message: impl Into<String>) -> Self {
		Self { status, error_code: error_code.to_string(), message: message.into(), link: None }
	}

	pub fn auth_required() -> Self {
		Self::new(StatusCode::UNAUTHORIZED, "auth_required", "Authentication required.")
	}

	pub fn internal(message: impl Into<String>) -> Self {
		Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
	}
}

impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		match err {
			ServiceError::Validation { message } => {
				Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
			},
			ServiceError::AuthRequired => Self::auth_required(),
			ServiceError::InvalidCredentials => Self::new(
				StatusCode::UNAUTHORIZED,
				"invalid_credentials",
				"Invalid email or password.",
			),
			ServiceError::DuplicateEmail => Self::new(
				StatusCode::CONFLICT,
				"duplicate_email",
				"Email is already registered.",
			),
			ServiceError::DuplicateUrl { existing } => {
				let mut api_err = Self::new(
					StatusCode::CONFLICT,
					"duplicate_url",
					"URL is already saved to this library.",
				);
				api_err.link = Some(LinkView::from(*existing));
				api_err
			},
			ServiceError::NotFound => Self::new(StatusCode::NOT_FOUND, "not_found", "Not found."),
			ServiceError::Provider { message } => {
				tracing::warn!(error = %message, "Upstream provider failure surfaced to client.");
				Self::new(StatusCode::BAD_GATEWAY, "upstream_error", "Upstream service failed.")
			},
			ServiceError::Storage(err) => {
				tracing::error!(error = %err, "Storage failure surfaced to client.");
				Self::internal("Storage failure.")
			},
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error: self.error_code, message: self.message, link: self.link };
		(self.status, Json(body)).into_response()
	}
}

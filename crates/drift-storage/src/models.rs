#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
	pub id: String,
	pub email: String,
	pub password_hash: String,
	pub created_at: time::OffsetDateTime,
}

/// One saved library item. `url` is NULL for text notes and image uploads;
/// `(user_id, url)` is unique whenever `url` is present.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LibraryEntry {
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
	pub embedding: Option<Vec<f32>>,
	pub status: String,
	pub added_at: time::OffsetDateTime,
	pub archived_at: Option<time::OffsetDateTime>,
	pub last_shown_at: Option<time::OffsetDateTime>,
	pub shown_count: i64,
	pub engagement_score: f64,
	pub avg_dwell_ms: f64,
	pub open_count: i64,
	pub liked_at: Option<time::OffsetDateTime>,
}

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_ARCHIVED: &str = "archived";

/// Immutable engagement fact row; hour/day fields are server-stamped at
/// ingest time.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EngagementEvent {
	pub id: i64,
	pub user_id: String,
	pub link_id: String,
	pub event_type: String,
	pub dwell_time_ms: Option<f64>,
	pub swipe_velocity: Option<f64>,
	pub card_index: Option<i32>,
	pub hour_of_day: i16,
	pub day_of_week: i16,
	pub session_id: Option<String>,
	pub feed_request_id: Option<String>,
	pub created_at: time::OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TimePreference {
	pub id: i64,
	pub user_id: String,
	pub hour_slot: i16,
	pub day_type: String,
	pub category: String,
	pub avg_engagement: f64,
	pub sample_count: i64,
	pub updated_at: time::OffsetDateTime,
}

/// One candidate considered for one feed request; `served_rank` is set only
/// for rows that made it into the response page.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RankingEvent {
	pub id: i64,
	pub user_id: String,
	pub feed_request_id: String,
	pub session_id: Option<String>,
	pub link_id: String,
	pub candidate_rank: i32,
	pub served_rank: Option<i32>,
	pub base_score: f64,
	pub rerank_score: Option<f64>,
	pub final_score: f64,
	pub features: serde_json::Value,
	pub algorithm_version: String,
	pub reranker_version: Option<String>,
	pub active_category: String,
	pub cards_shown: i32,
	pub created_at: time::OffsetDateTime,
}

use time::{Duration, OffsetDateTime};

use drift_domain::reward::{FAST_SKIP_THRESHOLD_MS, OutcomeFacts, reward_label};
use drift_storage::models::RankingEvent;

use crate::{DriftService, ServiceResult};

/// Engagement outcomes attribute to a ranking event for this long after it.
const ATTRIBUTION_WINDOW: Duration = Duration::hours(6);

/// One training example: the logged ranking row joined with the engagement
/// outcomes that followed it, labeled with a scalar reward.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExportRow {
	pub feed_request_id: String,
	pub user_id: String,
	pub session_id: Option<String>,
	pub link_id: String,
	pub algorithm_version: String,
	pub reranker_version: Option<String>,
	pub active_category: String,
	pub candidate_rank: i32,
	pub served_rank: Option<i32>,
	pub base_score: f64,
	pub rerank_score: Option<f64>,
	pub final_score: f64,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	pub content_type: String,
	pub categories: Vec<String>,
	pub open_count: i64,
	pub max_dwell_ms: f64,
	pub avg_dwell_ms: f64,
	pub fast_skip_count: i64,
	pub liked: bool,
	pub reward: f64,
	pub features: serde_json::Value,
}

#[derive(Debug, sqlx::FromRow)]
struct OutcomeRow {
	open_count: i64,
	max_dwell_ms: f64,
	avg_dwell_ms: f64,
	fast_skip_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct EntryFacetRow {
	content_type: String,
	categories: Vec<String>,
	liked: bool,
}

impl DriftService {
	/// Build the offline training dataset: every ranking event from the last
	/// `window_days`, joined with the engagement that followed within six
	/// hours, scoped to the same feed request and session where both sides
	/// carry one.
	pub async fn export_training_rows(&self, window_days: i64) -> ServiceResult<Vec<ExportRow>> {
		let since = OffsetDateTime::now_utc() - Duration::days(window_days.max(1));
		let events = sqlx::query_as::<_, RankingEvent>(
			"SELECT * FROM ranking_events WHERE created_at >= $1 \
			 ORDER BY user_id, created_at, candidate_rank",
		)
		.bind(since)
		.fetch_all(&self.db.pool)
		.await?;

		let mut rows = Vec::with_capacity(events.len());
		for event in events {
			let outcome = self.outcome_for(&event).await?;
			let facet = self.entry_facet(&event.user_id, &event.link_id).await?;
			let facts = OutcomeFacts {
				served: event.served_rank.is_some(),
				open_count: outcome.open_count,
				max_dwell_ms: outcome.max_dwell_ms,
				liked: facet.liked,
				fast_skip_count: outcome.fast_skip_count,
			};
			rows.push(ExportRow {
				feed_request_id: event.feed_request_id,
				user_id: event.user_id,
				session_id: event.session_id,
				link_id: event.link_id,
				algorithm_version: event.algorithm_version,
				reranker_version: event.reranker_version,
				active_category: event.active_category,
				candidate_rank: event.candidate_rank,
				served_rank: event.served_rank,
				base_score: event.base_score,
				rerank_score: event.rerank_score,
				final_score: event.final_score,
				created_at: event.created_at,
				content_type: facet.content_type,
				categories: facet.categories,
				open_count: outcome.open_count,
				max_dwell_ms: outcome.max_dwell_ms,
				avg_dwell_ms: outcome.avg_dwell_ms,
				fast_skip_count: outcome.fast_skip_count,
				liked: facet.liked,
				reward: reward_label(&facts),
				features: event.features,
			});
		}
		Ok(rows)
	}

	async fn outcome_for(&self, event: &RankingEvent) -> ServiceResult<OutcomeRow> {
		let window_end = event.created_at + ATTRIBUTION_WINDOW;
		let outcome = sqlx::query_as::<_, OutcomeRow>(
			"SELECT \
			   COUNT(*) FILTER (WHERE event_type = 'open') AS open_count, \
			   COALESCE(MAX(dwell_time_ms) FILTER (WHERE event_type = 'dwell'), 0) AS max_dwell_ms, \
			   COALESCE(AVG(dwell_time_ms) FILTER (WHERE event_type = 'dwell'), 0) AS avg_dwell_ms, \
			   COUNT(*) FILTER (WHERE event_type = 'dwell' AND dwell_time_ms < $5) \
			     AS fast_skip_count \
			 FROM engagements \
			 WHERE user_id = $1 AND link_id = $2 \
			   AND created_at >= $3 AND created_at <= $4 \
			   AND (feed_request_id IS NULL OR feed_request_id = $6) \
			   AND ($7::text IS NULL OR session_id IS NULL OR session_id = $7)",
		)
		.bind(&event.user_id)
		.bind(&event.link_id)
		.bind(event.created_at)
		.bind(window_end)
		.bind(FAST_SKIP_THRESHOLD_MS as f64)
		.bind(&event.feed_request_id)
		.bind(&event.session_id)
		.fetch_one(&self.db.pool)
		.await?;
		Ok(outcome)
	}

	async fn entry_facet(&self, user_id: &str, link_id: &str) -> ServiceResult<EntryFacetRow> {
		let facet = sqlx::query_as::<_, EntryFacetRow>(
			"SELECT content_type, categories, liked_at IS NOT NULL AS liked \
			 FROM links WHERE user_id = $1 AND id = $2",
		)
		.bind(user_id)
		.bind(link_id)
		.fetch_optional(&self.db.pool)
		.await?;
		// A hard-deleted entry still has ranking history; export it with
		// neutral facets rather than dropping the row.
		Ok(facet.unwrap_or(EntryFacetRow {
			content_type: "generic".to_string(),
			categories: Vec::new(),
			liked: false,
		}))
	}
}

use std::collections::HashSet;

use time::OffsetDateTime;
use tracing::warn;

use drift_domain::{
	ALGORITHM_VERSION,
	diversity::diversify,
	engagement::DayType,
	ranking::{CandidateFacts, RankedCandidate, TimePreferenceFact, rank_candidates},
	session::SessionContext,
};
use drift_storage::models::LibraryEntry;

use crate::{DriftService, ServiceResult, links::LinkView, rerank};

/// Only the most recent engaged ids feed the semantic signal.
const SEMANTIC_ID_CAP: usize = 48;
/// Floor on how many top candidates get a ranking-event row.
const MIN_LOGGED_CANDIDATES: usize = 60;

pub const ALL_CATEGORIES: &str = "All";

#[derive(Debug, Clone)]
pub struct FeedQuery {
	pub category: String,
	pub limit: u32,
	pub offset: u32,
	pub session_id: Option<String>,
	pub exclude_ids: Vec<String>,
	pub engaged_ids: Vec<String>,
	pub engaged_cats: Vec<String>,
	pub skipped_cats: Vec<String>,
	pub cards_shown: u32,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
	pub links: Vec<LinkView>,
	pub categories: Vec<String>,
	pub total: usize,
	pub filtered: usize,
	pub feed_request_id: String,
	pub algorithm_version: String,
	pub reranker_applied: bool,
	pub reranker_version: Option<String>,
}

impl DriftService {
	/// Serve one feed page: load candidates and session evidence in
	/// parallel, score, optionally rerank, diversify, page, and log the top
	/// of the ranking for offline training. Logging is best-effort.
	pub async fn feed(&self, user_id: &str, query: FeedQuery) -> ServiceResult<FeedPage> {
		let limit = query.limit.clamp(1, self.cfg.feed.max_limit) as usize;
		let offset = query.offset as usize;
		let now = OffsetDateTime::now_utc();
		let hour_slot = now.hour() as i16;
		let day_type = DayType::from_day_of_week(now.weekday().number_days_from_sunday());

		let semantic_ids: Vec<String> = {
			let ids = &query.engaged_ids;
			ids[ids.len().saturating_sub(SEMANTIC_ID_CAP)..].to_vec()
		};

		let (candidates, tab_categories, engaged_embeddings, pref_rows) = tokio::try_join!(
			self.load_candidates(user_id, &query.category),
			self.load_tab_categories(user_id),
			self.load_embeddings(user_id, &semantic_ids),
			self.load_time_prefs(user_id, hour_slot, day_type),
		)?;

		let total = candidates.len();
		let excluded: HashSet<&str> = query.exclude_ids.iter().map(String::as_str).collect();
		let pool: Vec<LibraryEntry> = candidates
			.into_iter()
			.filter(|entry| !excluded.contains(entry.id.as_str()))
			.collect();
		let filtered = pool.len();

		let facts: Vec<CandidateFacts> = pool.iter().map(candidate_facts).collect();
		let session = SessionContext::new(
			query.engaged_ids.clone(),
			query.engaged_cats.clone(),
			query.skipped_cats.clone(),
			engaged_embeddings,
			query.cards_shown,
		);
		let mut ranked = rank_candidates(&facts, &session, &pref_rows, now);
		let outcome = rerank::apply_reranker(&self.cfg.reranker, &mut ranked);
		let ranked = diversify(ranked, |candidate: &RankedCandidate| {
			facts[candidate.index].categories.first().map(String::as_str)
		});

		let serve_end = (offset + limit).min(ranked.len());
		let served_range = offset.min(ranked.len())..serve_end;
		let links: Vec<LinkView> = ranked[served_range.clone()]
			.iter()
			.map(|candidate| LinkView::from(pool[candidate.index].clone()))
			.collect();

		let feed_request_id = uuid::Uuid::new_v4().to_string();
		let log_cap = (limit * 3).max(MIN_LOGGED_CANDIDATES);
		if let Err(err) = self
			.log_ranking_events(LogRankingArgs {
				user_id,
				feed_request_id: &feed_request_id,
				session_id: query.session_id.as_deref(),
				active_category: &query.category,
				cards_shown: query.cards_shown,
				reranker_version: outcome.version.as_deref(),
				ranked: &ranked[..log_cap.min(ranked.len())],
				facts: &facts,
				served_range: served_range.clone(),
				now,
			})
			.await
		{
			warn!(error = %err, "Ranking-event logging failed; serving the feed anyway.");
		}

		Ok(FeedPage {
			links,
			categories: tab_categories,
			total,
			filtered,
			feed_request_id,
			algorithm_version: ALGORITHM_VERSION.to_string(),
			reranker_applied: outcome.applied,
			reranker_version: outcome.version,
		})
	}

	async fn load_candidates(
		&self,
		user_id: &str,
		category: &str,
	) -> ServiceResult<Vec<LibraryEntry>> {
		let entries = if category == ALL_CATEGORIES {
			sqlx::query_as::<_, LibraryEntry>(
				"SELECT * FROM links WHERE user_id = $1 AND status = 'active'",
			)
			.bind(user_id)
			.fetch_all(&self.db.pool)
			.await?
		} else {
			sqlx::query_as::<_, LibraryEntry>(
				"SELECT * FROM links WHERE user_id = $1 AND status = 'active' \
				 AND $2 = ANY(categories)",
			)
			.bind(user_id)
			.bind(category)
			.fetch_all(&self.db.pool)
			.await?
		};
		Ok(entries)
	}

	async fn load_tab_categories(&self, user_id: &str) -> ServiceResult<Vec<String>> {
		let categories: Vec<String> = sqlx::query_scalar(
			"SELECT DISTINCT unnest(categories) FROM links \
			 WHERE user_id = $1 AND status = 'active' ORDER BY 1",
		)
		.bind(user_id)
		.fetch_all(&self.db.pool)
		.await?;
		Ok(categories)
	}

	async fn load_embeddings(
		&self,
		user_id: &str,
		link_ids: &[String],
	) -> ServiceResult<Vec<Vec<f32>>> {
		if link_ids.is_empty() {
			return Ok(Vec::new());
		}
		let embeddings: Vec<Vec<f32>> = sqlx::query_scalar(
			"SELECT embedding FROM links \
			 WHERE user_id = $1 AND id = ANY($2) AND embedding IS NOT NULL",
		)
		.bind(user_id)
		.bind(link_ids)
		.fetch_all(&self.db.pool)
		.await?;
		Ok(embeddings)
	}

	async fn load_time_prefs(
		&self,
		user_id: &str,
		hour_slot: i16,
		day_type: DayType,
	) -> ServiceResult<Vec<TimePreferenceFact>> {
		let rows: Vec<(String, f64, i64)> = sqlx::query_as(
			"SELECT category, avg_engagement, sample_count FROM time_preferences \
			 WHERE user_id = $1 AND hour_slot = $2 AND day_type = $3",
		)
		.bind(user_id)
		.bind(hour_slot)
		.bind(day_type.as_str())
		.fetch_all(&self.db.pool)
		.await?;
		Ok(rows
			.into_iter()
			.map(|(category, avg_engagement, sample_count)| TimePreferenceFact {
				category,
				avg_engagement,
				sample_count,
			})
			.collect())
	}

	async fn log_ranking_events(&self, args: LogRankingArgs<'_>) -> ServiceResult<()> {
		for (position, candidate) in args.ranked.iter().enumerate() {
			let served_rank = if args.served_range.contains(&position) {
				Some((position - args.served_range.start + 1) as i32)
			} else {
				None
			};
			sqlx::query(
				"INSERT INTO ranking_events \
				 (user_id, feed_request_id, session_id, link_id, candidate_rank, served_rank, \
				  base_score, rerank_score, final_score, features, algorithm_version, \
				  reranker_version, active_category, cards_shown, created_at) \
				 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15) \
				 ON CONFLICT (feed_request_id, link_id) DO NOTHING",
			)
			.bind(args.user_id)
			.bind(args.feed_request_id)
			.bind(args.session_id)
			.bind(&args.facts[candidate.index].id)
			.bind((position + 1) as i32)
			.bind(served_rank)
			.bind(candidate.base_score)
			.bind(candidate.rerank_score)
			.bind(candidate.final_score)
			.bind(serde_json::to_value(&candidate.features).unwrap_or_else(|_| serde_json::json!({})))
			.bind(ALGORITHM_VERSION)
			.bind(args.reranker_version)
			.bind(args.active_category)
			.bind(args.cards_shown as i32)
			.bind(args.now)
			.execute(&self.db.pool)
			.await?;
		}
		Ok(())
	}
}

struct LogRankingArgs<'a> {
	user_id: &'a str,
	feed_request_id: &'a str,
	session_id: Option<&'a str>,
	active_category: &'a str,
	cards_shown: u32,
	reranker_version: Option<&'a str>,
	ranked: &'a [RankedCandidate],
	facts: &'a [CandidateFacts],
	served_range: std::ops::Range<usize>,
	now: OffsetDateTime,
}

fn candidate_facts(entry: &LibraryEntry) -> CandidateFacts {
	CandidateFacts {
		id: entry.id.clone(),
		content_type: entry.content_type.clone(),
		categories: entry.categories.clone(),
		added_at: entry.added_at,
		last_shown_at: entry.last_shown_at,
		shown_count: entry.shown_count,
		open_count: entry.open_count,
		engagement_score: entry.engagement_score,
		liked: entry.liked_at.is_some(),
		embedding: entry.embedding.clone(),
	}
}

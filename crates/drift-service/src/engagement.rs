use std::collections::HashMap;

use time::OffsetDateTime;

use drift_domain::engagement::{
	DayType, EVENT_DWELL, EVENT_IMPRESSION, EVENT_OPEN, interaction_score, is_valid_event_type,
};

use crate::{DriftService, ServiceError, ServiceResult};

/// `POST /engagement` accepts either a bare event or `{events: [...]}`.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(untagged)]
pub enum EngagementBatch {
	Many { events: Vec<EngagementEventInput> },
	One(EngagementEventInput),
}

impl EngagementBatch {
	pub fn into_events(self) -> Vec<EngagementEventInput> {
		match self {
			Self::Many { events } => events,
			Self::One(event) => vec![event],
		}
	}
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementEventInput {
	#[serde(default)]
	pub link_id: String,
	#[serde(default)]
	pub event_type: String,
	pub dwell_time_ms: Option<f64>,
	pub swipe_velocity: Option<f64>,
	pub card_index: Option<i32>,
	pub session_id: Option<String>,
	pub feed_request_id: Option<String>,
}

impl EngagementEventInput {
	fn is_valid(&self) -> bool {
		!self.link_id.trim().is_empty() && is_valid_event_type(&self.event_type)
	}
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EngagementReceipt {
	pub ok: bool,
	pub processed: usize,
}

#[derive(Default)]
struct CategoryContribution {
	sum: f64,
	count: i64,
}

impl DriftService {
	/// Ingest a batch of engagement events atomically: append the facts,
	/// bump per-entry counters, fold dwell scores into the running means,
	/// and upsert the time-of-day preference aggregates.
	pub async fn ingest_engagements(
		&self,
		user_id: &str,
		batch: EngagementBatch,
	) -> ServiceResult<EngagementReceipt> {
		let events: Vec<EngagementEventInput> =
			batch.into_events().into_iter().filter(|event| event.is_valid()).collect();
		if events.is_empty() {
			return Err(ServiceError::validation("No valid engagement events in request."));
		}

		let now = OffsetDateTime::now_utc();
		let hour_of_day = now.hour() as i16;
		let day_of_week = now.weekday().number_days_from_sunday() as i16;
		let day_type = DayType::from_day_of_week(day_of_week as u8);

		let mut tx = self.db.pool.begin().await?;

		for event in &events {
			sqlx::query(
				"INSERT INTO engagements \
				 (user_id, link_id, event_type, dwell_time_ms, swipe_velocity, card_index, \
				  hour_of_day, day_of_week, session_id, feed_request_id, created_at) \
				 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)",
			)
			.bind(user_id)
			.bind(&event.link_id)
			.bind(&event.event_type)
			.bind(event.dwell_time_ms)
			.bind(event.swipe_velocity)
			.bind(event.card_index)
			.bind(hour_of_day)
			.bind(day_of_week)
			.bind(&event.session_id)
			.bind(&event.feed_request_id)
			.bind(now)
			.execute(&mut *tx)
			.await?;
		}

		let mut impressions: HashMap<&str, i64> = HashMap::new();
		let mut opens: HashMap<&str, i64> = HashMap::new();
		for event in &events {
			match event.event_type.as_str() {
				EVENT_IMPRESSION => *impressions.entry(event.link_id.as_str()).or_insert(0) += 1,
				EVENT_OPEN => *opens.entry(event.link_id.as_str()).or_insert(0) += 1,
				_ => {},
			}
		}

		for (link_id, count) in &impressions {
			sqlx::query(
				"UPDATE links SET shown_count = shown_count + $1, last_shown_at = $2 \
				 WHERE id = $3 AND user_id = $4",
			)
			.bind(count)
			.bind(now)
			.bind(link_id)
			.bind(user_id)
			.execute(&mut *tx)
			.await?;
		}
		for (link_id, count) in &opens {
			sqlx::query(
				"UPDATE links SET open_count = open_count + $1 WHERE id = $2 AND user_id = $3",
			)
			.bind(count)
			.bind(link_id)
			.bind(user_id)
			.execute(&mut *tx)
			.await?;
		}

		// Dwells fold into the entry's running means one by one, against the
		// row's current shown_count, and contribute to the per-category
		// aggregates for this hour slot.
		let dwell_events: Vec<&EngagementEventInput> = events
			.iter()
			.filter(|event| {
				event.event_type == EVENT_DWELL
					&& event.dwell_time_ms.is_some_and(|dwell| dwell > 0.0)
			})
			.collect();
		let mut contributions: HashMap<String, CategoryContribution> = HashMap::new();

		if !dwell_events.is_empty() {
			let dwell_ids: Vec<String> =
				dwell_events.iter().map(|event| event.link_id.clone()).collect();
			let category_rows: Vec<(String, Vec<String>)> = sqlx::query_as(
				"SELECT id, categories FROM links WHERE user_id = $1 AND id = ANY($2)",
			)
			.bind(user_id)
			.bind(&dwell_ids)
			.fetch_all(&mut *tx)
			.await?;
			let categories_by_link: HashMap<String, Vec<String>> =
				category_rows.into_iter().collect();

			for event in &dwell_events {
				let dwell_ms = event.dwell_time_ms.unwrap_or(0.0);
				let score = interaction_score(dwell_ms, event.swipe_velocity);

				sqlx::query(
					"UPDATE links SET \
					 engagement_score = LEAST(1.0, GREATEST(0.0, CASE \
					   WHEN shown_count <= 1 THEN $1 \
					   ELSE (engagement_score * (shown_count - 1) + $1) / shown_count END)), \
					 avg_dwell_ms = CASE \
					   WHEN shown_count <= 1 THEN $2 \
					   ELSE (avg_dwell_ms * (shown_count - 1) + $2) / shown_count END \
					 WHERE id = $3 AND user_id = $4",
				)
				.bind(score)
				.bind(dwell_ms)
				.bind(&event.link_id)
				.bind(user_id)
				.execute(&mut *tx)
				.await?;

				if let Some(link_categories) = categories_by_link.get(&event.link_id) {
					for category in link_categories {
						let contribution = contributions.entry(category.clone()).or_default();
						contribution.sum += score;
						contribution.count += 1;
					}
				}
			}
		}

		for (category, contribution) in &contributions {
			sqlx::query(
				"INSERT INTO time_preferences \
				 (user_id, hour_slot, day_type, category, avg_engagement, sample_count, updated_at) \
				 VALUES ($1, $2, $3, $4, $5 / $6::double precision, $6, $7) \
				 ON CONFLICT (user_id, hour_slot, day_type, category) DO UPDATE SET \
				 avg_engagement = (time_preferences.avg_engagement * time_preferences.sample_count \
				                   + EXCLUDED.avg_engagement * EXCLUDED.sample_count) \
				                  / (time_preferences.sample_count + EXCLUDED.sample_count), \
				 sample_count = time_preferences.sample_count + EXCLUDED.sample_count, \
				 updated_at = EXCLUDED.updated_at",
			)
			.bind(user_id)
			.bind(hour_of_day)
			.bind(day_type.as_str())
			.bind(category)
			.bind(contribution.sum)
			.bind(contribution.count)
			.bind(now)
			.execute(&mut *tx)
			.await?;
		}

		tx.commit().await?;
		Ok(EngagementReceipt { ok: true, processed: events.len() })
	}
}

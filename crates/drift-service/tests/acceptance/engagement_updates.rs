use drift_service::{EngagementBatch, EngagementEventInput, ServiceError};
use drift_storage::models::LibraryEntry;

fn event(link_id: &str, event_type: &str) -> EngagementEventInput {
	serde_json::from_value(serde_json::json!({ "linkId": link_id, "eventType": event_type }))
		.expect("event should deserialize")
}

fn dwell(link_id: &str, dwell_ms: f64, velocity: f64) -> EngagementEventInput {
	serde_json::from_value(serde_json::json!({
		"linkId": link_id,
		"eventType": "dwell",
		"dwellTimeMs": dwell_ms,
		"swipeVelocity": velocity,
	}))
	.expect("event should deserialize")
}

async fn fetch_entry(service: &drift_service::DriftService, id: &str) -> LibraryEntry {
	sqlx::query_as("SELECT * FROM links WHERE id = $1")
		.bind(id)
		.fetch_one(&service.db.pool)
		.await
		.expect("entry should exist")
}

#[tokio::test]
async fn dwell_events_fold_into_running_means() {
	let _guard = super::test_lock().await;
	let Some(dsn) = super::test_dsn() else {
		eprintln!("Skipping dwell_events_fold_into_running_means; set DRIFT_PG_DSN to run.");
		return;
	};
	let service = super::build_service(dsn, super::stub_providers(vec!["Tech".to_string()]))
		.await
		.expect("failed to build service");
	super::reset_db(&service.db.pool).await.expect("failed to reset database");

	let user = super::signup(&service, "dana@example.com").await;
	let entry = service
		.upload(&user.id, serde_json::from_value(serde_json::json!({
			"type": "text",
			"title": "Note",
			"textContent": "Some saved thought.",
		}))
		.expect("upload request should deserialize"))
		.await
		.expect("upload failed");

	// One impression then a 10s dwell at slow velocity.
	let receipt = service
		.ingest_engagements(
			&user.id,
			EngagementBatch::Many {
				events: vec![event(&entry.id, "impression"), dwell(&entry.id, 10_000.0, 0.3)],
			},
		)
		.await
		.expect("ingest failed");
	assert_eq!(receipt.processed, 2);

	let expected = (11.0f64).ln() / (121.0f64).ln() * 0.7;
	let after_first = fetch_entry(&service, &entry.id).await;
	assert_eq!(after_first.shown_count, 1);
	assert!(after_first.last_shown_at.is_some());
	assert!((after_first.engagement_score - expected).abs() < 1e-9);
	assert!((after_first.avg_dwell_ms - 10_000.0).abs() < 1e-9);

	// An identical round keeps the running mean in place.
	service
		.ingest_engagements(
			&user.id,
			EngagementBatch::Many {
				events: vec![event(&entry.id, "impression"), dwell(&entry.id, 10_000.0, 0.3)],
			},
		)
		.await
		.expect("second ingest failed");
	let after_second = fetch_entry(&service, &entry.id).await;
	assert_eq!(after_second.shown_count, 2);
	assert!((after_second.engagement_score - expected).abs() < 1e-9);
	assert!((after_second.avg_dwell_ms - 10_000.0).abs() < 1e-9);
	assert!((0.0..=1.0).contains(&after_second.engagement_score));

	// Opens bump the open counter without touching the means.
	service
		.ingest_engagements(&user.id, EngagementBatch::One(event(&entry.id, "open")))
		.await
		.expect("open ingest failed");
	let after_open = fetch_entry(&service, &entry.id).await;
	assert_eq!(after_open.open_count, 1);
	assert!((after_open.engagement_score - expected).abs() < 1e-9);

	// Dwells also feed the per-slot time preferences for the category.
	let rows: Vec<(i64, f64)> = sqlx::query_as(
		"SELECT sample_count, avg_engagement FROM time_preferences \
		 WHERE user_id = $1 AND category = 'Tech'",
	)
	.bind(&user.id)
	.fetch_all(&service.db.pool)
	.await
	.expect("time preference query failed");
	let total_samples: i64 = rows.iter().map(|(count, _)| count).sum();
	assert_eq!(total_samples, 2);
	for (_, avg_engagement) in rows {
		assert!((avg_engagement - expected).abs() < 1e-9);
	}
}

#[tokio::test]
async fn batches_without_valid_events_are_rejected() {
	let _guard = super::test_lock().await;
	let Some(dsn) = super::test_dsn() else {
		eprintln!("Skipping batches_without_valid_events_are_rejected; set DRIFT_PG_DSN to run.");
		return;
	};
	let service = super::build_service(dsn, super::stub_providers(vec!["Tech".to_string()]))
		.await
		.expect("failed to build service");
	super::reset_db(&service.db.pool).await.expect("failed to reset database");
	let user = super::signup(&service, "erin@example.com").await;

	let result = service
		.ingest_engagements(
			&user.id,
			EngagementBatch::Many {
				events: vec![event("", "open"), event("some-link", "hover")],
			},
		)
		.await;
	assert!(matches!(result, Err(ServiceError::Validation { .. })));

	let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM engagements WHERE user_id = $1")
		.bind(&user.id)
		.fetch_one(&service.db.pool)
		.await
		.expect("count failed");
	assert_eq!(count, 0);
}

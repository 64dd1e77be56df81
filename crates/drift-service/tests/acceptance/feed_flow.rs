use std::collections::HashSet;

use drift_service::FeedQuery;

fn base_query() -> FeedQuery {
	FeedQuery {
		category: "All".to_string(),
		limit: 3,
		offset: 0,
		session_id: Some("session-1".to_string()),
		exclude_ids: Vec::new(),
		engaged_ids: Vec::new(),
		engaged_cats: Vec::new(),
		skipped_cats: Vec::new(),
		cards_shown: 0,
	}
}

#[tokio::test]
async fn feed_serves_pages_and_logs_ranking_events() {
	let _guard = super::test_lock().await;
	let Some(dsn) = super::test_dsn() else {
		eprintln!("Skipping feed_serves_pages_and_logs_ranking_events; set DRIFT_PG_DSN to run.");
		return;
	};
	let service = super::build_service(dsn, super::stub_providers(vec!["Tech".to_string()]))
		.await
		.expect("failed to build service");
	super::reset_db(&service.db.pool).await.expect("failed to reset database");
	let user = super::signup(&service, "fred@example.com").await;

	let mut saved_ids = Vec::new();
	for index in 0..5 {
		let entry = service
			.add_link(&user.id, &format!("https://example.com/post/{index}"))
			.await
			.expect("save failed");
		saved_ids.push(entry.id);
	}

	let page = service.feed(&user.id, base_query()).await.expect("feed failed");
	assert_eq!(page.links.len(), 3);
	assert_eq!(page.total, 5);
	assert_eq!(page.filtered, 5);
	assert_eq!(page.categories, vec!["Tech".to_string()]);
	assert!(!page.reranker_applied);
	assert_eq!(page.reranker_version, None);
	assert_eq!(page.algorithm_version, drift_domain::ALGORITHM_VERSION);

	// Every candidate was logged, the served page with a served rank.
	let rows: Vec<(String, i32, Option<i32>)> = sqlx::query_as(
		"SELECT link_id, candidate_rank, served_rank FROM ranking_events \
		 WHERE user_id = $1 AND feed_request_id = $2 ORDER BY candidate_rank",
	)
	.bind(&user.id)
	.bind(&page.feed_request_id)
	.fetch_all(&service.db.pool)
	.await
	.expect("ranking events query failed");
	assert_eq!(rows.len(), 5);
	for (position, (link_id, candidate_rank, _)) in rows.iter().enumerate() {
		assert_eq!(*candidate_rank, (position + 1) as i32);
		assert!(saved_ids.contains(link_id));
	}
	let served: Vec<i32> = rows.iter().filter_map(|(_, _, served)| *served).collect();
	assert_eq!(served, vec![1, 2, 3]);

	// The second page excludes nothing but shifts the window.
	let mut second_page_query = base_query();
	second_page_query.offset = 3;
	let second = service.feed(&user.id, second_page_query).await.expect("feed failed");
	assert_eq!(second.links.len(), 2);
	let first_ids: HashSet<String> = page.links.iter().map(|link| link.id.clone()).collect();
	assert!(second.links.iter().all(|link| !first_ids.contains(&link.id)));

	// excludeIds drop candidates before scoring.
	let mut exclude_query = base_query();
	exclude_query.exclude_ids = vec![saved_ids[0].clone(), saved_ids[1].clone()];
	let excluded = service.feed(&user.id, exclude_query).await.expect("feed failed");
	assert_eq!(excluded.total, 5);
	assert_eq!(excluded.filtered, 3);
	assert!(excluded.links.iter().all(|link| !exclude_query_ids(&saved_ids).contains(&link.id)));

	// Feed reads never count as impressions.
	let shown: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(shown_count), 0) FROM links WHERE user_id = $1")
		.bind(&user.id)
		.fetch_one(&service.db.pool)
		.await
		.expect("shown sum failed");
	assert_eq!(shown, 0);
}

fn exclude_query_ids(saved_ids: &[String]) -> HashSet<String> {
	saved_ids.iter().take(2).cloned().collect()
}

#[tokio::test]
async fn category_filter_limits_candidates() {
	let _guard = super::test_lock().await;
	let Some(dsn) = super::test_dsn() else {
		eprintln!("Skipping category_filter_limits_candidates; set DRIFT_PG_DSN to run.");
		return;
	};
	let service = super::build_service(dsn, super::stub_providers(vec!["Music".to_string()]))
		.await
		.expect("failed to build service");
	super::reset_db(&service.db.pool).await.expect("failed to reset database");
	let user = super::signup(&service, "gina@example.com").await;

	service.add_link(&user.id, "https://example.com/song").await.expect("save failed");

	let mut query = base_query();
	query.category = "Music".to_string();
	let page = service.feed(&user.id, query).await.expect("feed failed");
	assert_eq!(page.links.len(), 1);

	let mut miss = base_query();
	miss.category = "Sports".to_string();
	let empty = service.feed(&user.id, miss).await.expect("feed failed");
	assert_eq!(empty.links.len(), 0);
	assert_eq!(empty.total, 0);
}

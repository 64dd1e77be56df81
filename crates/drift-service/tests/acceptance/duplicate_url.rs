use drift_service::ServiceError;

#[tokio::test]
async fn duplicate_url_conflicts_per_user_only() {
	let _guard = super::test_lock().await;
	let Some(dsn) = super::test_dsn() else {
		eprintln!("Skipping duplicate_url_conflicts_per_user_only; set DRIFT_PG_DSN to run.");
		return;
	};
	let service = super::build_service(dsn, super::stub_providers(vec!["Tech".to_string()]))
		.await
		.expect("failed to build service");
	super::reset_db(&service.db.pool).await.expect("failed to reset database");

	let alice = super::signup(&service, "alice@example.com").await;
	let bob = super::signup(&service, "bob@example.com").await;

	let url = "https://example.com/articles/42";
	let first = service.add_link(&alice.id, url).await.expect("first save failed");
	assert_eq!(first.url.as_deref(), Some(url));
	assert_eq!(first.status, "active");
	assert_eq!(first.categories, vec!["Tech".to_string()]);
	assert_eq!(first.id.len(), 12);

	let second = service.add_link(&alice.id, url).await;
	match second {
		Err(ServiceError::DuplicateUrl { existing }) => assert_eq!(existing.id, first.id),
		other => panic!("expected a duplicate-url conflict, got {other:?}"),
	}

	let count: i64 =
		sqlx::query_scalar("SELECT COUNT(*) FROM links WHERE user_id = $1 AND url = $2")
			.bind(&alice.id)
			.bind(url)
			.fetch_one(&service.db.pool)
			.await
			.expect("count failed");
	assert_eq!(count, 1);

	// The same URL under another user is a fresh save.
	let bobs = service.add_link(&bob.id, url).await.expect("other-user save failed");
	assert_ne!(bobs.id, first.id);
}

#[tokio::test]
async fn duplicate_email_conflicts_on_signup() {
	let _guard = super::test_lock().await;
	let Some(dsn) = super::test_dsn() else {
		eprintln!("Skipping duplicate_email_conflicts_on_signup; set DRIFT_PG_DSN to run.");
		return;
	};
	let service = super::build_service(dsn, super::stub_providers(vec!["Tech".to_string()]))
		.await
		.expect("failed to build service");
	super::reset_db(&service.db.pool).await.expect("failed to reset database");

	super::signup(&service, "carol@example.com").await;
	let again = service
		.signup(drift_service::AuthCredentials {
			email: "  CAROL@example.com ".to_string(),
			password: "another-password".to_string(),
		})
		.await;
	assert!(matches!(again, Err(drift_service::ServiceError::DuplicateEmail)));

	// Login still works with the original password and normalized email.
	let profile = service
		.login(drift_service::AuthCredentials {
			email: "Carol@Example.com".to_string(),
			password: "correct-horse-battery".to_string(),
		})
		.await
		.expect("login failed");
	assert_eq!(profile.email, "carol@example.com");
}

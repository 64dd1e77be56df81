//! Acceptance tests that exercise the service against a real Postgres.
//! They skip (and print why) unless DRIFT_PG_DSN points at a database the
//! suite may truncate at will.

mod duplicate_url;
mod engagement_updates;
mod feed_flow;

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use drift_service::{
	BoxFuture, CategorizeProvider, DriftService, EmbeddingProvider, Providers, UnfurlProvider,
};

static TEST_LOCK: Mutex<()> = Mutex::const_new(());

pub async fn test_lock() -> MutexGuard<'static, ()> {
	TEST_LOCK.lock().await
}

pub fn test_dsn() -> Option<String> {
	std::env::var("DRIFT_PG_DSN").ok()
}

pub fn test_config(dsn: String) -> drift_config::Config {
	drift_config::Config {
		service: drift_config::Service {
			http_bind: "127.0.0.1:0".to_string(),
			log_level: "info".to_string(),
		},
		storage: drift_config::Storage {
			postgres: drift_config::Postgres { dsn, pool_max_conns: 2 },
		},
		auth: drift_config::Auth {
			session_secret: "acceptance-secret".to_string(),
			cookie_secure: false,
		},
		providers: drift_config::Providers {
			embedding: drift_config::EmbeddingProviderConfig {
				api_base: "http://localhost".to_string(),
				api_key: "key".to_string(),
				path: "/embeddings".to_string(),
				model: "stub".to_string(),
				dimensions: 4,
				timeout_ms: 1000,
				default_headers: serde_json::Map::new(),
			},
			categorizer: drift_config::LlmProviderConfig {
				api_base: "http://localhost".to_string(),
				api_key: "key".to_string(),
				path: "/chat/completions".to_string(),
				model: "stub".to_string(),
				temperature: 0.1,
				timeout_ms: 1000,
				default_headers: serde_json::Map::new(),
			},
		},
		reranker: drift_config::Reranker { enabled: false, model_path: String::new() },
		feed: drift_config::Feed { default_limit: 20, max_limit: 50, export_window_days: 30 },
	}
}

pub struct StubEmbedding {
	pub dimensions: usize,
}

impl EmbeddingProvider for StubEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a drift_config::EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		let dimensions = self.dimensions;
		Box::pin(async move { Ok(texts.iter().map(|_| vec![0.25; dimensions]).collect()) })
	}
}

pub struct StubCategorizer {
	pub labels: Vec<String>,
}

impl CategorizeProvider for StubCategorizer {
	fn categorize<'a>(
		&'a self,
		_cfg: &'a drift_config::LlmProviderConfig,
		_title: &'a str,
		_description: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<Vec<String>>> {
		Box::pin(async move { Ok(self.labels.clone()) })
	}
}

/// Unfurler that never touches the network: answers with metadata derived
/// from the URL itself.
pub struct StubUnfurler;

impl UnfurlProvider for StubUnfurler {
	fn unfurl<'a>(
		&'a self,
		url: &'a reqwest::Url,
	) -> BoxFuture<'a, Result<drift_providers::unfurl::UnfurlResult, drift_providers::guard::FetchError>>
	{
		Box::pin(async move {
			Ok(drift_providers::unfurl::UnfurlResult {
				url: url.to_string(),
				title: Some(format!("Stub title for {}", url.path())),
				description: Some("Stubbed description".to_string()),
				thumbnail: None,
				site_name: url.host_str().map(str::to_string),
				content_type: drift_providers::unfurl::detect_content_type(url),
			})
		})
	}
}

pub fn stub_providers(labels: Vec<String>) -> Providers {
	Providers::new(
		Arc::new(StubEmbedding { dimensions: 4 }),
		Arc::new(StubCategorizer { labels }),
		Arc::new(StubUnfurler),
	)
}

pub async fn build_service(dsn: String, providers: Providers) -> color_eyre::Result<DriftService> {
	let cfg = test_config(dsn);
	let db = drift_storage::db::Db::connect(&cfg.storage.postgres).await?;
	db.ensure_schema().await?;
	Ok(DriftService::with_providers(cfg, db, providers))
}

pub async fn reset_db(pool: &sqlx::PgPool) -> sqlx::Result<()> {
	sqlx::query("TRUNCATE users, links, engagements, time_preferences, ranking_events CASCADE")
		.execute(pool)
		.await?;
	Ok(())
}

pub async fn signup(service: &DriftService, email: &str) -> drift_service::UserProfile {
	service
		.signup(drift_service::AuthCredentials {
			email: email.to_string(),
			password: "correct-horse-battery".to_string(),
		})
		.await
		.expect("signup failed")
}

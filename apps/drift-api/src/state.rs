use std::sync::Arc;

use drift_service::DriftService;
use drift_storage::db::Db;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<DriftService>,
}

impl AppState {
	pub async fn new(config: drift_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;
		db.ensure_schema().await?;
		Ok(Self { service: Arc::new(DriftService::new(config, db)) })
	}

	pub fn with_service(service: DriftService) -> Self {
		Self { service: Arc::new(service) }
	}
}

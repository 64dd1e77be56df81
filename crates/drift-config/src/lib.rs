mod types;

pub use types::*;

pub fn load(path: &std::path::Path) -> color_eyre::Result<Config> {
	let raw = std::fs::read_to_string(path)?;
	let mut cfg: Config = toml::from_str(&raw)?;
	apply_env_overrides(&mut cfg);
	validate(&cfg)?;
	Ok(cfg)
}

/// Deployment secrets and the reranker toggle come from the environment when
/// set, overriding whatever the file carries.
pub fn apply_env_overrides(cfg: &mut Config) {
	if let Ok(dsn) = std::env::var("DATABASE_URL")
		&& !dsn.trim().is_empty()
	{
		cfg.storage.postgres.dsn = dsn;
	}
	if let Ok(secret) = std::env::var("SESSION_SECRET")
		&& !secret.trim().is_empty()
	{
		cfg.auth.session_secret = secret;
	}
	if let Ok(enabled) = std::env::var("ENABLE_XGBOOST_RERANKER") {
		cfg.reranker.enabled = enabled == "true";
	}
	if let Ok(path) = std::env::var("XGBOOST_RERANKER_MODEL_PATH")
		&& !path.trim().is_empty()
	{
		cfg.reranker.model_path = path;
	}
}

pub fn validate(cfg: &Config) -> color_eyre::Result<()> {
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(color_eyre::eyre::eyre!("storage.postgres.dsn must be non-empty."));
	}
	if cfg.auth.session_secret.trim().is_empty() {
		return Err(color_eyre::eyre::eyre!("auth.session_secret must be non-empty."));
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(color_eyre::eyre::eyre!(
			"providers.embedding.dimensions must be greater than zero."
		));
	}
	if cfg.feed.default_limit == 0 || cfg.feed.default_limit > cfg.feed.max_limit {
		return Err(color_eyre::eyre::eyre!(
			"feed.default_limit must be in 1..=feed.max_limit."
		));
	}
	if cfg.reranker.enabled && cfg.reranker.model_path.trim().is_empty() {
		return Err(color_eyre::eyre::eyre!(
			"reranker.model_path must be non-empty when the reranker is enabled."
		));
	}
	Ok(())
}

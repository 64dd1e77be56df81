pub mod auth;
pub mod engagement;
pub mod export;
pub mod feed;
pub mod links;
pub mod rerank;
pub mod time_serde;
pub mod upload;

use std::{future::Future, pin::Pin, sync::Arc};

use drift_config::{Config, EmbeddingProviderConfig, LlmProviderConfig};
use drift_providers::{guard::FetchError, unfurl::UnfurlResult};
use drift_storage::db::Db;

pub use auth::{AuthCredentials, UserProfile};
pub use engagement::{EngagementBatch, EngagementEventInput, EngagementReceipt};
pub use export::ExportRow;
pub use feed::{FeedPage, FeedQuery};
pub use links::{LinkPatch, LinkStats, LinkView};
pub use upload::{BulkAddReport, UploadRequest};

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
	#[error("Invalid request: {message}")]
	Validation { message: String },
	#[error("Authentication required.")]
	AuthRequired,
	#[error("Invalid email or password.")]
	InvalidCredentials,
	#[error("Email is already registered.")]
	DuplicateEmail,
	#[error("URL is already saved to this library.")]
	DuplicateUrl { existing: Box<drift_storage::models::LibraryEntry> },
	#[error("Not found.")]
	NotFound,
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {0}")]
	Storage(#[from] sqlx::Error),
}

impl ServiceError {
	pub fn validation(message: impl Into<String>) -> Self {
		Self::Validation { message: message.into() }
	}
}

impl From<FetchError> for ServiceError {
	fn from(err: FetchError) -> Self {
		match err {
			// Guard rejections surface as plain validation failures; the
			// concrete reason (resolved addresses, blocklists) stays in the
			// server logs only.
			FetchError::Unsafe { .. } => {
				Self::Validation { message: "URL is not allowed.".to_string() }
			},
			FetchError::Upstream { message } => Self::Provider { message },
		}
	}
}

impl From<color_eyre::Report> for ServiceError {
	fn from(err: color_eyre::Report) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider: Send + Sync {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

pub trait CategorizeProvider: Send + Sync {
	fn categorize<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		title: &'a str,
		description: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<Vec<String>>>;
}

pub trait UnfurlProvider: Send + Sync {
	fn unfurl<'a>(&'a self, url: &'a reqwest::Url)
	-> BoxFuture<'a, Result<UnfurlResult, FetchError>>;
}

struct DefaultProviders;

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(drift_providers::embedding::embed(cfg, texts))
	}
}

impl CategorizeProvider for DefaultProviders {
	fn categorize<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		title: &'a str,
		description: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<Vec<String>>> {
		Box::pin(drift_providers::categorize::categorize(cfg, title, description))
	}
}

impl UnfurlProvider for DefaultProviders {
	fn unfurl<'a>(
		&'a self,
		url: &'a reqwest::Url,
	) -> BoxFuture<'a, Result<UnfurlResult, FetchError>> {
		Box::pin(drift_providers::unfurl::unfurl(url))
	}
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub categorizer: Arc<dyn CategorizeProvider>,
	pub unfurler: Arc<dyn UnfurlProvider>,
}

impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		categorizer: Arc<dyn CategorizeProvider>,
		unfurler: Arc<dyn UnfurlProvider>,
	) -> Self {
		Self { embedding, categorizer, unfurler }
	}
}

impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);
		Self { embedding: provider.clone(), categorizer: provider.clone(), unfurler: provider }
	}
}

pub struct DriftService {
	pub cfg: Config,
	pub db: Db,
	pub providers: Providers,
}

impl DriftService {
	pub fn new(cfg: Config, db: Db) -> Self {
		Self { cfg, db, providers: Providers::default() }
	}

	pub fn with_providers(cfg: Config, db: Db, providers: Providers) -> Self {
		Self { cfg, db, providers }
	}
}

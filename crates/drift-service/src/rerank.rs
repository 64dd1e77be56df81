use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use tracing::{info, warn};

use drift_domain::{
	ranking::RankedCandidate,
	reranker::{RerankerModel, blend, normalize_scores},
};

/// Process-wide model cache keyed by file path. A path change evicts the
/// cached model; a failed load leaves the cache untouched so the next
/// request retries.
static MODEL_CACHE: Lazy<Mutex<Option<(String, Arc<RerankerModel>)>>> = Lazy::new(Mutex::default);

#[derive(Debug, Clone)]
pub struct RerankOutcome {
	pub applied: bool,
	pub version: Option<String>,
}

impl RerankOutcome {
	fn pass_through() -> Self {
		Self { applied: false, version: None }
	}
}

/// Replace final scores with the blended model score and re-sort. Disabled
/// or unloadable models pass the ranking through unchanged.
pub fn apply_reranker(
	cfg: &drift_config::Reranker,
	ranked: &mut Vec<RankedCandidate>,
) -> RerankOutcome {
	if !cfg.enabled || ranked.is_empty() {
		return RerankOutcome::pass_through();
	}
	let Some(model) = load_model(&cfg.model_path) else {
		return RerankOutcome::pass_through();
	};

	let raw: Vec<f64> = ranked.iter().map(|candidate| model.score(&candidate.features)).collect();
	let normalized = normalize_scores(&raw);
	for (candidate, model_score) in ranked.iter_mut().zip(normalized) {
		candidate.rerank_score = Some(model_score);
		candidate.final_score = blend(candidate.base_score, model_score);
	}
	ranked.sort_by(|a, b| {
		b.final_score.partial_cmp(&a.final_score).unwrap_or(std::cmp::Ordering::Equal)
	});

	RerankOutcome { applied: true, version: Some(model.version.clone()) }
}

fn load_model(path: &str) -> Option<Arc<RerankerModel>> {
	{
		let cache = MODEL_CACHE.lock().unwrap_or_else(|err| err.into_inner());
		if let Some((cached_path, model)) = cache.as_ref()
			&& cached_path == path
		{
			return Some(model.clone());
		}
	}

	let raw = match std::fs::read_to_string(path) {
		Ok(raw) => raw,
		Err(err) => {
			warn!(error = %err, path, "Reranker model unreadable; passing ranking through.");
			return None;
		},
	};
	let model = match RerankerModel::parse(&raw) {
		Ok(model) => Arc::new(model),
		Err(err) => {
			warn!(error = %err, path, "Reranker model invalid; passing ranking through.");
			return None;
		},
	};
	info!(path, version = %model.version, trees = model.trees.len(), "Reranker model loaded.");

	let mut cache = MODEL_CACHE.lock().unwrap_or_else(|err| err.into_inner());
	*cache = Some((path.to_string(), model.clone()));
	Some(model)
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeMap;

	use drift_domain::ranking::RankedCandidate;

	use super::apply_reranker;

	fn candidate(index: usize, base_score: f64) -> RankedCandidate {
		RankedCandidate {
			index,
			base_score,
			rerank_score: None,
			final_score: base_score,
			breakdown: Default::default(),
			features: BTreeMap::new(),
		}
	}

	#[test]
	fn disabled_reranker_passes_through() {
		let cfg = drift_config::Reranker { enabled: false, model_path: "unused".to_string() };
		let mut ranked = vec![candidate(0, 0.9), candidate(1, 0.4)];
		let outcome = apply_reranker(&cfg, &mut ranked);
		assert!(!outcome.applied);
		assert_eq!(outcome.version, None);
		assert_eq!(ranked[0].final_score, 0.9);
		assert_eq!(ranked[0].rerank_score, None);
	}

	#[test]
	fn missing_model_file_passes_through() {
		let cfg = drift_config::Reranker {
			enabled: true,
			model_path: "does/not/exist.json".to_string(),
		};
		let mut ranked = vec![candidate(0, 0.9)];
		let outcome = apply_reranker(&cfg, &mut ranked);
		assert!(!outcome.applied);
		assert_eq!(ranked[0].final_score, 0.9);
	}
}

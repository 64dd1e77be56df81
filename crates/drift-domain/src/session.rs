use std::collections::{HashMap, HashSet};

/// How many engaged/skipped history items a session may carry. Anything older
/// is dropped from the front so the recency weights stay meaningful.
pub const HISTORY_CAP: usize = 200;

/// Decay applied per step of age when turning a category history into
/// per-category weights. The most recent occurrence weighs 1.0.
const RECENCY_DECAY: f64 = 0.92;

/// Short-lived, per-request signal bundle describing the current browsing
/// session. Histories are ordered oldest to newest.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
	pub engaged_link_ids: Vec<String>,
	pub engaged_categories: Vec<String>,
	pub skipped_categories: Vec<String>,
	pub engaged_embeddings: Vec<Vec<f32>>,
	pub cards_shown: u32,
}

impl SessionContext {
	pub fn new(
		engaged_link_ids: Vec<String>,
		engaged_categories: Vec<String>,
		skipped_categories: Vec<String>,
		engaged_embeddings: Vec<Vec<f32>>,
		cards_shown: u32,
	) -> Self {
		Self {
			engaged_link_ids: cap_history(engaged_link_ids),
			engaged_categories: cap_history(engaged_categories),
			skipped_categories: cap_history(skipped_categories),
			engaged_embeddings,
			cards_shown,
		}
	}
}

fn cap_history(mut history: Vec<String>) -> Vec<String> {
	if history.len() > HISTORY_CAP {
		history.drain(..history.len() - HISTORY_CAP);
	}
	history
}

/// Membership sets and recency-weighted occurrence sums derived once per
/// request from the session histories.
#[derive(Debug, Clone, Default)]
pub struct SessionSignalMaps {
	pub engaged_set: HashSet<String>,
	pub skipped_set: HashSet<String>,
	pub engaged_weights: HashMap<String, f64>,
	pub skipped_weights: HashMap<String, f64>,
}

impl SessionSignalMaps {
	pub fn build(session: &SessionContext) -> Self {
		Self {
			engaged_set: session.engaged_categories.iter().cloned().collect(),
			skipped_set: session.skipped_categories.iter().cloned().collect(),
			engaged_weights: recency_weights(&session.engaged_categories),
			skipped_weights: recency_weights(&session.skipped_categories),
		}
	}

	pub fn engaged_weight(&self, category: &str) -> f64 {
		self.engaged_weights.get(category).copied().unwrap_or(0.0)
	}

	pub fn skipped_weight(&self, category: &str) -> f64 {
		self.skipped_weights.get(category).copied().unwrap_or(0.0)
	}
}

/// Weight each occurrence by `0.92^(len - 1 - index)` and sum per category,
/// so more recent occurrences count more.
fn recency_weights(history: &[String]) -> HashMap<String, f64> {
	let mut weights: HashMap<String, f64> = HashMap::new();
	let len = history.len();
	for (index, category) in history.iter().enumerate() {
		let age = (len - 1 - index) as i32;
		*weights.entry(category.clone()).or_insert(0.0) += RECENCY_DECAY.powi(age);
	}
	weights
}

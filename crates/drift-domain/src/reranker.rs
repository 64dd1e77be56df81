use std::collections::BTreeMap;

use serde::Deserialize;

/// Blend weights between the heuristic base score and the normalized model
/// score when a reranker is applied.
pub const BLEND_BASE_WEIGHT: f64 = 0.35;
pub const BLEND_MODEL_WEIGHT: f64 = 0.65;

/// Walk bound per tree; a malformed model with a cycle scores 0 instead of
/// spinning.
const MAX_TREE_STEPS: usize = 2_048;

/// Serialized tree-ensemble model as emitted by the offline trainer.
/// Unknown fields (e.g. trainer metadata) are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RerankerModel {
	pub version: String,
	pub model_type: String,
	pub objective: String,
	#[serde(default)]
	pub base_score: f64,
	pub feature_order: Vec<String>,
	pub trees: Vec<Tree>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tree {
	pub nodes: Vec<TreeNode>,
}

/// One node. Internal nodes carry `feature` (an index into the feature
/// vector), `threshold`, `left`, `right` and optionally `defaultLeft`;
/// leaves carry `leaf`. The trainer also writes `-1` children on leaves, so
/// both encodings are accepted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
	#[serde(default)]
	pub leaf: Option<f64>,
	#[serde(default = "minus_one")]
	pub feature: i64,
	#[serde(default)]
	pub threshold: f64,
	#[serde(default = "minus_one")]
	pub left: i64,
	#[serde(default = "minus_one")]
	pub right: i64,
	#[serde(default)]
	pub default_left: Option<bool>,
}

fn minus_one() -> i64 {
	-1
}

impl TreeNode {
	fn leaf_value(&self) -> Option<f64> {
		if let Some(value) = self.leaf {
			return Some(value);
		}
		if self.left < 0 || self.right < 0 { Some(0.0) } else { None }
	}
}

impl RerankerModel {
	pub const MODEL_TYPE: &'static str = "xgboost_tree";

	pub fn parse(raw: &str) -> Result<Self, ModelError> {
		let model: Self = serde_json::from_str(raw)?;
		if model.model_type != Self::MODEL_TYPE {
			return Err(ModelError::UnsupportedModelType(model.model_type));
		}
		if model.feature_order.is_empty() {
			return Err(ModelError::EmptyFeatureOrder);
		}
		Ok(model)
	}

	/// Score one candidate's feature map: missing features default to 0.
	pub fn score(&self, features: &BTreeMap<String, f64>) -> f64 {
		let vector: Vec<f64> = self
			.feature_order
			.iter()
			.map(|name| features.get(name).copied().unwrap_or(0.0))
			.collect();
		let margin: f64 =
			self.base_score + self.trees.iter().map(|tree| eval_tree(tree, &vector)).sum::<f64>();
		if self.objective == "binary:logistic" { sigmoid(margin) } else { margin }
	}
}

#[derive(Debug)]
pub enum ModelError {
	Parse(serde_json::Error),
	UnsupportedModelType(String),
	EmptyFeatureOrder,
}

impl std::fmt::Display for ModelError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Parse(err) => write!(f, "Model JSON did not parse: {err}"),
			Self::UnsupportedModelType(kind) => write!(f, "Unsupported model type: {kind}"),
			Self::EmptyFeatureOrder => write!(f, "Model feature order is empty."),
		}
	}
}

impl std::error::Error for ModelError {}

impl From<serde_json::Error> for ModelError {
	fn from(err: serde_json::Error) -> Self {
		Self::Parse(err)
	}
}

fn eval_tree(tree: &Tree, vector: &[f64]) -> f64 {
	let mut index = 0usize;
	for _ in 0..MAX_TREE_STEPS {
		let Some(node) = tree.nodes.get(index) else {
			return 0.0;
		};
		if let Some(value) = node.leaf_value() {
			return value;
		}
		let value = vector.get(node.feature.max(0) as usize).copied().unwrap_or(0.0);
		let go_left = if value.is_nan() {
			node.default_left.unwrap_or(true)
		} else {
			value < node.threshold
		};
		index = if go_left { node.left as usize } else { node.right as usize };
	}
	0.0
}

fn sigmoid(margin: f64) -> f64 {
	1.0 / (1.0 + (-margin).exp())
}

/// Min-max normalize raw model scores to [0,1] across the candidate set.
/// Degenerate inputs (all equal, or any non-finite value) flatten to 0.5.
pub fn normalize_scores(raw: &[f64]) -> Vec<f64> {
	if raw.is_empty() {
		return Vec::new();
	}
	if raw.iter().any(|score| !score.is_finite()) {
		return vec![0.5; raw.len()];
	}
	let min = raw.iter().cloned().fold(f64::INFINITY, f64::min);
	let max = raw.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
	if max <= min {
		return vec![0.5; raw.len()];
	}
	raw.iter().map(|score| (score - min) / (max - min)).collect()
}

/// `0.35 * base + 0.65 * model`, as logged to ranking events.
pub fn blend(base_score: f64, model_score: f64) -> f64 {
	base_score * BLEND_BASE_WEIGHT + model_score * BLEND_MODEL_WEIGHT
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeMap;

	use super::{RerankerModel, blend, normalize_scores};

	fn model_json() -> String {
		serde_json::json!({
			"version": "xgb-test",
			"modelType": "xgboost_tree",
			"objective": "rank:pairwise",
			"baseScore": 0.5,
			"featureOrder": ["f_engagement", "f_freshness"],
			"metadata": { "treeCount": 1, "featureCount": 2 },
			"trees": [{
				"nodes": [
					{ "feature": 0, "threshold": 0.5, "left": 1, "right": 2, "defaultLeft": true },
					{ "left": -1, "right": -1, "feature": -1, "threshold": 0.0, "leaf": -0.25 },
					{ "leaf": 0.75 }
				]
			}]
		})
		.to_string()
	}

	fn features(engagement: f64) -> BTreeMap<String, f64> {
		let mut map = BTreeMap::new();
		map.insert("f_engagement".to_string(), engagement);
		map
	}

	#[test]
	fn parses_both_leaf_encodings_and_ignores_metadata() {
		let model = RerankerModel::parse(&model_json()).expect("model should parse");
		assert_eq!(model.trees[0].nodes.len(), 3);
		assert!((model.score(&features(0.2)) - 0.25).abs() < 1e-9);
		assert!((model.score(&features(0.9)) - 1.25).abs() < 1e-9);
	}

	#[test]
	fn missing_features_default_to_zero() {
		let model = RerankerModel::parse(&model_json()).expect("model should parse");
		let empty = BTreeMap::new();
		assert!((model.score(&empty) - 0.25).abs() < 1e-9);
	}

	#[test]
	fn nan_features_follow_default_left() {
		let model = RerankerModel::parse(&model_json()).expect("model should parse");
		assert!((model.score(&features(f64::NAN)) - 0.25).abs() < 1e-9);
	}

	#[test]
	fn logistic_objective_applies_sigmoid() {
		let raw = model_json().replace("rank:pairwise", "binary:logistic");
		let model = RerankerModel::parse(&raw).expect("model should parse");
		let score = model.score(&features(0.9));
		assert!(score > 0.5 && score < 1.0);
	}

	#[test]
	fn rejects_unknown_model_type() {
		let raw = model_json().replace("xgboost_tree", "linear");
		assert!(RerankerModel::parse(&raw).is_err());
	}

	#[test]
	fn cyclic_trees_score_zero() {
		let raw = serde_json::json!({
			"version": "v",
			"modelType": "xgboost_tree",
			"objective": "reg:squarederror",
			"baseScore": 0.0,
			"featureOrder": ["f_engagement"],
			"trees": [{
				"nodes": [
					{ "feature": 0, "threshold": 0.5, "left": 1, "right": 1 },
					{ "feature": 0, "threshold": 0.5, "left": 0, "right": 0 }
				]
			}]
		})
		.to_string();
		let model = RerankerModel::parse(&raw).expect("model should parse");
		assert_eq!(model.score(&features(0.1)), 0.0);
	}

	#[test]
	fn normalization_maps_min_to_zero_and_max_to_one() {
		let normalized = normalize_scores(&[1.0, 3.0, 2.0]);
		assert_eq!(normalized, vec![0.0, 1.0, 0.5]);
	}

	#[test]
	fn degenerate_scores_flatten_to_half() {
		assert_eq!(normalize_scores(&[2.0, 2.0, 2.0]), vec![0.5, 0.5, 0.5]);
		assert_eq!(normalize_scores(&[1.0, f64::NAN]), vec![0.5, 0.5]);
		assert!(normalize_scores(&[]).is_empty());
	}

	#[test]
	fn blend_weights_model_over_base() {
		assert!((blend(1.0, 0.0) - 0.35).abs() < 1e-12);
		assert!((blend(0.0, 1.0) - 0.65).abs() < 1e-12);
	}
}

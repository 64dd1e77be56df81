use std::collections::{BTreeMap, HashMap};

use time::OffsetDateTime;

use crate::{
	clamp01,
	session::{SessionContext, SessionSignalMaps},
	weights::{SignalWeights, WeightFlags, derive_weights},
};

/// Ranking view of a library entry. The service maps storage rows into this
/// before scoring so the core stays free of storage concerns.
#[derive(Debug, Clone)]
pub struct CandidateFacts {
	pub id: String,
	pub content_type: String,
	pub categories: Vec<String>,
	pub added_at: OffsetDateTime,
	pub last_shown_at: Option<OffsetDateTime>,
	pub shown_count: i64,
	pub open_count: i64,
	pub engagement_score: f64,
	pub liked: bool,
	pub embedding: Option<Vec<f32>>,
}

/// One time-preference row for the current `(hour_slot, day_type)`.
#[derive(Debug, Clone)]
pub struct TimePreferenceFact {
	pub category: String,
	pub avg_engagement: f64,
	pub sample_count: i64,
}

/// Minimum observations before a time-preference row counts as evidence.
pub const TIME_PREF_MIN_SAMPLES: i64 = 3;

/// Per-signal scores, each in [0,1] with 0.5 meaning "no evidence".
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalBreakdown {
	pub engagement: f64,
	pub semantic: f64,
	pub session: f64,
	pub time_pref: f64,
	pub freshness: f64,
	pub exploration: f64,
}

/// A scored candidate. `index` points back into the input slice so callers
/// can rejoin the full entry without the core owning it.
#[derive(Debug, Clone)]
pub struct RankedCandidate {
	pub index: usize,
	pub base_score: f64,
	pub rerank_score: Option<f64>,
	pub final_score: f64,
	pub breakdown: SignalBreakdown,
	pub features: BTreeMap<String, f64>,
}

/// Dataset-wide statistics built once per request over the candidate set.
#[derive(Debug, Default)]
pub struct DatasetStats {
	total_shown: i64,
	global_engagement_mean: f64,
	content_type_means: HashMap<String, f64>,
	category_bandits: HashMap<String, CategoryBandit>,
}

#[derive(Debug, Default, Clone, Copy)]
struct CategoryBandit {
	shown: i64,
	engagement_sum: f64,
}

impl DatasetStats {
	pub fn build(entries: &[CandidateFacts]) -> Self {
		let mut total_shown = 0i64;
		let mut weighted_engagement = 0.0f64;
		let mut type_totals: HashMap<String, (f64, i64)> = HashMap::new();
		let mut category_bandits: HashMap<String, CategoryBandit> = HashMap::new();

		for entry in entries {
			if entry.shown_count <= 0 {
				continue;
			}
			let shown = entry.shown_count;
			let engagement = clamp01(entry.engagement_score);
			total_shown += shown;
			weighted_engagement += engagement * shown as f64;

			let type_entry = type_totals.entry(entry.content_type.clone()).or_insert((0.0, 0));
			type_entry.0 += engagement * shown as f64;
			type_entry.1 += shown;

			for category in &entry.categories {
				let bandit = category_bandits.entry(category.clone()).or_default();
				bandit.shown += shown;
				bandit.engagement_sum += engagement * shown as f64;
			}
		}

		let global_engagement_mean =
			if total_shown > 0 { weighted_engagement / total_shown as f64 } else { 0.5 };
		let content_type_means = type_totals
			.into_iter()
			.map(|(content_type, (sum, shown))| (content_type, sum / shown as f64))
			.collect();

		Self { total_shown, global_engagement_mean, content_type_means, category_bandits }
	}

	pub fn total_shown(&self) -> i64 {
		self.total_shown
	}

	pub fn global_engagement_mean(&self) -> f64 {
		self.global_engagement_mean
	}

	pub fn content_type_mean(&self, content_type: &str) -> f64 {
		self.content_type_means.get(content_type).copied().unwrap_or(self.global_engagement_mean)
	}

	fn category_shown(&self, category: &str) -> i64 {
		self.category_bandits.get(category).map(|bandit| bandit.shown).unwrap_or(0)
	}

	/// Mean of the per-category bandit means over the entry's categories,
	/// falling back to the global mean when no category has observations.
	fn category_prior(&self, categories: &[String]) -> f64 {
		let mut sum = 0.0;
		let mut count = 0usize;
		for category in categories {
			if let Some(bandit) = self.category_bandits.get(category)
				&& bandit.shown > 0
			{
				sum += bandit.engagement_sum / bandit.shown as f64;
				count += 1;
			}
		}
		if count > 0 { sum / count as f64 } else { self.global_engagement_mean }
	}
}

/// Score every candidate and return them sorted by descending score. The
/// sort is stable, so equal scores keep their input order.
pub fn rank_candidates(
	entries: &[CandidateFacts],
	session: &SessionContext,
	time_prefs: &[TimePreferenceFact],
	now: OffsetDateTime,
) -> Vec<RankedCandidate> {
	let stats = DatasetStats::build(entries);
	let maps = SessionSignalMaps::build(session);
	let usable_prefs: Vec<&TimePreferenceFact> =
		time_prefs.iter().filter(|pref| pref.sample_count >= TIME_PREF_MIN_SAMPLES).collect();
	let weights = derive_weights(WeightFlags {
		has_engaged_embeddings: !session.engaged_embeddings.is_empty(),
		has_usable_time_prefs: !usable_prefs.is_empty(),
		cards_shown: session.cards_shown,
	});

	let mut ranked: Vec<RankedCandidate> = entries
		.iter()
		.enumerate()
		.map(|(index, entry)| score_candidate(index, entry, session, &maps, &usable_prefs, &stats, &weights, now))
		.collect();

	ranked.sort_by(|a, b| {
		b.final_score.partial_cmp(&a.final_score).unwrap_or(std::cmp::Ordering::Equal)
	});
	ranked
}

#[allow(clippy::too_many_arguments)]
fn score_candidate(
	index: usize,
	entry: &CandidateFacts,
	session: &SessionContext,
	maps: &SessionSignalMaps,
	usable_prefs: &[&TimePreferenceFact],
	stats: &DatasetStats,
	weights: &SignalWeights,
	now: OffsetDateTime,
) -> RankedCandidate {
	let engagement = engagement_signal(entry, stats, now);
	let semantic = semantic_signal(entry, session);
	let session_parts = session_signal(entry, session, maps);
	let time_pref = time_pref_signal(entry, usable_prefs);
	let freshness = freshness_signal(entry, now);
	let exploration_parts = exploration_signal(entry, maps, stats);

	let breakdown = SignalBreakdown {
		engagement,
		semantic,
		session: session_parts.score,
		time_pref,
		freshness,
		exploration: exploration_parts.score,
	};

	let base_score = weights.engagement * engagement
		+ weights.semantic * semantic
		+ weights.session * session_parts.score
		+ weights.time_pref * time_pref
		+ weights.freshness * freshness
		+ weights.exploration * exploration_parts.score;
	let base_score = clamp01(base_score);

	let shown = entry.shown_count.max(0) as f64;
	let mut features = BTreeMap::new();
	features.insert("f_engagement".to_string(), engagement);
	features.insert("f_semantic".to_string(), semantic);
	features.insert("f_session".to_string(), session_parts.score);
	features.insert("f_time_pref".to_string(), time_pref);
	features.insert("f_freshness".to_string(), freshness);
	features.insert("f_exploration".to_string(), exploration_parts.score);
	features.insert("f_shown_count_norm".to_string(), clamp01(shown / 20.0));
	features.insert(
		"f_open_rate".to_string(),
		(entry.open_count.max(0) as f64 / shown.max(1.0)).min(1.0),
	);
	features.insert(
		"f_days_since_added_norm".to_string(),
		clamp01(days_since(now, entry.added_at) / 120.0),
	);
	features.insert("f_is_liked".to_string(), if entry.liked { 1.0 } else { 0.0 });
	features.insert("f_is_unseen".to_string(), if entry.shown_count <= 0 { 1.0 } else { 0.0 });
	features.insert(
		"f_category_count_norm".to_string(),
		clamp01(entry.categories.len() as f64 / 4.0),
	);
	features.insert(
		"f_has_embedding".to_string(),
		if entry.embedding.is_some() { 1.0 } else { 0.0 },
	);
	features.insert(
		"f_content_type_prior".to_string(),
		clamp01(stats.content_type_mean(&entry.content_type)),
	);
	features.insert("f_session_momentum".to_string(), clamp01(session_parts.momentum / 5.0));
	features.insert("f_session_skip_pressure".to_string(), clamp01(session_parts.skip / 5.0));
	features.insert("f_session_fatigue".to_string(), clamp01(session_parts.fatigue / 4.0));
	features.insert("f_session_same_lane_boost".to_string(), session_parts.same_lane);
	features.insert(
		"f_ucb_uncertainty".to_string(),
		clamp01(exploration_parts.uncertainty / 3.0),
	);
	features.insert(
		"f_category_novelty".to_string(),
		clamp01(exploration_parts.category_novelty),
	);
	features.insert("f_session_novelty".to_string(), exploration_parts.session_novelty);

	RankedCandidate {
		index,
		base_score,
		rerank_score: None,
		final_score: base_score,
		breakdown,
		features,
	}
}

fn days_since(now: OffsetDateTime, then: OffsetDateTime) -> f64 {
	((now - then).as_seconds_f64() / 86_400.0).max(0.0)
}

/// Predicted engagement from per-entry history. Cold-start entries lean on
/// the content-type mean of the current candidate set.
fn engagement_signal(entry: &CandidateFacts, stats: &DatasetStats, now: OffsetDateTime) -> f64 {
	let type_mean = stats.content_type_mean(&entry.content_type);
	let liked_boost = if entry.liked { 0.08 } else { 0.0 };

	if entry.shown_count <= 0 {
		return clamp01(0.58 + (type_mean - 0.5) * 0.2 + liked_boost);
	}

	let shown = entry.shown_count as f64;
	let baseline = if entry.engagement_score > 0.0 {
		clamp01(entry.engagement_score) * 0.72 + type_mean * 0.28
	} else {
		type_mean * 0.9
	};
	let recency = match entry.last_shown_at {
		Some(last_shown) => (-days_since(now, last_shown) / 30.0).exp(),
		None => 0.55,
	};
	let open_signal = (entry.open_count.max(0) as f64 / shown.max(1.0)).min(1.0) * 0.2;
	let over_shown_penalty = ((shown - 10.0).max(0.0) * 0.015).min(0.22);

	clamp01(baseline * 0.67 + recency * 0.23 + open_signal + liked_boost - over_shown_penalty)
}

fn semantic_signal(entry: &CandidateFacts, session: &SessionContext) -> f64 {
	let Some(embedding) = entry.embedding.as_deref() else {
		return 0.5;
	};
	if session.engaged_embeddings.is_empty() {
		return 0.5;
	}

	let mut max_sim = 0.0f64;
	let mut sum = 0.0f64;
	for engaged in &session.engaged_embeddings {
		let sim = clamp01((cosine_similarity(embedding, engaged) + 1.0) / 2.0);
		max_sim = max_sim.max(sim);
		sum += sim;
	}
	let mean = sum / session.engaged_embeddings.len() as f64;
	max_sim * 0.65 + mean * 0.35
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
	if a.len() != b.len() || a.is_empty() {
		return 0.0;
	}
	let mut dot = 0.0f64;
	let mut norm_a = 0.0f64;
	let mut norm_b = 0.0f64;
	for (x, y) in a.iter().zip(b.iter()) {
		dot += *x as f64 * *y as f64;
		norm_a += (*x as f64).powi(2);
		norm_b += (*y as f64).powi(2);
	}
	if norm_a <= 0.0 || norm_b <= 0.0 {
		return 0.0;
	}
	dot / (norm_a.sqrt() * norm_b.sqrt())
}

struct SessionParts {
	score: f64,
	momentum: f64,
	skip: f64,
	fatigue: f64,
	same_lane: f64,
}

/// In-session momentum vs skip pressure over the entry's categories, with a
/// fatigue penalty once a lane's recency weight passes 2.
fn session_signal(
	entry: &CandidateFacts,
	session: &SessionContext,
	maps: &SessionSignalMaps,
) -> SessionParts {
	if session.cards_shown == 0 || entry.categories.is_empty() {
		return SessionParts { score: 0.5, momentum: 0.0, skip: 0.0, fatigue: 0.0, same_lane: 0.0 };
	}

	let mut momentum = 0.0;
	let mut skip = 0.0;
	let mut fatigue = 0.0;
	let mut same_lane = 0.0;
	for category in &entry.categories {
		let engaged = maps.engaged_weight(category);
		momentum += engaged;
		skip += maps.skipped_weight(category);
		fatigue += (engaged - 2.0).max(0.0);
		if maps.engaged_set.contains(category) {
			same_lane = 0.04;
		}
	}

	let score = clamp01(
		0.5 + (momentum * 0.07).min(0.32) - (skip * 0.1).min(0.34) - (fatigue * 0.04).min(0.2)
			+ same_lane,
	);
	SessionParts { score, momentum, skip, fatigue, same_lane }
}

fn time_pref_signal(entry: &CandidateFacts, usable_prefs: &[&TimePreferenceFact]) -> f64 {
	if usable_prefs.is_empty() || entry.categories.is_empty() {
		return 0.5;
	}
	let mut best: Option<f64> = None;
	for pref in usable_prefs {
		if entry.categories.iter().any(|category| category == &pref.category) {
			let value = clamp01(pref.avg_engagement);
			best = Some(best.map_or(value, |current: f64| current.max(value)));
		}
	}
	best.unwrap_or(0.5)
}

/// Piecewise freshness by age, with a "forgotten gem" boost for entries two
/// to eight weeks old and a penalty for heavily shown ones.
fn freshness_signal(entry: &CandidateFacts, now: OffsetDateTime) -> f64 {
	let days = days_since(now, entry.added_at);
	let base = if days < 1.0 {
		0.72
	} else if days < 14.0 {
		0.56
	} else if days <= 56.0 {
		0.88
	} else if days <= 120.0 {
		0.42
	} else {
		0.25
	};
	let shown_penalty = (entry.shown_count.max(0) as f64 * 0.028).min(0.35);
	let liked_boost = if entry.liked { 0.08 } else { 0.0 };
	clamp01(base - shown_penalty + liked_boost)
}

struct ExplorationParts {
	score: f64,
	uncertainty: f64,
	category_novelty: f64,
	session_novelty: f64,
}

/// UCB-style exploration: mean estimate plus an uncertainty bonus for
/// under-observed entries, plus novelty bonuses for rare and session-fresh
/// categories.
fn exploration_signal(
	entry: &CandidateFacts,
	maps: &SessionSignalMaps,
	stats: &DatasetStats,
) -> ExplorationParts {
	let shown = entry.shown_count.max(0);
	let mean_estimate = if shown > 0 {
		clamp01(entry.engagement_score)
	} else {
		stats.category_prior(&entry.categories)
	};
	let uncertainty = ((stats.total_shown() as f64 + 2.0).ln() / (shown as f64 + 1.0)).sqrt();
	let category_novelty = entry
		.categories
		.iter()
		.map(|category| 1.0 / ((stats.category_shown(category) as f64 + 1.0).sqrt()))
		.fold(0.0f64, f64::max);
	let unseen_this_session = entry.categories.iter().all(|category| {
		!maps.engaged_set.contains(category) && !maps.skipped_set.contains(category)
	});
	let session_novelty = if unseen_this_session { 0.08 } else { 0.0 };

	let score =
		clamp01(mean_estimate + 0.28 * uncertainty + 0.14 * category_novelty + session_novelty);
	ExplorationParts { score, uncertainty, category_novelty, session_novelty }
}

/// The exact feature-key set every candidate's map carries.
pub const FEATURE_KEYS: [&str; 21] = [
	"f_engagement",
	"f_semantic",
	"f_session",
	"f_time_pref",
	"f_freshness",
	"f_exploration",
	"f_shown_count_norm",
	"f_open_rate",
	"f_days_since_added_norm",
	"f_is_liked",
	"f_is_unseen",
	"f_category_count_norm",
	"f_has_embedding",
	"f_content_type_prior",
	"f_session_momentum",
	"f_session_skip_pressure",
	"f_session_fatigue",
	"f_session_same_lane_boost",
	"f_ucb_uncertainty",
	"f_category_novelty",
	"f_session_novelty",
];

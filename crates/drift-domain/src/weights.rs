/// Weights over the six ranking signals. They always sum to 1 after
/// [`derive_weights`], and every component stays non-negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalWeights {
	pub engagement: f64,
	pub semantic: f64,
	pub session: f64,
	pub time_pref: f64,
	pub freshness: f64,
	pub exploration: f64,
}

pub const BASE_WEIGHTS: SignalWeights = SignalWeights {
	engagement: 0.30,
	semantic: 0.25,
	session: 0.20,
	time_pref: 0.10,
	freshness: 0.10,
	exploration: 0.05,
};

/// Capability flags describing which signals have evidence to work with for
/// the current request.
#[derive(Debug, Clone, Copy)]
pub struct WeightFlags {
	pub has_engaged_embeddings: bool,
	pub has_usable_time_prefs: bool,
	pub cards_shown: u32,
}

impl SignalWeights {
	pub fn sum(&self) -> f64 {
		self.engagement
			+ self.semantic
			+ self.session
			+ self.time_pref
			+ self.freshness
			+ self.exploration
	}
}

/// Derive the per-request weights from the base weights and capability flags.
///
/// Signals without evidence are zeroed and their mass handed to the signals
/// that can still discriminate; deep sessions shift exploration budget back
/// toward exploitation. The result is normalized to sum to 1.
pub fn derive_weights(flags: WeightFlags) -> SignalWeights {
	let mut weights = BASE_WEIGHTS;

	if !flags.has_engaged_embeddings {
		weights.semantic = 0.0;
		weights.engagement += 0.11;
		weights.session += 0.08;
		weights.exploration += 0.06;
	}

	if !flags.has_usable_time_prefs {
		weights.time_pref = 0.0;
		weights.engagement += 0.05;
		weights.freshness += 0.05;
	}

	if flags.cards_shown == 0 {
		let moved = weights.session;
		weights.session = 0.0;
		weights.freshness += moved * 0.6;
		weights.exploration += moved * 0.4;
	}

	if flags.cards_shown > 24 {
		let moved = weights.exploration * 0.5;
		weights.exploration -= moved;
		weights.engagement += moved * 0.6;
		weights.session += moved * 0.4;
	}

	let total = weights.sum();
	if total <= 0.0 {
		return BASE_WEIGHTS;
	}
	SignalWeights {
		engagement: weights.engagement / total,
		semantic: weights.semantic / total,
		session: weights.session / total,
		time_pref: weights.time_pref / total,
		freshness: weights.freshness / total,
		exploration: weights.exploration / total,
	}
}

/// The fixed vocabulary the categorizer is allowed to pick from. Categories
/// outside this list are dropped at ingest time so the bandit statistics and
/// time-preference rows never fragment across free-form labels.
pub const VOCABULARY: [&str; 14] = [
	"AI",
	"Art",
	"Business",
	"Fashion",
	"Food",
	"Fun",
	"Gaming",
	"Health",
	"Music",
	"News",
	"Science",
	"Sports",
	"Tech",
	"Travel",
];

/// Fallback used when the categorizer fails or returns nothing usable.
pub const FALLBACK_CATEGORY: &str = "Fun";

pub fn is_known(category: &str) -> bool {
	VOCABULARY.iter().any(|known| known.eq_ignore_ascii_case(category))
}

/// Canonicalize a raw label to its vocabulary spelling, if it is known.
pub fn canonical(category: &str) -> Option<&'static str> {
	let trimmed = category.trim();
	VOCABULARY.iter().find(|known| known.eq_ignore_ascii_case(trimmed)).copied()
}

/// Keep at most `max` known categories, preserving order, deduplicated.
pub fn sanitize(raw: &[String], max: usize) -> Vec<String> {
	let mut out: Vec<String> = Vec::new();
	for label in raw {
		let Some(known) = canonical(label) else {
			continue;
		};
		if out.iter().any(|kept| kept == known) {
			continue;
		}
		out.push(known.to_string());
		if out.len() >= max {
			break;
		}
	}
	out
}

#[cfg(test)]
mod tests {
	use super::{FALLBACK_CATEGORY, canonical, is_known, sanitize};

	#[test]
	fn canonicalizes_case_and_whitespace() {
		assert_eq!(canonical(" tech "), Some("Tech"));
		assert_eq!(canonical("ai"), Some("AI"));
		assert_eq!(canonical("Blockchain"), None);
	}

	#[test]
	fn sanitize_drops_unknown_and_duplicates() {
		let raw = vec![
			"tech".to_string(),
			"Tech".to_string(),
			"cooking".to_string(),
			"Music".to_string(),
			"Art".to_string(),
		];
		assert_eq!(sanitize(&raw, 2), vec!["Tech".to_string(), "Music".to_string()]);
	}

	#[test]
	fn fallback_is_in_vocabulary() {
		assert!(is_known(FALLBACK_CATEGORY));
	}
}

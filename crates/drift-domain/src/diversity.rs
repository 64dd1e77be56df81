/// How far ahead the pass may look for an entry that breaks a category run.
const LOOKAHEAD: usize = 8;

/// Reorder a ranked list so no three consecutive items share a primary
/// category (the entry's first category). When the next eight candidates
/// would all extend the run, the head is accepted anyway rather than
/// starving the feed. Entries without categories never extend a run.
pub fn diversify<'a, T, F>(items: Vec<T>, primary: F) -> Vec<T>
where
	F: Fn(&T) -> Option<&'a str>,
{
	let mut remaining = items;
	let mut out: Vec<T> = Vec::with_capacity(remaining.len());
	let mut recent: Vec<Option<String>> = Vec::new();

	while !remaining.is_empty() {
		let run_category = run_to_break(&recent);
		let pick = match run_category {
			Some(run) => remaining
				.iter()
				.take(LOOKAHEAD)
				.position(|item| primary(item) != Some(run))
				.unwrap_or(0),
			None => 0,
		};
		let item = remaining.remove(pick);
		recent.push(primary(&item).map(str::to_string));
		out.push(item);
	}
	out
}

/// The category a next pick must avoid: set when the last two picks share a
/// primary category.
fn run_to_break(recent: &[Option<String>]) -> Option<&str> {
	let len = recent.len();
	if len < 2 {
		return None;
	}
	match (&recent[len - 2], &recent[len - 1]) {
		(Some(a), Some(b)) if a == b => Some(a.as_str()),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::{LOOKAHEAD, diversify};

	fn primaries(items: &[&'static str]) -> Vec<&'static str> {
		items.to_vec()
	}

	fn first_cat(item: &&'static str) -> Option<&'static str> {
		if item.is_empty() { None } else { Some(*item) }
	}

	fn has_triple(order: &[&'static str]) -> bool {
		order.windows(3).any(|w| !w[0].is_empty() && w[0] == w[1] && w[1] == w[2])
	}

	#[test]
	fn breaks_up_three_in_a_row() {
		let order = diversify(primaries(&["AI", "AI", "AI", "Music", "AI"]), first_cat);
		assert!(!has_triple(&order));
		assert_eq!(order, vec!["AI", "AI", "Music", "AI", "AI"]);
	}

	#[test]
	fn keeps_order_when_already_diverse() {
		let input = primaries(&["AI", "Music", "Tech", "AI", "Music"]);
		let order = diversify(input.clone(), first_cat);
		assert_eq!(order, input);
	}

	#[test]
	fn accepts_run_when_lookahead_is_exhausted() {
		// Nothing but one category: the pass must not loop or drop items.
		let input = primaries(&["AI"; LOOKAHEAD + 4]);
		let order = diversify(input.clone(), first_cat);
		assert_eq!(order.len(), input.len());
		assert!(has_triple(&order));
	}

	#[test]
	fn uncategorized_entries_never_extend_a_run() {
		let order = diversify(primaries(&["", "", "", "AI"]), first_cat);
		assert_eq!(order, vec!["", "", "", "AI"]);
	}

	#[test]
	fn swaps_within_the_lookahead_window_only() {
		// The run-breaking candidate sits beyond the window, so the head is
		// accepted even though it extends the run.
		let mut items = vec!["AI"; LOOKAHEAD + 2];
		items.push("Music");
		let order = diversify(primaries(&items), first_cat);
		assert_eq!(order.len(), items.len());
		assert_eq!(order[2], "AI");
	}
}

use std::time::Duration;

use color_eyre::{Result, eyre::eyre};
use drift_domain::categories;

use crate::auth_headers;

/// Ask the configured chat-completions model to pick one or two categories
/// from the fixed vocabulary. Callers fall back to the default category when
/// this errors; the provider itself never invents labels outside the list.
pub async fn categorize(
	cfg: &drift_config::LlmProviderConfig,
	title: &str,
	description: &str,
) -> Result<Vec<String>> {
	let client =
		reqwest::Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let messages = build_messages(title, description);

	for _ in 0..2 {
		let body = serde_json::json!({
			"model": cfg.model,
			"temperature": cfg.temperature,
			"messages": messages,
		});
		let res = client
			.post(&url)
			.headers(auth_headers(&cfg.api_key, &cfg.default_headers)?)
			.json(&body)
			.send()
			.await?;
		let json: serde_json::Value = res.error_for_status()?.json().await?;
		if let Ok(parsed) = parse_categories(json) {
			return Ok(parsed);
		}
	}

	Err(eyre!("Categorizer response is not usable JSON."))
}

fn build_messages(title: &str, description: &str) -> Vec<serde_json::Value> {
	let vocabulary = categories::VOCABULARY.join(", ");
	let system_prompt = format!(
		"You label saved content for a personal library. \
Output must be valid JSON only, shaped as {{\"categories\": [\"...\"]}}. \
Pick one or two categories, strictly from this list: {vocabulary}. \
No explanations, no extra fields."
	);
	let user_prompt = format!("Title:\n{title}\n\nDescription:\n{description}");
	vec![
		serde_json::json!({ "role": "system", "content": system_prompt }),
		serde_json::json!({ "role": "user", "content": user_prompt }),
	]
}

fn parse_categories(json: serde_json::Value) -> Result<Vec<String>> {
	let payload = if let Some(content) = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
	{
		serde_json::from_str::<serde_json::Value>(content)
			.map_err(|_| eyre!("Categorizer content is not valid JSON."))?
	} else {
		json
	};

	let raw: Vec<String> = payload
		.get("categories")
		.and_then(|v| v.as_array())
		.map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
		.ok_or_else(|| eyre!("Categorizer response is missing a categories array."))?;

	let sanitized = categories::sanitize(&raw, 2);
	if sanitized.is_empty() {
		return Err(eyre!("Categorizer returned no known categories."));
	}
	Ok(sanitized)
}

#[cfg(test)]
mod tests {
	use super::parse_categories;

	#[test]
	fn parses_choice_content_and_sanitizes() {
		let json = serde_json::json!({
			"choices": [
				{ "message": { "content": "{\"categories\": [\"tech\", \"Cooking\", \"AI\"]}" } }
			]
		});
		let parsed = parse_categories(json).expect("parse failed");
		assert_eq!(parsed, vec!["Tech".to_string(), "AI".to_string()]);
	}

	#[test]
	fn unknown_only_labels_are_an_error() {
		let json = serde_json::json!({ "categories": ["Cooking"] });
		assert!(parse_categories(json).is_err());
	}
}

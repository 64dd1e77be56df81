//! URL unfurler: fetches preview metadata for a saved link under the SSRF
//! guard. YouTube links go through the oEmbed endpoint first; everything
//! else gets a bounded HTML fetch and Open Graph extraction.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::guard::{self, FetchError, MAX_REDIRECTS};

pub const OEMBED_TIMEOUT: Duration = Duration::from_secs(5);
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(8);
/// Read no more than this many body bytes, however large the page claims
/// to be.
pub const MAX_HTML_BYTES: usize = 750_000;

const USER_AGENT: &str = "drift-unfurl/0.2 (+https://github.com/drift)";

pub const CONTENT_TYPE_YOUTUBE: &str = "youtube";
pub const CONTENT_TYPE_TWEET: &str = "tweet";
pub const CONTENT_TYPE_INSTAGRAM: &str = "instagram";
pub const CONTENT_TYPE_ARTICLE: &str = "article";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnfurlResult {
	pub url: String,
	pub title: Option<String>,
	pub description: Option<String>,
	pub thumbnail: Option<String>,
	pub site_name: Option<String>,
	pub content_type: String,
}

/// Minimal result when the target site cannot be read: the hostname stands
/// in for the title so the entry is still presentable.
pub fn fallback_result(url: &Url) -> UnfurlResult {
	let host = url.host_str().unwrap_or("link").to_string();
	UnfurlResult {
		url: url.to_string(),
		title: Some(host.clone()),
		description: None,
		thumbnail: None,
		site_name: Some(host),
		content_type: detect_content_type(url),
	}
}

pub async fn unfurl(url: &Url) -> Result<UnfurlResult, FetchError> {
	guard::validate_url(url)?;
	let content_type = detect_content_type(url);

	if content_type == CONTENT_TYPE_YOUTUBE
		&& let Some(video_id) = youtube_video_id(url)
	{
		match fetch_youtube_oembed(url, &video_id).await {
			Ok(result) => return Ok(result),
			Err(err) => {
				warn!(error = %err, "YouTube oEmbed failed; falling back to page fetch.");
			},
		}
	}

	let page = fetch_html(url).await?;
	let meta = extract_metadata(&page.body);
	Ok(UnfurlResult {
		url: url.to_string(),
		title: meta.title.or_else(|| url.host_str().map(str::to_string)),
		description: meta.description,
		thumbnail: meta.thumbnail.map(|thumb| absolutize(&page.final_url, &thumb)),
		site_name: meta.site_name.or_else(|| url.host_str().map(str::to_string)),
		content_type,
	})
}

pub fn detect_content_type(url: &Url) -> String {
	let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
	let matches_domain = |domain: &str| host == domain || host.ends_with(&format!(".{domain}"));
	if matches_domain("youtube.com") || matches_domain("youtu.be") {
		CONTENT_TYPE_YOUTUBE.to_string()
	} else if matches_domain("twitter.com") || matches_domain("x.com") {
		CONTENT_TYPE_TWEET.to_string()
	} else if matches_domain("instagram.com") {
		CONTENT_TYPE_INSTAGRAM.to_string()
	} else {
		CONTENT_TYPE_ARTICLE.to_string()
	}
}

/// Extract the 11-character video id from the usual YouTube URL shapes.
pub fn youtube_video_id(url: &Url) -> Option<String> {
	let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
	let candidate = if host == "youtu.be" || host.ends_with(".youtu.be") {
		url.path_segments().and_then(|mut segments| segments.next()).map(str::to_string)
	} else if let Some(v) = url.query_pairs().find(|(key, _)| key == "v") {
		Some(v.1.into_owned())
	} else {
		let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
		match segments.as_slice() {
			["shorts", id, ..] | ["embed", id, ..] | ["live", id, ..] => Some((*id).to_string()),
			_ => None,
		}
	};
	candidate.filter(|id| {
		id.len() == 11 && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
	})
}

async fn fetch_youtube_oembed(url: &Url, video_id: &str) -> Result<UnfurlResult, FetchError> {
	let client = reqwest::Client::builder()
		.timeout(OEMBED_TIMEOUT)
		.user_agent(USER_AGENT)
		.build()?;
	let oembed_url = Url::parse_with_params("https://www.youtube.com/oembed", [
		("url", url.as_str()),
		("format", "json"),
	])
	.map_err(|_| FetchError::Upstream { message: "oEmbed URL did not build.".to_string() })?;
	let res = client.get(oembed_url).send().await?;
	let json: serde_json::Value = res.error_for_status()?.json().await?;

	let title = json.get("title").and_then(|v| v.as_str()).map(str::to_string);
	let author = json.get("author_name").and_then(|v| v.as_str()).map(str::to_string);
	Ok(UnfurlResult {
		url: url.to_string(),
		title,
		description: author.map(|name| format!("by {name}")),
		thumbnail: Some(format!("https://i.ytimg.com/vi/{video_id}/hqdefault.jpg")),
		site_name: Some("YouTube".to_string()),
		content_type: CONTENT_TYPE_YOUTUBE.to_string(),
	})
}

pub struct FetchedPage {
	pub final_url: String,
	pub body: String,
}

/// Fetch an HTML page with manual redirects (at most [`MAX_REDIRECTS`]),
/// re-running every guard check per hop, and reading at most
/// [`MAX_HTML_BYTES`] of the body.
pub async fn fetch_html(url: &Url) -> Result<FetchedPage, FetchError> {
	let client = reqwest::Client::builder()
		.redirect(reqwest::redirect::Policy::none())
		.timeout(FETCH_TIMEOUT)
		.user_agent(USER_AGENT)
		.build()?;

	let mut current = url.clone();
	for _ in 0..=MAX_REDIRECTS {
		guard::validate_url(&current)?;
		guard::ensure_host_resolves_public(current.host_str().unwrap_or_default()).await?;

		let res = client.get(current.clone()).send().await?;
		if res.status().is_redirection() {
			let location = res
				.headers()
				.get(reqwest::header::LOCATION)
				.and_then(|value| value.to_str().ok())
				.ok_or_else(|| FetchError::Upstream {
					message: "Redirect without a Location header.".to_string(),
				})?;
			current = current.join(location).map_err(|_| FetchError::Upstream {
				message: "Redirect target did not parse.".to_string(),
			})?;
			continue;
		}

		let mut res = res.error_for_status()?;
		let content_type = res
			.headers()
			.get(reqwest::header::CONTENT_TYPE)
			.and_then(|value| value.to_str().ok())
			.unwrap_or_default()
			.to_ascii_lowercase();
		if !content_type.starts_with("text/html") {
			return Err(FetchError::Upstream {
				message: format!("Expected text/html, got {content_type:?}."),
			});
		}

		let mut body: Vec<u8> = Vec::new();
		while let Some(chunk) = res.chunk().await? {
			let remaining = MAX_HTML_BYTES - body.len();
			body.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
			if body.len() >= MAX_HTML_BYTES {
				break;
			}
		}
		return Ok(FetchedPage {
			final_url: current.to_string(),
			body: String::from_utf8_lossy(&body).into_owned(),
		});
	}

	Err(FetchError::Unsafe { reason: "redirect limit exceeded" })
}

#[derive(Debug, Default, PartialEq)]
pub struct PageMetadata {
	pub title: Option<String>,
	pub description: Option<String>,
	pub thumbnail: Option<String>,
	pub site_name: Option<String>,
}

static META_TAG: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"(?is)<meta\b[^>]*>").expect("meta tag pattern"));
static META_ATTR_KEY: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r#"(?i)\b(?:property|name)\s*=\s*["']([^"']+)["']"#).expect("meta key pattern")
});
static META_ATTR_CONTENT: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r#"(?i)\bcontent\s*=\s*["']([^"']*)["']"#).expect("meta content pattern")
});
static TITLE_TAG: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title pattern"));

/// Pull Open Graph / Twitter / `<title>` metadata out of raw HTML. Open
/// Graph wins over Twitter cards, which win over the document title.
pub fn extract_metadata(html: &str) -> PageMetadata {
	let mut og = PageMetadata::default();
	let mut twitter = PageMetadata::default();

	for tag in META_TAG.find_iter(html) {
		let tag = tag.as_str();
		let Some(key) = META_ATTR_KEY.captures(tag).map(|c| c[1].to_ascii_lowercase()) else {
			continue;
		};
		let Some(content) = META_ATTR_CONTENT.captures(tag).map(|c| decode_entities(&c[1]))
		else {
			continue;
		};
		if content.trim().is_empty() {
			continue;
		}
		match key.as_str() {
			"og:title" => og.title = Some(content),
			"og:description" => og.description = Some(content),
			"og:image" => og.thumbnail = Some(content),
			"og:site_name" => og.site_name = Some(content),
			"twitter:title" => twitter.title = Some(content),
			"twitter:description" | "description" => {
				twitter.description.get_or_insert(content);
			},
			"twitter:image" => twitter.thumbnail = Some(content),
			_ => {},
		}
	}

	let document_title = TITLE_TAG
		.captures(html)
		.map(|c| decode_entities(c[1].trim()))
		.filter(|title| !title.is_empty());

	PageMetadata {
		title: og.title.or(twitter.title).or(document_title),
		description: og.description.or(twitter.description),
		thumbnail: og.thumbnail.or(twitter.thumbnail),
		site_name: og.site_name,
	}
}

/// Decode numeric character references and the handful of named entities
/// that actually show up in page titles.
pub fn decode_entities(raw: &str) -> String {
	static ENTITY: Lazy<Regex> =
		Lazy::new(|| Regex::new(r"&(#x?[0-9a-fA-F]+|[a-zA-Z]+);").expect("entity pattern"));
	ENTITY
		.replace_all(raw, |caps: &regex::Captures<'_>| {
			let body = &caps[1];
			let decoded = if let Some(hex) = body.strip_prefix("#x").or(body.strip_prefix("#X")) {
				u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
			} else if let Some(dec) = body.strip_prefix('#') {
				dec.parse::<u32>().ok().and_then(char::from_u32)
			} else {
				match body {
					"amp" => Some('&'),
					"lt" => Some('<'),
					"gt" => Some('>'),
					"quot" => Some('"'),
					"apos" => Some('\''),
					"nbsp" => Some('\u{a0}'),
					_ => None,
				}
			};
			match decoded {
				Some(ch) => ch.to_string(),
				None => caps[0].to_string(),
			}
		})
		.into_owned()
}

fn absolutize(base: &str, candidate: &str) -> String {
	match Url::parse(base).and_then(|base| base.join(candidate)) {
		Ok(resolved) => resolved.to_string(),
		Err(_) => candidate.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use reqwest::Url;

	use super::{
		UnfurlResult, decode_entities, detect_content_type, extract_metadata, fallback_result,
		youtube_video_id,
	};

	fn url(raw: &str) -> Url {
		Url::parse(raw).expect("test URL should parse")
	}

	#[test]
	fn detects_content_types_by_hostname() {
		assert_eq!(detect_content_type(&url("https://www.youtube.com/watch?v=a")), "youtube");
		assert_eq!(detect_content_type(&url("https://youtu.be/abc")), "youtube");
		assert_eq!(detect_content_type(&url("https://x.com/user/status/1")), "tweet");
		assert_eq!(detect_content_type(&url("https://mobile.twitter.com/u/1")), "tweet");
		assert_eq!(detect_content_type(&url("https://www.instagram.com/p/x/")), "instagram");
		assert_eq!(detect_content_type(&url("https://example.com/post")), "article");
		// No substring tricks: youtube.com.evil.com is an article.
		assert_eq!(detect_content_type(&url("https://youtube.com.evil.com/")), "article");
	}

	#[test]
	fn extracts_youtube_ids_from_common_shapes() {
		let id = Some("dQw4w9WgXcQ".to_string());
		assert_eq!(youtube_video_id(&url("https://www.youtube.com/watch?v=dQw4w9WgXcQ")), id);
		assert_eq!(youtube_video_id(&url("https://youtu.be/dQw4w9WgXcQ?t=10")), id);
		assert_eq!(youtube_video_id(&url("https://www.youtube.com/shorts/dQw4w9WgXcQ")), id);
		assert_eq!(youtube_video_id(&url("https://www.youtube.com/embed/dQw4w9WgXcQ")), id);
		assert_eq!(youtube_video_id(&url("https://www.youtube.com/watch?v=short")), None);
		assert_eq!(youtube_video_id(&url("https://www.youtube.com/feed/library")), None);
	}

	#[test]
	fn open_graph_wins_over_twitter_and_title() {
		let html = r#"
			<html><head>
			<title>Document title</title>
			<meta property="og:title" content="OG title" />
			<meta name="twitter:title" content="Twitter title">
			<meta name="twitter:description" content="Tweet desc">
			<meta property="og:image" content="/img/cover.png">
			<meta property="og:site_name" content="Example &amp; Sons">
			</head></html>"#;
		let meta = extract_metadata(html);
		assert_eq!(meta.title.as_deref(), Some("OG title"));
		assert_eq!(meta.description.as_deref(), Some("Tweet desc"));
		assert_eq!(meta.thumbnail.as_deref(), Some("/img/cover.png"));
		assert_eq!(meta.site_name.as_deref(), Some("Example & Sons"));
	}

	#[test]
	fn falls_back_to_document_title() {
		let html = "<html><head><title> Plain &#8212; page </title></head></html>";
		let meta = extract_metadata(html);
		assert_eq!(meta.title.as_deref(), Some("Plain \u{2014} page"));
		assert_eq!(meta.description, None);
	}

	#[test]
	fn decodes_numeric_and_named_entities() {
		assert_eq!(decode_entities("Fish &amp; Chips &#60;3"), "Fish & Chips <3");
		assert_eq!(decode_entities("caf&#xe9;"), "caf\u{e9}");
		assert_eq!(decode_entities("a&nbsp;b"), "a\u{a0}b");
		assert_eq!(decode_entities("&apos;quoted&apos; &gt; &quot;x&quot;"), "'quoted' > \"x\"");
		// Unknown entities pass through untouched.
		assert_eq!(decode_entities("&bogus; stays"), "&bogus; stays");
	}

	#[test]
	fn unfurl_result_round_trips_through_json() {
		let result = UnfurlResult {
			url: "https://example.com/a".to_string(),
			title: Some("Title".to_string()),
			description: None,
			thumbnail: Some("https://example.com/t.png".to_string()),
			site_name: Some("Example".to_string()),
			content_type: "article".to_string(),
		};
		let first = serde_json::to_string(&result).expect("serialize");
		let parsed: UnfurlResult = serde_json::from_str(&first).expect("parse");
		let second = serde_json::to_string(&parsed).expect("serialize again");
		assert_eq!(result, parsed);
		assert_eq!(first, second);
	}

	#[test]
	fn fallback_uses_the_hostname() {
		let result = fallback_result(&url("https://blog.example.com/deep/path"));
		assert_eq!(result.title.as_deref(), Some("blog.example.com"));
		assert_eq!(result.content_type, "article");
	}
}

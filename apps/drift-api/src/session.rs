use axum::{extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::{routes::ApiError, state::AppState};

/// Fixed session cookie name.
pub const SESSION_COOKIE: &str = "drift_session";
const SESSION_TTL: Duration = Duration::days(30);

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
	sub: String,
	iat: i64,
	exp: i64,
}

/// Build the Set-Cookie value carrying a fresh 30-day session token.
pub fn issue_cookie(
	secret: &str,
	user_id: &str,
	secure: bool,
) -> Result<String, jsonwebtoken::errors::Error> {
	let now = OffsetDateTime::now_utc();
	let claims = SessionClaims {
		sub: user_id.to_string(),
		iat: now.unix_timestamp(),
		exp: (now + SESSION_TTL).unix_timestamp(),
	};
	let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))?;
	let mut cookie = format!(
		"{SESSION_COOKIE}={token}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
		SESSION_TTL.whole_seconds()
	);
	if secure {
		cookie.push_str("; Secure");
	}
	Ok(cookie)
}

/// Pull and verify the session token from a request's Cookie header.
pub fn user_id_from_parts(secret: &str, parts: &Parts) -> Option<String> {
	let header = parts.headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
	let token = header.split(';').find_map(|pair| {
		let (name, value) = pair.trim().split_once('=')?;
		(name == SESSION_COOKIE).then(|| value.to_string())
	})?;
	let data = decode::<SessionClaims>(
		&token,
		&DecodingKey::from_secret(secret.as_bytes()),
		&Validation::default(),
	)
	.ok()?;
	Some(data.claims.sub)
}

/// Extractor for routes that require a valid session.
pub struct CurrentUser(pub String);

impl FromRequestParts<AppState> for CurrentUser {
	type Rejection = ApiError;

	async fn from_request_parts(
		parts: &mut Parts,
		state: &AppState,
	) -> Result<Self, Self::Rejection> {
		user_id_from_parts(&state.service.cfg.auth.session_secret, parts)
			.map(CurrentUser)
			.ok_or_else(ApiError::auth_required)
	}
}

/// Extractor for routes (like `/auth/me`) that merely want to know who, if
/// anyone, is signed in.
pub struct MaybeUser(pub Option<String>);

impl FromRequestParts<AppState> for MaybeUser {
	type Rejection = std::convert::Infallible;

	async fn from_request_parts(
		parts: &mut Parts,
		state: &AppState,
	) -> Result<Self, Self::Rejection> {
		Ok(MaybeUser(user_id_from_parts(&state.service.cfg.auth.session_secret, parts)))
	}
}

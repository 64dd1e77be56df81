use rand::RngCore;
use sha2::{Digest, Sha256};

use drift_domain::token;
use drift_storage::models::User;

use crate::{DriftService, ServiceError, ServiceResult};

const MIN_PASSWORD_CHARS: usize = 8;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AuthCredentials {
	pub email: String,
	pub password: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct UserProfile {
	pub id: String,
	pub email: String,
}

impl From<User> for UserProfile {
	fn from(user: User) -> Self {
		Self { id: user.id, email: user.email }
	}
}

impl DriftService {
	pub async fn signup(&self, credentials: AuthCredentials) -> ServiceResult<UserProfile> {
		let email = normalize_email(&credentials.email)?;
		if credentials.password.chars().count() < MIN_PASSWORD_CHARS {
			return Err(ServiceError::validation("Password must be at least 8 characters."));
		}

		let user_id = token::new_id();
		let password_hash = hash_password(&credentials.password);
		let inserted = sqlx::query_as::<_, User>(
			"INSERT INTO users (id, email, password_hash) VALUES ($1, $2, $3) RETURNING *",
		)
		.bind(&user_id)
		.bind(&email)
		.bind(&password_hash)
		.fetch_one(&self.db.pool)
		.await;

		match inserted {
			Ok(user) => Ok(user.into()),
			Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
				Err(ServiceError::DuplicateEmail)
			},
			Err(err) => Err(err.into()),
		}
	}

	pub async fn login(&self, credentials: AuthCredentials) -> ServiceResult<UserProfile> {
		let email = normalize_email(&credentials.email)?;
		let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
			.bind(&email)
			.fetch_optional(&self.db.pool)
			.await?;

		let Some(user) = user else {
			return Err(ServiceError::InvalidCredentials);
		};
		if !verify_password(&credentials.password, &user.password_hash) {
			return Err(ServiceError::InvalidCredentials);
		}
		Ok(user.into())
	}

	pub async fn user_profile(&self, user_id: &str) -> ServiceResult<Option<UserProfile>> {
		let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
			.bind(user_id)
			.fetch_optional(&self.db.pool)
			.await?;
		Ok(user.map(UserProfile::from))
	}
}

pub(crate) fn normalize_email(raw: &str) -> ServiceResult<String> {
	let email = raw.trim().to_ascii_lowercase();
	let well_formed = email
		.split_once('@')
		.is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
	if !well_formed {
		return Err(ServiceError::validation("Email address is not valid."));
	}
	Ok(email)
}

/// Salted SHA-256, stored as `salt_hex$digest_hex`. The scheme is isolated
/// here so it can be swapped without touching callers.
pub(crate) fn hash_password(password: &str) -> String {
	let mut salt = [0u8; 16];
	rand::thread_rng().fill_bytes(&mut salt);
	format!("{}${}", hex::encode(salt), hex::encode(digest(&salt, password)))
}

pub(crate) fn verify_password(password: &str, stored: &str) -> bool {
	let Some((salt_hex, digest_hex)) = stored.split_once('$') else {
		return false;
	};
	let Ok(salt) = hex::decode(salt_hex) else {
		return false;
	};
	hex::encode(digest(&salt, password)) == digest_hex
}

fn digest(salt: &[u8], password: &str) -> [u8; 32] {
	let mut hasher = Sha256::new();
	hasher.update(salt);
	hasher.update(password.as_bytes());
	hasher.finalize().into()
}

#[cfg(test)]
mod tests {
	use super::{hash_password, normalize_email, verify_password};

	#[test]
	fn email_normalization_lowercases_and_trims() {
		assert_eq!(normalize_email("  User@Example.COM ").unwrap(), "user@example.com");
		assert!(normalize_email("not-an-email").is_err());
		assert!(normalize_email("@example.com").is_err());
		assert!(normalize_email("user@nodot").is_err());
	}

	#[test]
	fn password_hashes_verify_and_are_salted() {
		let first = hash_password("hunter2hunter2");
		let second = hash_password("hunter2hunter2");
		assert_ne!(first, second);
		assert!(verify_password("hunter2hunter2", &first));
		assert!(verify_password("hunter2hunter2", &second));
		assert!(!verify_password("wrong-password", &first));
	}

	#[test]
	fn malformed_stored_hashes_never_verify() {
		assert!(!verify_password("anything", "plainhash"));
		assert!(!verify_password("anything", "zz$notahex"));
	}
}

//! Credentials: signed session tokens and password hashes.
//!
//! Tokens are HS256 JWTs carrying the user id and role. Clients present
//! them either in the session cookie or as an `Authorization: Bearer`
//! header.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::http::{header, HeaderMap};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tutorline_core::{Identity, Role, UserId};

use crate::config::AuthConfig;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No token in the cookie or the Authorization header.
    #[error("missing credentials")]
    Missing,

    /// Token signature, expiry or shape is wrong.
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    /// Token subject is not a user id.
    #[error("invalid token subject")]
    InvalidSubject,

    /// Password hashing failed.
    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// JWT claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// User role.
    pub role: Role,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
}

/// Issues and validates session tokens.
#[derive(Clone)]
pub struct Authenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl_secs: i64,
    cookie_name: String,
}

impl Authenticator {
    #[must_use]
    pub fn new(secret: &[u8], ttl_secs: u64, cookie_name: impl Into<String>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
            ttl_secs: i64::try_from(ttl_secs).unwrap_or(i64::MAX),
            cookie_name: cookie_name.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            config.jwt_secret.as_bytes(),
            config.token_ttl_secs,
            config.cookie_name.clone(),
        )
    }

    /// Sign a token for `identity`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn issue(&self, identity: Identity) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: identity.user_id.to_string(),
            role: identity.role,
            iat: now,
            exp: now.saturating_add(self.ttl_secs),
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Check a token and return the identity it was issued for.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is forged, expired or malformed.
    pub fn validate(&self, token: &str) -> Result<Identity, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)?;
        let user_id = data
            .claims
            .sub
            .parse::<i64>()
            .map_err(|_| AuthError::InvalidSubject)?;

        Ok(Identity::new(UserId(user_id), data.claims.role))
    }

    /// Validate the credential carried by a request.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Missing`] if there is no token, or the
    /// validation error.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, AuthError> {
        let token = self.token_from_headers(headers).ok_or(AuthError::Missing)?;
        self.validate(&token)
    }

    /// The session cookie first, then a bearer token.
    #[must_use]
    pub fn token_from_headers(&self, headers: &HeaderMap) -> Option<String> {
        let from_cookie = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, value)| *name == self.cookie_name && !value.is_empty())
            .map(|(_, value)| value.to_string());

        from_cookie.or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(|token| token.trim().to_string())
                .filter(|token| !token.is_empty())
        })
    }

    /// `Set-Cookie` value carrying a fresh token.
    #[must_use]
    pub fn session_cookie(&self, token: &str) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.cookie_name, token, self.ttl_secs
        )
    }

    /// `Set-Cookie` value that clears the session cookie.
    #[must_use]
    pub fn expired_cookie(&self) -> String {
        format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", self.cookie_name)
    }
}

/// Hash a password with argon2 and a random salt.
///
/// # Errors
///
/// Returns an error if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// Check a password against a stored hash. Unparseable hashes never match.
#[must_use]
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

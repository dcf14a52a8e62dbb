//! Token issuance, verification and revocation.
//!
//! Access tokens are HS256 JWTs carrying the user id in `sub`. Logging out
//! stores a SHA-256 fingerprint of the token in `token_blacklist` until the
//! token would have expired anyway; the auth middleware rejects any token
//! whose fingerprint is present.
//!
//! The OAuth `state` round-tripped through the provider is signed with the
//! same key under its own audience.

use base64::Engine;
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{DateTime, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::auth::Claims;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(jsonwebtoken::errors::Error),

    #[error("failed to sign token: {0}")]
    Signing(jsonwebtoken::errors::Error),
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Signing(e) => ApiError::internal(format!("failed to sign token: {e}")),
            _ => ApiError::Unauthorized("Invalid or expired token".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: u64,
}

/// Lifetime of the `state` parameter handed to the OAuth provider.
pub const OAUTH_STATE_TTL_SECS: i64 = 600;
const OAUTH_STATE_AUDIENCE: &str = "finwell-oauth-state";

/// Signed OAuth `state`; the audience keeps it from passing as an access token.
#[derive(Debug, Serialize, Deserialize)]
struct OAuthStateClaims {
    nonce: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiry: Duration,
}

impl JwtKeys {
    pub fn new(secret: &str, expiry: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expiry,
        }
    }

    pub fn issue(&self, user_id: i32, email: &str) -> Result<IssuedToken, TokenError> {
        self.issue_at(user_id, email, Utc::now())
    }

    pub(crate) fn issue_at(
        &self,
        user_id: i32,
        email: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let iat = issued_at.timestamp();
        let exp = iat + self.expiry.as_secs() as i64;

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            exp: exp.max(0) as usize,
            iat: iat.max(0) as usize,
            jti: Uuid::new_v4().to_string(),
        };

        let access_token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(TokenError::Signing)?;

        Ok(IssuedToken {
            access_token,
            expires_in: self.expiry.as_secs(),
        })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let validation = Validation::new(Algorithm::HS256);

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e),
            })
    }

    pub fn issue_oauth_state(&self) -> Result<String, TokenError> {
        self.issue_oauth_state_at(Utc::now())
    }

    pub(crate) fn issue_oauth_state_at(&self, issued_at: DateTime<Utc>) -> Result<String, TokenError> {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(24)
            .map(char::from)
            .collect();
        let iat = issued_at.timestamp();
        let claims = OAuthStateClaims {
            nonce,
            aud: OAUTH_STATE_AUDIENCE.to_string(),
            iat,
            exp: iat + OAUTH_STATE_TTL_SECS,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(TokenError::Signing)
    }

    pub fn verify_oauth_state(&self, state: &str) -> Result<(), TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[OAUTH_STATE_AUDIENCE]);
        validation.leeway = 0;

        decode::<OAuthStateClaims>(state, &self.decoding, &validation)
            .map(|_| ())
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e),
            })
    }
}

/// A fresh 256-bit signing secret, base64 encoded.
pub fn generate_jwt_secret() -> String {
    let mut key = [0u8; 32];
    rand::thread_rng().fill(&mut key);
    base64::prelude::BASE64_STANDARD.encode(key)
}

/// Hex SHA-256 of the raw token; the blacklist never stores tokens themselves.
pub fn token_fingerprint(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub async fn revoke(pool: &PgPool, claims: &Claims, token: &str) -> Result<(), ApiError> {
    let user_id = claims.user_id()?;
    let expires_at = DateTime::from_timestamp(claims.exp as i64, 0).unwrap_or_else(Utc::now);

    sqlx::query(
        "INSERT INTO token_blacklist (user_id, token_hash, expires_at)
         VALUES ($1, $2, $3)
         ON CONFLICT (token_hash) DO NOTHING",
    )
    .bind(user_id)
    .bind(token_fingerprint(token))
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn is_revoked(pool: &PgPool, token: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM token_blacklist WHERE token_hash = $1)")
        .bind(token_fingerprint(token))
        .fetch_one(pool)
        .await
}

pub async fn purge_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM token_blacklist WHERE expires_at < NOW()")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn hash_password(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || hash(password, DEFAULT_COST))
        .await
        .map_err(|e| ApiError::internal(format!("password hashing task failed: {e}")))?
        .map_err(ApiError::from)
}

pub async fn verify_password(password: String, password_hash: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || verify(password, &password_hash))
        .await
        .map_err(|e| ApiError::internal(format!("password verification task failed: {e}")))?
        .map_err(ApiError::from)
}

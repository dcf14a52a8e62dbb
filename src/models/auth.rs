// src/models/auth.rs
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (user id)
    pub email: String,
    pub exp: usize, // Expiration time
    pub iat: usize, // Issued at
    pub jti: String,
}

impl Claims {
    pub fn user_id(&self) -> Result<i32, ApiError> {
        self.sub
            .parse()
            .map_err(|_| ApiError::Unauthorized("Invalid or expired token".to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// OAuth2 password-flow form (`application/x-www-form-urlencoded`).
#[derive(Debug, Deserialize)]
pub struct TokenForm {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub status: &'static str,
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OAuthTokenResponse {
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct OAuthUserInfo {
    pub email: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub name: Option<String>,
}

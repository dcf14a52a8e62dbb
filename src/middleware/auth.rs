use crate::error::ApiError;
use crate::models::auth::Claims;
use crate::services::auth::{self as tokens, TokenError};
use crate::AppState;
use axum::{
    extract::{Extension, Request},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// The raw bearer token, stored next to [`Claims`] so logout can revoke it.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

pub async fn auth_middleware(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| ApiError::Unauthorized("Token is missing".to_string()))?;

    let claims = match state.jwt.verify(token) {
        Ok(claims) => claims,
        Err(e) => {
            match &e {
                TokenError::Expired => tracing::debug!("rejected expired token"),
                _ => tracing::warn!("JWT verification failed: {}", e),
            }
            return Err(e.into());
        }
    };

    if tokens::is_revoked(&state.db_pool, token).await? {
        tracing::warn!(user_id = %claims.sub, "rejected revoked token");
        return Err(ApiError::Unauthorized("Invalid or expired token".to_string()));
    }

    request.extensions_mut().insert(BearerToken(token.to_string()));
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Routes scoped to `/users/:user_id` may only be used by that user.
pub fn ensure_owner(claims: &Claims, user_id: i32) -> Result<i32, ApiError> {
    let subject = claims.user_id()?;
    if subject != user_id {
        return Err(ApiError::Forbidden(
            "You do not have access to this resource".to_string(),
        ));
    }
    Ok(subject)
}

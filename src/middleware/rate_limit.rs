use axum::{
    extract::{ConnectInfo, Extension, MatchedPath, Request},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ApiError;
use crate::AppState;

/// Client identity: the first `X-Forwarded-For` hop when present,
/// otherwise the peer address of the connection.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit_middleware(
    Extension(state): Extension<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    let client = client_identity(request.headers(), peer);
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());

    let decision = state.rate_limiter.check(&client, &route).await;

    if !decision.allowed {
        tracing::warn!(
            client = %client,
            route = %route,
            retry_after = decision.retry_after_secs(),
            "Rate limit exceeded"
        );
        return ApiError::TooManyRequests {
            retry_after: decision.retry_after_secs(),
        }
        .into_response();
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    response
}

/// Periodically drops idle limiter state and expired blacklist rows.
pub fn spawn_cleanup_task(state: Arc<AppState>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            state.rate_limiter.cleanup().await;
            match crate::services::auth::purge_expired(&state.db_pool).await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "purged expired blacklisted tokens"),
                Err(e) => tracing::warn!(error = %e, "failed to purge token blacklist"),
            }
        }
    })
}

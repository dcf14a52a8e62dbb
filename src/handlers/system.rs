use crate::AppState;
use axum::{extract::Extension, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn system_routes() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(healthz))
        .route("/api/status", get(api_status))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn healthz(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "env": state.config.environment.as_str(),
    }))
}

async fn api_status(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let db_status = if crate::db::ping(&state.db_pool).await {
        "healthy"
    } else {
        "unhealthy"
    };
    let configured = |yes: bool| if yes { "configured" } else { "not_configured" };

    let services: Vec<&str> = crate::SERVICES
        .iter()
        .copied()
        .filter(|s| state.config.service_enabled(s))
        .collect();

    Json(json!({
        "status": "operational",
        "app": state.config.app_name,
        "version": env!("CARGO_PKG_VERSION"),
        "dependencies": {
            "database": db_status,
            "language_model": configured(state.assistant.is_configured()),
            "oauth": configured(state.config.oauth.is_some()),
        },
        "rate_limiting": {
            "backend": state.rate_limiter.backend(),
            "default_per_window": state.rate_limiter.policy().default_limit().max_requests,
            "window_seconds": state.rate_limiter.policy().default_limit().window.as_secs(),
        },
        "services": services,
    }))
}

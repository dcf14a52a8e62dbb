// lib.rs - application state and router assembly shared by the server binary and tests
use axum::{http::HeaderValue, Extension, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod llm_client;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use config::Config;
use services::assistant::Assistant;
use services::auth::JwtKeys;
use services::rate_limit::RateLimiter;

/// Names accepted by `ENABLED_SERVICES`, in mount order.
pub const SERVICES: &[&str] = &[
    "auth",
    "users",
    "financial",
    "notifications",
    "partners",
    "recommendations",
    "chat",
    "audit",
    "activity-feed",
    "events",
];

pub struct AppState {
    pub config: Config,
    pub db_pool: sqlx::PgPool,
    pub jwt: JwtKeys,
    pub rate_limiter: RateLimiter,
    pub assistant: Assistant,
    pub http_client: reqwest::Client,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let mut app = Router::new().merge(handlers::system::system_routes());

    for &service in SERVICES {
        if !state.config.service_enabled(service) {
            tracing::info!(service, "service disabled by configuration");
            continue;
        }
        let routes = match service {
            "auth" => handlers::auth::auth_routes(),
            "users" => handlers::users::user_routes(),
            "financial" => handlers::financial::financial_routes(),
            "notifications" => handlers::notifications::notification_routes(),
            "partners" => handlers::partners::partner_routes(),
            "recommendations" => handlers::recommendations::recommendation_routes(),
            "chat" => handlers::chat::chat_routes(),
            "audit" => handlers::audit::audit_routes(),
            "activity-feed" => handlers::activity::activity_routes(),
            "events" => handlers::events::event_routes(),
            _ => continue,
        };
        app = app.merge(routes);
    }

    app.layer(axum::middleware::from_fn(
        middleware::rate_limit::rate_limit_middleware,
    ))
    .layer(axum::middleware::from_fn(
        middleware::logging::request_logging_middleware,
    ))
    .layer(cors_layer(&state.config))
    .layer(Extension(state))
}

fn cors_layer(config: &Config) -> CorsLayer {
    match &config.cors_allowed_origins {
        None => CorsLayer::permissive(),
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{state, state_with};
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, _, body) = send(build_router(state()), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));

        let (status, _, body) = send(build_router(state()), get("/healthz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["env"], "development");
    }

    #[tokio::test]
    async fn test_protected_route_requires_token() {
        let (status, _, body) = send(build_router(state()), get("/users/1")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Token is missing");
    }

    #[tokio::test]
    async fn test_invalid_token_is_rejected() {
        let request = Request::builder()
            .uri("/users/1/financials")
            .header(header::AUTHORIZATION, "Bearer not.a.token")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(build_router(state()), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid or expired token");
    }

    #[tokio::test]
    async fn test_non_bearer_scheme_is_rejected() {
        let request = Request::builder()
            .uri("/chat/1/history")
            .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(build_router(state()), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_register_reports_missing_fields() {
        let request = post_json("/auth/register", json!({"email": "jane@example.com"}));
        let (status, _, body) = send(build_router(state()), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["message"],
            "Missing required fields: password, first_name, last_name"
        );
    }

    #[tokio::test]
    async fn test_register_validates_before_database() {
        let short = post_json(
            "/auth/register",
            json!({"email": "jane@example.com", "password": "short", "first_name": "J", "last_name": "D"}),
        );
        let (status, _, body) = send(build_router(state()), short).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Password must be at least 8 characters long");

        let bad_email = post_json(
            "/auth/register",
            json!({"email": "jane", "password": "long enough", "first_name": "J", "last_name": "D"}),
        );
        let (status, _, body) = send(build_router(state()), bad_email).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid email address");
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let request = Request::builder()
            .method("POST")
            .uri("/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, _, body) = send(build_router(state()), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn test_rate_limit_returns_429() {
        let app = build_router(state_with(&[("RATE_LIMIT_DEFAULT", "2/minute")]));

        let from = |ip: &str| {
            Request::builder()
                .uri("/health")
                .header("x-forwarded-for", ip)
                .body(Body::empty())
                .unwrap()
        };

        let (status, headers, _) = send(app.clone(), from("203.0.113.9")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["x-ratelimit-limit"], "2");
        assert_eq!(headers["x-ratelimit-remaining"], "1");

        send(app.clone(), from("203.0.113.9")).await;
        let (status, headers, body) = send(app.clone(), from("203.0.113.9")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(headers.contains_key(header::RETRY_AFTER));
        assert_eq!(body["message"], "Rate limit exceeded");

        // a different client is unaffected
        let (status, _, _) = send(app, from("198.51.100.7")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_disabled_services_are_not_mounted() {
        let app = build_router(state_with(&[("ENABLED_SERVICES", "users")]));
        let (status, _, _) = send(app, post_json("/chat/start", json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_oauth_login_requires_configuration() {
        let (status, _, body) = send(build_router(state()), get("/auth/oauth/login")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["message"], "OAuth login is not configured");
    }

    #[tokio::test]
    async fn test_oauth_login_redirects_to_provider() {
        let app = build_router(state_with(&[
            ("OAUTH_PROVIDER_URL", "https://id.example.com/oauth"),
            ("OAUTH_CLIENT_ID", "finwell"),
            ("OAUTH_CLIENT_SECRET", "secret"),
        ]));
        let response = app.oneshot(get("/auth/oauth/login")).await.unwrap();
        assert!(response.status().is_redirection());

        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://id.example.com/oauth/authorize?"));
        assert!(location.contains("client_id=finwell"));
        assert!(location.contains("response_type=code"));
    }

    #[tokio::test]
    async fn test_event_logging_endpoints() {
        let ok = post_json(
            "/logs/user-events",
            json!({"user_id": 1, "event": "login", "details": {"ip": "127.0.0.1"}}),
        );
        let (status, _, body) = send(build_router(state()), ok).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");

        let missing = post_json("/logs/order-event", json!({"user_id": 1, "status": "placed"}));
        let (status, _, body) = send(build_router(state()), missing).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Missing required fields: order_id");
    }
}

//! Client-reported events written to the structured log stream. Nothing is
//! persisted; log shipping picks these up like any other tracing event.

use crate::error::ApiResult;
use crate::extract::AppJson;
use crate::require_fields;
use axum::{response::Json, routing::post, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

pub fn event_routes() -> Router {
    Router::new()
        .route("/logs/user-events", post(log_user_event))
        .route("/logs/order-event", post(log_order_event))
        .route("/logs/affordability-analysis", post(log_affordability_analysis))
}

#[derive(Debug, Deserialize)]
struct UserEvent {
    user_id: Option<Value>,
    event: Option<String>,
    details: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct OrderEvent {
    user_id: Option<Value>,
    order_id: Option<Value>,
    status: Option<String>,
    provider_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct AffordabilityEvent {
    user_id: Option<Value>,
    item: Option<String>,
    price: Option<Decimal>,
    result: Option<Value>,
}

async fn log_user_event(AppJson(payload): AppJson<UserEvent>) -> ApiResult<Json<Value>> {
    let details = payload.details.unwrap_or_else(|| json!({}));
    require_fields!(payload { user_id, event });

    tracing::info!(
        target: "events",
        user_id = %user_id,
        event = %event,
        details = %details,
        "User Event"
    );

    Ok(Json(json!({ "status": "success", "message": "Event logged." })))
}

async fn log_order_event(AppJson(payload): AppJson<OrderEvent>) -> ApiResult<Json<Value>> {
    let provider_id = payload.provider_id.unwrap_or(Value::Null);
    require_fields!(payload { user_id, order_id, status });

    tracing::info!(
        target: "events",
        user_id = %user_id,
        order_id = %order_id,
        status = %status,
        provider_id = %provider_id,
        "Order Event"
    );

    Ok(Json(json!({ "status": "success", "message": "Order event logged." })))
}

async fn log_affordability_analysis(
    AppJson(payload): AppJson<AffordabilityEvent>,
) -> ApiResult<Json<Value>> {
    let result = payload.result.unwrap_or(Value::Null);
    require_fields!(payload { user_id, item, price });

    tracing::info!(
        target: "events",
        user_id = %user_id,
        item = %item,
        price = %price,
        result = %result,
        "Affordability Analysis"
    );

    Ok(Json(json!({
        "status": "success",
        "message": "Affordability analysis logged.",
    })))
}

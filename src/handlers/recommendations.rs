use crate::error::{ApiError, ApiResult};
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::middleware::auth::{auth_middleware, ensure_owner};
use crate::models::auth::Claims;
use crate::models::recommendation::{
    CreateRecommendationRequest, Recommendation, RecommendationFeedbackRequest,
    RecommendationQuery, DEFAULT_RECOMMENDATION_TYPE,
};
use crate::require_fields;
use crate::AppState;
use axum::{
    extract::Extension,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn recommendation_routes() -> Router {
    Router::new()
        .route(
            "/users/:user_id/recommendations",
            get(list_recommendations).post(create_recommendation),
        )
        .route("/recommendations/:recommendation_id", get(get_recommendation))
        .route(
            "/recommendations/:recommendation_id/feedback",
            post(recommendation_feedback),
        )
        .route_layer(axum::middleware::from_fn(auth_middleware))
}

/// Feedback rows are keyed by a free-form message id shared with chat.
fn feedback_key(recommendation_id: i32) -> String {
    format!("recommendation:{recommendation_id}")
}

async fn list_recommendations(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(user_id): AppPath<i32>,
    AppQuery(query): AppQuery<RecommendationQuery>,
) -> ApiResult<Json<Value>> {
    ensure_owner(&claims, user_id)?;

    let recommendations = sqlx::query_as::<_, Recommendation>(
        "SELECT * FROM recommendations
         WHERE user_id = $1 AND ($2::TEXT IS NULL OR recommendation_type = $2)
         ORDER BY created_at DESC",
    )
    .bind(user_id)
    .bind(query.recommendation_type)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(json!({ "status": "success", "data": recommendations })))
}

async fn create_recommendation(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(user_id): AppPath<i32>,
    AppJson(payload): AppJson<CreateRecommendationRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    ensure_owner(&claims, user_id)?;

    let recommendation_type = payload
        .recommendation_type
        .unwrap_or_else(|| DEFAULT_RECOMMENDATION_TYPE.to_string());
    let preferences = payload.preferences.unwrap_or_default();
    require_fields!(payload { context });

    let content = state
        .assistant
        .generate_recommendation(&context, &preferences)
        .await;

    let recommendation = sqlx::query_as::<_, Recommendation>(
        "INSERT INTO recommendations (user_id, recommendation_type, context, content)
         VALUES ($1, $2, $3, $4)
         RETURNING *",
    )
    .bind(user_id)
    .bind(&recommendation_type)
    .bind(&context)
    .bind(&content)
    .fetch_one(&state.db_pool)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "success", "data": recommendation })),
    ))
}

async fn get_recommendation(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(recommendation_id): AppPath<i32>,
) -> ApiResult<Json<Value>> {
    let user_id = claims.user_id()?;

    // Another user's recommendation is reported as missing.
    let recommendation = sqlx::query_as::<_, Recommendation>(
        "SELECT * FROM recommendations WHERE id = $1 AND user_id = $2",
    )
    .bind(recommendation_id)
    .bind(user_id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Recommendation not found"))?;

    Ok(Json(json!({ "status": "success", "data": recommendation })))
}

async fn recommendation_feedback(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(recommendation_id): AppPath<i32>,
    AppJson(payload): AppJson<RecommendationFeedbackRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let user_id = claims.user_id()?;
    require_fields!(payload { feedback });

    let owned: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM recommendations WHERE id = $1 AND user_id = $2)",
    )
    .bind(recommendation_id)
    .bind(user_id)
    .fetch_one(&state.db_pool)
    .await?;
    if !owned {
        return Err(ApiError::not_found("Recommendation not found"));
    }

    let feedback_id: i32 = sqlx::query_scalar(
        "INSERT INTO feedback (message_id, user_id, feedback) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(feedback_key(recommendation_id))
    .bind(user_id)
    .bind(&feedback)
    .fetch_one(&state.db_pool)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": "Feedback submitted successfully",
            "feedback_id": feedback_id,
        })),
    ))
}

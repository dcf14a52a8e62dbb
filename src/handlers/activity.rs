use crate::error::ApiResult;
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::middleware::auth::{auth_middleware, ensure_owner};
use crate::models::audit::{Activity, ActivityQuery, CreateActivityRequest};
use crate::models::auth::Claims;
use crate::require_fields;
use crate::services::audit::insert_activity;
use crate::utils::{parse_date_param, Pagination, DEFAULT_PAGE_SIZE};
use crate::AppState;
use axum::{
    extract::Extension,
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use sqlx::{Postgres, QueryBuilder};
use std::sync::Arc;

pub fn activity_routes() -> Router {
    Router::new()
        .route(
            "/users/:user_id/activity-feed",
            get(list_activity).post(create_activity),
        )
        .route_layer(axum::middleware::from_fn(auth_middleware))
}

async fn list_activity(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(user_id): AppPath<i32>,
    AppQuery(query): AppQuery<ActivityQuery>,
) -> ApiResult<Json<Value>> {
    ensure_owner(&claims, user_id)?;

    let start = parse_date_param("start_date", query.start_date.as_deref())?;
    let end = parse_date_param("end_date", query.end_date.as_deref())?;
    let (limit, offset) = Pagination {
        limit: query.limit,
        offset: query.offset,
    }
    .resolve(DEFAULT_PAGE_SIZE);

    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT * FROM activity_feed WHERE user_id = ");
    builder.push_bind(user_id);
    if let Some(action_type) = query.action_type {
        builder.push(" AND action_type = ").push_bind(action_type);
    }
    if let (Some(start), Some(end)) = (start, end) {
        builder
            .push(" AND created_at BETWEEN ")
            .push_bind(start)
            .push(" AND ")
            .push_bind(end);
    }
    builder
        .push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let activities = builder
        .build_query_as::<Activity>()
        .fetch_all(&state.db_pool)
        .await?;

    Ok(Json(json!({ "status": "success", "data": activities })))
}

async fn create_activity(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(user_id): AppPath<i32>,
    AppJson(payload): AppJson<CreateActivityRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    ensure_owner(&claims, user_id)?;
    require_fields!(payload { action_type, details });

    let activity_id = insert_activity(&state.db_pool, user_id, &action_type, &details).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": "Activity logged successfully",
            "activity_id": activity_id,
        })),
    ))
}

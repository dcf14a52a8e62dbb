use crate::error::{ApiError, ApiResult};
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::middleware::auth::{auth_middleware, ensure_owner};
use crate::models::auth::Claims;
use crate::models::notification::{
    CreateNotificationRequest, MarkReadRequest, Notification, NotificationQuery,
    UpdateNotificationRequest,
};
use crate::require_fields;
use crate::utils::parse_date_param;
use crate::AppState;
use axum::{
    extract::Extension,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use sqlx::{Postgres, QueryBuilder};
use std::sync::Arc;

pub fn notification_routes() -> Router {
    Router::new()
        .route(
            "/users/:user_id/notifications",
            get(list_notifications).post(create_notification),
        )
        .route(
            "/users/:user_id/notifications/read",
            post(mark_notifications_read),
        )
        .route(
            "/users/:user_id/notifications/:notification_id",
            get(get_notification).put(update_notification),
        )
        .route_layer(axum::middleware::from_fn(auth_middleware))
}

async fn list_notifications(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(user_id): AppPath<i32>,
    AppQuery(query): AppQuery<NotificationQuery>,
) -> ApiResult<Json<Value>> {
    ensure_owner(&claims, user_id)?;
    let start = parse_date_param("start_date", query.start_date.as_deref())?;

    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT * FROM notifications WHERE user_id = ");
    builder.push_bind(user_id);

    if let Some(read_status) = query.read_status {
        builder.push(" AND read_status = ").push_bind(read_status);
    }
    if let Some(start) = start {
        builder.push(" AND created_at >= ").push_bind(start);
    }
    builder.push(" ORDER BY created_at DESC");

    let notifications = builder
        .build_query_as::<Notification>()
        .fetch_all(&state.db_pool)
        .await?;

    Ok(Json(json!({ "status": "success", "data": notifications })))
}

async fn create_notification(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(user_id): AppPath<i32>,
    AppJson(payload): AppJson<CreateNotificationRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    ensure_owner(&claims, user_id)?;

    let metadata = payload.metadata.unwrap_or_else(|| json!({}));
    require_fields!(payload { message, notification_type as "type" });

    let notification_id: i32 = sqlx::query_scalar(
        "INSERT INTO notifications (user_id, message, notification_type, metadata)
         VALUES ($1, $2, $3, $4)
         RETURNING id",
    )
    .bind(user_id)
    .bind(&message)
    .bind(&notification_type)
    .bind(&metadata)
    .fetch_one(&state.db_pool)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": "Notification created successfully",
            "notification_id": notification_id,
        })),
    ))
}

async fn get_notification(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath((user_id, notification_id)): AppPath<(i32, i32)>,
) -> ApiResult<Json<Value>> {
    ensure_owner(&claims, user_id)?;

    let notification = sqlx::query_as::<_, Notification>(
        "SELECT * FROM notifications WHERE id = $1 AND user_id = $2",
    )
    .bind(notification_id)
    .bind(user_id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Notification not found"))?;

    Ok(Json(json!({ "status": "success", "data": notification })))
}

async fn update_notification(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath((user_id, notification_id)): AppPath<(i32, i32)>,
    AppJson(payload): AppJson<UpdateNotificationRequest>,
) -> ApiResult<Json<Value>> {
    ensure_owner(&claims, user_id)?;
    require_fields!(payload { read_status });

    let updated = sqlx::query(
        "UPDATE notifications SET read_status = $1, updated_at = NOW()
         WHERE id = $2 AND user_id = $3",
    )
    .bind(read_status)
    .bind(notification_id)
    .bind(user_id)
    .execute(&state.db_pool)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(ApiError::not_found("Notification not found"));
    }

    Ok(Json(json!({
        "status": "success",
        "message": "Notification updated successfully",
    })))
}

async fn mark_notifications_read(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(user_id): AppPath<i32>,
    AppJson(payload): AppJson<MarkReadRequest>,
) -> ApiResult<Json<Value>> {
    ensure_owner(&claims, user_id)?;
    require_fields!(payload { notification_ids });

    if notification_ids.is_empty() {
        return Err(ApiError::bad_request("notification_ids must not be empty"));
    }

    let updated: Vec<i32> = sqlx::query_scalar(
        "UPDATE notifications SET read_status = TRUE, updated_at = NOW()
         WHERE user_id = $1 AND id = ANY($2)
         RETURNING id",
    )
    .bind(user_id)
    .bind(&notification_ids)
    .fetch_all(&state.db_pool)
    .await?;

    tracing::debug!(user_id, count = updated.len(), "notifications marked read");

    Ok(Json(json!({
        "status": "success",
        "message": "Notifications marked as read",
        "updated_ids": updated,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{call, seed_user, state_for_pool};
    use sqlx::PgPool;

    async fn notify(state: &Arc<AppState>, user_id: i32, token: &str, message: &str) -> i64 {
        let (status, body) = call(
            state,
            "POST",
            &format!("/users/{user_id}/notifications"),
            Some(token),
            Some(json!({"message": message, "type": "budget"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["notification_id"].as_i64().unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_create_reports_missing_type(pool: PgPool) {
        let state = state_for_pool(pool);
        let (user_id, token) = seed_user(&state, "notify@example.com").await;

        let (status, body) = call(
            &state,
            "POST",
            &format!("/users/{user_id}/notifications"),
            Some(&token),
            Some(json!({"message": "Rent is due"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Missing required fields: type");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_mark_read_returns_only_updated_ids(pool: PgPool) {
        let state = state_for_pool(pool);
        let (user_id, token) = seed_user(&state, "reader@example.com").await;
        let (other_id, other_token) = seed_user(&state, "bystander@example.com").await;

        let first = notify(&state, user_id, &token, "Rent is due").await;
        let second = notify(&state, user_id, &token, "Salary received").await;
        let foreign = notify(&state, other_id, &other_token, "Not yours").await;

        let (status, body) = call(
            &state,
            "POST",
            &format!("/users/{user_id}/notifications/read"),
            Some(&token),
            Some(json!({"notification_ids": [first, foreign, 999_999]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["updated_ids"], json!([first]));

        let (_, body) = call(
            &state,
            "GET",
            &format!("/users/{user_id}/notifications?read_status=false"),
            Some(&token),
            None,
        )
        .await;
        let unread: Vec<i64> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|n| n["id"].as_i64().unwrap())
            .collect();
        assert_eq!(unread, vec![second]);

        // the other user's notification was left alone
        let (_, body) = call(
            &state,
            "GET",
            &format!("/users/{other_id}/notifications/{foreign}"),
            Some(&other_token),
            None,
        )
        .await;
        assert_eq!(body["data"]["read_status"], false);

        let (status, body) = call(
            &state,
            "POST",
            &format!("/users/{user_id}/notifications/read"),
            Some(&token),
            Some(json!({"notification_ids": []})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "notification_ids must not be empty");
    }
}

use crate::error::{ApiError, ApiResult};
use crate::extract::{AppJson, AppPath};
use crate::middleware::auth::{auth_middleware, ensure_owner};
use crate::models::auth::Claims;
use crate::models::user::{CreateUserRequest, UpdateUserRequest, User};
use crate::require_fields;
use crate::services::audit::{self, AuditAction};
use crate::services::auth::hash_password;
use crate::utils::is_valid_email;
use crate::AppState;
use axum::{
    extract::Extension,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

const ACCOUNT_STATUSES: &[&str] = &["active", "inactive", "suspended"];

pub fn user_routes() -> Router {
    Router::new()
        .route("/users", post(create_user))
        .route(
            "/users/:user_id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users/:user_id/preferences", get(get_preferences))
        .route_layer(axum::middleware::from_fn(auth_middleware))
}

async fn create_user(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppJson(payload): AppJson<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let phone_number = payload.phone_number;
    let gender = payload.gender;
    let date_of_birth = payload.date_of_birth;
    let address = payload.address;
    let password = payload.password;
    let preferences = payload.preferences.unwrap_or_else(|| json!({}));
    require_fields!(payload { first_name, last_name, email });

    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(ApiError::bad_request("Invalid email address"));
    }
    if !preferences.is_object() {
        return Err(ApiError::bad_request("preferences must be an object"));
    }

    let password_hash = match password {
        Some(password) => Some(hash_password(password).await?),
        None => None,
    };

    let created: Option<(i32, DateTime<Utc>)> = sqlx::query_as(
        "INSERT INTO users
            (email, password_hash, first_name, last_name, phone_number, gender,
             date_of_birth, address, preferences)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         ON CONFLICT (email) DO NOTHING
         RETURNING id, created_at",
    )
    .bind(&email)
    .bind(password_hash)
    .bind(&first_name)
    .bind(&last_name)
    .bind(phone_number)
    .bind(gender)
    .bind(date_of_birth)
    .bind(address)
    .bind(&preferences)
    .fetch_optional(&state.db_pool)
    .await?;

    let (user_id, created_at) =
        created.ok_or_else(|| ApiError::bad_request("Email already registered"))?;

    audit::record(
        &state.db_pool,
        "users",
        user_id,
        AuditAction::Create,
        Some(json!({ "email": email })),
        claims.user_id()?,
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "data": { "user_id": user_id, "created_at": created_at },
        })),
    ))
}

async fn fetch_user(state: &AppState, user_id: i32) -> ApiResult<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

async fn get_user(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(user_id): AppPath<i32>,
) -> ApiResult<Json<Value>> {
    ensure_owner(&claims, user_id)?;
    let user = fetch_user(&state, user_id).await?;
    Ok(Json(json!({ "status": "success", "data": user })))
}

async fn update_user(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(user_id): AppPath<i32>,
    AppJson(payload): AppJson<UpdateUserRequest>,
) -> ApiResult<Json<Value>> {
    let actor = ensure_owner(&claims, user_id)?;

    if payload.is_empty() {
        return Err(ApiError::bad_request("No fields to update"));
    }
    if let Some(status) = payload.account_status.as_deref() {
        if !ACCOUNT_STATUSES.contains(&status) {
            return Err(ApiError::bad_request(format!(
                "account_status must be one of: {}",
                ACCOUNT_STATUSES.join(", ")
            )));
        }
    }
    if payload.preferences.as_ref().is_some_and(|p| !p.is_object()) {
        return Err(ApiError::bad_request("preferences must be an object"));
    }

    let updated_at: Option<DateTime<Utc>> = sqlx::query_scalar(
        "UPDATE users SET
            first_name = COALESCE($2, first_name),
            last_name = COALESCE($3, last_name),
            phone_number = COALESCE($4, phone_number),
            gender = COALESCE($5, gender),
            date_of_birth = COALESCE($6, date_of_birth),
            address = COALESCE($7, address),
            preferences = COALESCE($8, preferences),
            account_status = COALESCE($9, account_status),
            updated_at = NOW()
         WHERE id = $1
         RETURNING updated_at",
    )
    .bind(user_id)
    .bind(&payload.first_name)
    .bind(&payload.last_name)
    .bind(&payload.phone_number)
    .bind(&payload.gender)
    .bind(payload.date_of_birth)
    .bind(&payload.address)
    .bind(&payload.preferences)
    .bind(&payload.account_status)
    .fetch_optional(&state.db_pool)
    .await?;

    let updated_at = updated_at.ok_or_else(|| ApiError::not_found("User not found"))?;

    audit::record(
        &state.db_pool,
        "users",
        user_id,
        AuditAction::Update,
        serde_json::to_value(&payload).ok(),
        actor,
    )
    .await;

    Ok(Json(json!({
        "status": "success",
        "message": "User updated successfully",
        "updated_at": updated_at,
    })))
}

async fn delete_user(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(user_id): AppPath<i32>,
) -> ApiResult<Json<Value>> {
    let actor = ensure_owner(&claims, user_id)?;

    let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(&state.db_pool)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(ApiError::not_found("User not found"));
    }

    audit::record(&state.db_pool, "users", user_id, AuditAction::Delete, None, actor).await;
    tracing::info!(user_id, "user deleted");

    Ok(Json(json!({
        "status": "success",
        "message": "User deleted successfully",
    })))
}

async fn get_preferences(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(user_id): AppPath<i32>,
) -> ApiResult<Json<Value>> {
    ensure_owner(&claims, user_id)?;

    let preferences: Value = sqlx::query_scalar("SELECT preferences FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(json!({ "status": "success", "data": preferences })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{call, seed_user, state_for_pool};
    use sqlx::PgPool;

    #[sqlx::test(migrations = "./migrations")]
    async fn test_created_user_reads_back(pool: PgPool) {
        let state = state_for_pool(pool);
        let (_, admin_token) = seed_user(&state, "admin@example.com").await;

        let (status, created) = call(
            &state,
            "POST",
            "/users",
            Some(&admin_token),
            Some(json!({
                "first_name": "Grace",
                "last_name": "Hopper",
                "email": "Grace@Example.com",
                "phone_number": "+254700000000",
                "gender": "female",
                "date_of_birth": "1906-12-09",
                "address": "Arlington",
                "preferences": {"currency": "KES"},
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let user_id = created["data"]["user_id"].as_i64().unwrap() as i32;

        let token = state.jwt.issue(user_id, "grace@example.com").unwrap().access_token;
        let (status, body) = call(&state, "GET", &format!("/users/{user_id}"), Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let user = &body["data"];
        assert_eq!(user["id"], user_id);
        assert_eq!(user["email"], "grace@example.com");
        assert_eq!(user["first_name"], "Grace");
        assert_eq!(user["last_name"], "Hopper");
        assert_eq!(user["phone_number"], "+254700000000");
        assert_eq!(user["gender"], "female");
        assert_eq!(user["date_of_birth"], "1906-12-09");
        assert_eq!(user["address"], "Arlington");
        assert_eq!(user["preferences"], json!({"currency": "KES"}));
        assert_eq!(user["account_status"], "active");
        assert!(user.get("password_hash").is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_other_users_are_forbidden(pool: PgPool) {
        let state = state_for_pool(pool);
        let (owner_id, owner_token) = seed_user(&state, "owner@example.com").await;
        let (_, other_token) = seed_user(&state, "other@example.com").await;
        let uri = format!("/users/{owner_id}");

        let (status, body) = call(&state, "GET", &uri, Some(&other_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "You do not have access to this resource");

        let (status, _) = call(
            &state,
            "PUT",
            &uri,
            Some(&other_token),
            Some(json!({"first_name": "Mallory"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(&state, "DELETE", &uri, Some(&other_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // nothing changed for the owner
        let (status, body) = call(&state, "GET", &uri, Some(&owner_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["first_name"], "Test");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_update_then_delete_own_account(pool: PgPool) {
        let state = state_for_pool(pool);
        let (user_id, token) = seed_user(&state, "self@example.com").await;
        let uri = format!("/users/{user_id}");

        let (status, body) = call(
            &state,
            "PUT",
            &uri,
            Some(&token),
            Some(json!({"account_status": "dormant"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "account_status must be one of: active, inactive, suspended");

        let (status, _) = call(&state, "PUT", &uri, Some(&token), Some(json!({"last_name": "Renamed"}))).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = call(&state, "GET", &uri, Some(&token), None).await;
        assert_eq!(body["data"]["last_name"], "Renamed");

        let (status, _) = call(&state, "DELETE", &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&state, "GET", &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

use crate::error::{ApiError, ApiResult};
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::middleware::auth::auth_middleware;
use crate::models::auth::Claims;
use crate::models::partner::{
    CreateOrderRequest, OnboardPartnerRequest, Partner, PartnerAction, PartnerActionRequest,
    PartnerQuery, PartnerSummary, UpdatePartnerRequest, STATUS_PENDING,
};
use crate::require_fields;
use crate::services::audit::{self, AuditAction};
use crate::utils::{ensure_money, is_valid_email, Pagination, DEFAULT_PAGE_SIZE};
use crate::AppState;
use axum::{
    extract::Extension,
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::{Postgres, QueryBuilder};
use std::sync::Arc;

pub fn partner_routes() -> Router {
    Router::new()
        .route("/partners", get(list_partners).post(onboard_partner))
        .route(
            "/partners/:partner_id",
            get(get_partner).put(update_partner).delete(delete_partner),
        )
        .route("/partners/:partner_id/approve", put(review_partner))
        .route("/partners/:partner_id/orders", post(create_order))
        .route_layer(axum::middleware::from_fn(auth_middleware))
}

async fn onboard_partner(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppJson(payload): AppJson<OnboardPartnerRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let owner = claims.user_id()?;
    let phone = payload.phone;
    let service_description = payload.service_description;
    let website_url = payload.website_url;
    let services_offered = payload.services_offered.unwrap_or_else(|| json!([]));
    require_fields!(payload {
        partner_name,
        contact_person,
        email,
        service_type,
        api_endpoint,
    });

    if !is_valid_email(&email) {
        return Err(ApiError::bad_request("Invalid email address"));
    }

    let (partner_id, created_at): (i32, DateTime<Utc>) = sqlx::query_as(
        "INSERT INTO partners
            (partner_name, contact_person, email, phone, service_type,
             service_description, website_url, api_endpoint, services_offered,
             user_id, status)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         RETURNING id, created_at",
    )
    .bind(&partner_name)
    .bind(&contact_person)
    .bind(&email)
    .bind(phone)
    .bind(&service_type)
    .bind(service_description)
    .bind(website_url)
    .bind(&api_endpoint)
    .bind(&services_offered)
    .bind(owner)
    .bind(STATUS_PENDING)
    .fetch_one(&state.db_pool)
    .await?;

    audit::record(
        &state.db_pool,
        "partners",
        partner_id,
        AuditAction::Create,
        Some(json!({ "partner_name": partner_name, "service_type": service_type })),
        owner,
    )
    .await;

    tracing::info!(partner_id, %partner_name, "partner onboarded");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": "Partner onboarded successfully",
            "data": {
                "partner_id": partner_id,
                "status": STATUS_PENDING,
                "created_at": created_at,
            },
        })),
    ))
}

async fn list_partners(
    Extension(state): Extension<Arc<AppState>>,
    AppQuery(query): AppQuery<PartnerQuery>,
) -> ApiResult<Json<Value>> {
    let (limit, offset) = Pagination {
        limit: query.limit,
        offset: query.offset,
    }
    .resolve(DEFAULT_PAGE_SIZE);

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT id, partner_name, service_type, status, created_at FROM partners WHERE TRUE",
    );
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status);
    }
    if let Some(user_id) = query.user_id {
        builder.push(" AND user_id = ").push_bind(user_id);
    }
    builder
        .push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let partners = builder
        .build_query_as::<PartnerSummary>()
        .fetch_all(&state.db_pool)
        .await?;

    Ok(Json(json!({ "status": "success", "data": partners })))
}

async fn get_partner(
    Extension(state): Extension<Arc<AppState>>,
    AppPath(partner_id): AppPath<i32>,
) -> ApiResult<Json<Value>> {
    let partner = sqlx::query_as::<_, Partner>("SELECT * FROM partners WHERE id = $1")
        .bind(partner_id)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Partner not found"))?;

    Ok(Json(json!({ "status": "success", "data": partner })))
}

async fn update_partner(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(partner_id): AppPath<i32>,
    AppJson(payload): AppJson<UpdatePartnerRequest>,
) -> ApiResult<Json<Value>> {
    let actor = claims.user_id()?;

    if payload.email.as_deref().is_some_and(|e| !is_valid_email(e)) {
        return Err(ApiError::bad_request("Invalid email address"));
    }

    let updated_at: Option<DateTime<Utc>> = sqlx::query_scalar(
        "UPDATE partners SET
            partner_name = COALESCE($2, partner_name),
            contact_person = COALESCE($3, contact_person),
            email = COALESCE($4, email),
            phone = COALESCE($5, phone),
            service_type = COALESCE($6, service_type),
            service_description = COALESCE($7, service_description),
            website_url = COALESCE($8, website_url),
            api_endpoint = COALESCE($9, api_endpoint),
            services_offered = COALESCE($10, services_offered),
            updated_at = NOW()
         WHERE id = $1
         RETURNING updated_at",
    )
    .bind(partner_id)
    .bind(&payload.partner_name)
    .bind(&payload.contact_person)
    .bind(&payload.email)
    .bind(&payload.phone)
    .bind(&payload.service_type)
    .bind(&payload.service_description)
    .bind(&payload.website_url)
    .bind(&payload.api_endpoint)
    .bind(&payload.services_offered)
    .fetch_optional(&state.db_pool)
    .await?;

    let updated_at = updated_at.ok_or_else(|| ApiError::not_found("Partner not found"))?;

    audit::record(
        &state.db_pool,
        "partners",
        partner_id,
        AuditAction::Update,
        serde_json::to_value(&payload).ok(),
        actor,
    )
    .await;

    Ok(Json(json!({
        "status": "success",
        "message": "Partner updated successfully",
        "updated_at": updated_at,
    })))
}

async fn delete_partner(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(partner_id): AppPath<i32>,
) -> ApiResult<Json<Value>> {
    let actor = claims.user_id()?;

    let deleted = sqlx::query("DELETE FROM partners WHERE id = $1")
        .bind(partner_id)
        .execute(&state.db_pool)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(ApiError::not_found("Partner not found"));
    }

    audit::record(&state.db_pool, "partners", partner_id, AuditAction::Delete, None, actor).await;

    Ok(Json(json!({
        "status": "success",
        "message": "Partner deleted successfully",
    })))
}

async fn review_partner(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(partner_id): AppPath<i32>,
    AppJson(payload): AppJson<PartnerActionRequest>,
) -> ApiResult<Json<Value>> {
    let actor = claims.user_id()?;
    let reason = payload.reason;
    require_fields!(payload { action });

    let action = PartnerAction::parse(&action)
        .ok_or_else(|| ApiError::bad_request("Invalid action. Must be 'approve' or 'reject'"))?;
    let status = action.resulting_status();

    let updated = sqlx::query(
        "UPDATE partners SET status = $1, status_reason = $2, updated_at = NOW() WHERE id = $3",
    )
    .bind(status)
    .bind(&reason)
    .bind(partner_id)
    .execute(&state.db_pool)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(ApiError::not_found("Partner not found"));
    }

    let audit_action = match action {
        PartnerAction::Approve => AuditAction::Approve,
        PartnerAction::Reject => AuditAction::Reject,
    };
    audit::record(
        &state.db_pool,
        "partners",
        partner_id,
        audit_action,
        Some(json!({ "status": status, "reason": reason })),
        actor,
    )
    .await;

    tracing::info!(partner_id, status, "partner reviewed");

    Ok(Json(json!({
        "status": "success",
        "message": format!("Partner status updated to {status}"),
    })))
}

async fn create_order(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(partner_id): AppPath<i32>,
    AppJson(payload): AppJson<CreateOrderRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let user_id = claims.user_id()?;
    let pickup_location = payload.pickup_location;
    let dropoff_location = payload.dropoff_location;
    let delivery_location = payload.delivery_location;
    let reservation_details = payload.reservation_details;
    require_fields!(payload { order_type as "type", status, total_amount });

    if total_amount.is_sign_negative() {
        return Err(ApiError::bad_request("total_amount must not be negative"));
    }
    ensure_money("total_amount", total_amount)?;

    let partner_exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM partners WHERE id = $1)")
            .bind(partner_id)
            .fetch_one(&state.db_pool)
            .await?;
    if !partner_exists {
        return Err(ApiError::not_found("Partner not found"));
    }

    let order_id: i32 = sqlx::query_scalar(
        "INSERT INTO orders
            (user_id, partner_id, order_type, status, pickup_location,
             dropoff_location, delivery_location, reservation_details, total_amount)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         RETURNING id",
    )
    .bind(user_id)
    .bind(partner_id)
    .bind(&order_type)
    .bind(&status)
    .bind(pickup_location)
    .bind(dropoff_location)
    .bind(delivery_location)
    .bind(reservation_details)
    .bind(total_amount)
    .fetch_one(&state.db_pool)
    .await?;

    audit::record_activity(
        &state.db_pool,
        user_id,
        "order_created",
        json!({
            "order_id": order_id,
            "partner_id": partner_id,
            "type": order_type,
            "total_amount": total_amount,
        }),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": "Order created successfully",
            "order_id": order_id,
        })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{call, seed_user, state_for_pool};
    use sqlx::PgPool;

    async fn onboard(state: &Arc<AppState>, token: &str) -> i64 {
        let (status, body) = call(
            state,
            "POST",
            "/partners",
            Some(token),
            Some(json!({
                "partner_name": "QuickRide",
                "contact_person": "Jo",
                "email": "ops@quickride.example.com",
                "service_type": "transport",
                "api_endpoint": "https://quickride.example.com/api",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["status"], STATUS_PENDING);
        body["data"]["partner_id"].as_i64().unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_order_validation(pool: PgPool) {
        let state = state_for_pool(pool);
        let (_, token) = seed_user(&state, "rider@example.com").await;
        let partner_id = onboard(&state, &token).await;
        let uri = format!("/partners/{partner_id}/orders");

        let (status, body) = call(
            &state,
            "POST",
            &uri,
            Some(&token),
            Some(json!({"status": "pending", "total_amount": "12.50"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Missing required fields: type");

        let (status, body) = call(
            &state,
            "POST",
            &uri,
            Some(&token),
            Some(json!({"type": "ride", "status": "pending", "total_amount": "1000000000000"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "total_amount is out of range");

        let (status, body) = call(
            &state,
            "POST",
            &uri,
            Some(&token),
            Some(json!({
                "type": "ride",
                "status": "pending",
                "total_amount": "12.50",
                "pickup_location": "Westlands",
                "dropoff_location": "CBD",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["order_id"].is_i64());

        let (status, body) = call(
            &state,
            "POST",
            &format!("/partners/{}/orders", partner_id + 1000),
            Some(&token),
            Some(json!({"type": "ride", "status": "pending", "total_amount": "1.00"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Partner not found");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_partner_review(pool: PgPool) {
        let state = state_for_pool(pool);
        let (_, token) = seed_user(&state, "reviewer@example.com").await;
        let partner_id = onboard(&state, &token).await;
        let uri = format!("/partners/{partner_id}/approve");

        let (status, body) =
            call(&state, "PUT", &uri, Some(&token), Some(json!({"action": "suspend"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid action. Must be 'approve' or 'reject'");

        let (status, _) =
            call(&state, "PUT", &uri, Some(&token), Some(json!({"action": "approve"}))).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) =
            call(&state, "GET", &format!("/partners/{partner_id}"), Some(&token), None).await;
        assert_eq!(body["data"]["status"], "Approved");
    }
}

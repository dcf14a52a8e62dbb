use crate::error::{ApiError, ApiResult};
use crate::extract::{AppJson, AppQuery};
use crate::middleware::auth::auth_middleware;
use crate::models::audit::{AuditLog, AuditLogQuery, CreateAuditLogRequest};
use crate::models::auth::Claims;
use crate::require_fields;
use crate::services::audit::insert_audit_log;
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

pub fn audit_routes() -> Router {
    Router::new()
        .route("/audit-logs", get(list_audit_logs).post(create_audit_log))
        .route_layer(axum::middleware::from_fn(auth_middleware))
}

async fn list_audit_logs(
    Extension(state): Extension<Arc<AppState>>,
    AppQuery(query): AppQuery<AuditLogQuery>,
) -> ApiResult<Json<Value>> {
    let start = parse_date_param("start_date", query.start_date.as_deref())?;
    let end = parse_date_param("end_date", query.end_date.as_deref())?;
    let (limit, offset) = Pagination {
        limit: query.limit,
        offset: query.offset,
    }
    .resolve(DEFAULT_PAGE_SIZE);

    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT * FROM audit_logs WHERE TRUE");
    if let Some(table_name) = query.table_name {
        builder.push(" AND table_name = ").push_bind(table_name);
    }
    if let Some(action) = query.action {
        builder
            .push(" AND action = ")
            .push_bind(action.to_ascii_uppercase());
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

    let logs = builder
        .build_query_as::<AuditLog>()
        .fetch_all(&state.db_pool)
        .await?;

    Ok(Json(json!({ "status": "success", "data": logs })))
}

async fn create_audit_log(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppJson(payload): AppJson<CreateAuditLogRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let performed_by = claims.user_id()?;
    let changed_data = payload.changed_data;
    require_fields!(payload { table_name, record_id, action });

    if table_name.trim().is_empty() {
        return Err(ApiError::bad_request("table_name must not be empty"));
    }

    let log_id = insert_audit_log(
        &state.db_pool,
        &table_name,
        record_id,
        &action.to_ascii_uppercase(),
        changed_data.as_ref(),
        Some(performed_by),
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": "Audit log created successfully",
            "log_id": log_id,
        })),
    ))
}

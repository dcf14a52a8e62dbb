use serde_json::Value;
use sqlx::PgPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Approve,
    Reject,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Approve => "APPROVE",
            Self::Reject => "REJECT",
        }
    }
}

pub async fn insert_audit_log(
    pool: &PgPool,
    table_name: &str,
    record_id: i32,
    action: &str,
    changed_data: Option<&Value>,
    performed_by: Option<i32>,
) -> Result<i32, sqlx::Error> {
    sqlx::query_scalar(
        "INSERT INTO audit_logs (table_name, record_id, action, changed_data, performed_by)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id",
    )
    .bind(table_name)
    .bind(record_id)
    .bind(action)
    .bind(changed_data)
    .bind(performed_by)
    .fetch_one(pool)
    .await
}

pub async fn insert_activity(
    pool: &PgPool,
    user_id: i32,
    action_type: &str,
    details: &Value,
) -> Result<i32, sqlx::Error> {
    sqlx::query_scalar(
        "INSERT INTO activity_feed (user_id, action_type, details)
         VALUES ($1, $2, $3)
         RETURNING id",
    )
    .bind(user_id)
    .bind(action_type)
    .bind(details)
    .fetch_one(pool)
    .await
}

/// Records a change made by a handler. The change itself has already
/// happened, so a failure here is logged and not returned.
pub async fn record(
    pool: &PgPool,
    table_name: &str,
    record_id: i32,
    action: AuditAction,
    changed_data: Option<Value>,
    performed_by: i32,
) {
    if let Err(e) = insert_audit_log(
        pool,
        table_name,
        record_id,
        action.as_str(),
        changed_data.as_ref(),
        Some(performed_by),
    )
    .await
    {
        tracing::warn!(
            table = table_name,
            record_id,
            action = action.as_str(),
            error = %e,
            "failed to write audit log"
        );
    }
}

/// Appends to a user's activity feed; failures are logged only.
pub async fn record_activity(pool: &PgPool, user_id: i32, action_type: &str, details: Value) {
    if let Err(e) = insert_activity(pool, user_id, action_type, &details).await {
        tracing::warn!(user_id, action_type, error = %e, "failed to write activity entry");
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AuditLog {
    pub id: i32,
    pub table_name: String,
    pub record_id: i32,
    pub action: String,
    pub changed_data: Option<Value>,
    pub performed_by: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAuditLogRequest {
    pub table_name: Option<String>,
    pub record_id: Option<i32>,
    pub action: Option<String>,
    pub changed_data: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    pub table_name: Option<String>,
    pub action: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Activity {
    pub id: i32,
    pub user_id: i32,
    pub action_type: String,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateActivityRequest {
    pub action_type: Option<String>,
    pub details: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub action_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

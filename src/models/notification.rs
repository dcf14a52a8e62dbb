use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Notification {
    pub id: i32,
    pub user_id: i32,
    pub message: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub metadata: Value,
    pub read_status: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateNotificationRequest {
    pub message: Option<String>,
    #[serde(rename = "type")]
    pub notification_type: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateNotificationRequest {
    pub read_status: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub notification_ids: Option<Vec<i32>>,
}

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    pub read_status: Option<bool>,
    pub start_date: Option<String>,
}

// src/models/chat.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const MESSAGE_TYPE_USER: &str = "user";
pub const MESSAGE_TYPE_ASSISTANT: &str = "assistant";

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct ChatSession {
    pub id: i32,
    pub user_id: i32,
    pub context: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct ChatMessage {
    pub id: i32,
    pub session_id: i32,
    pub user_id: i32,
    pub message_type: String,
    pub content: String,
    pub is_summarized: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct ChatSummary {
    pub id: i32,
    pub session_id: i32,
    pub summary_content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StartChatRequest {
    pub context: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Feedback {
    pub id: i32,
    pub message_id: String,
    pub user_id: i32,
    pub feedback: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitFeedbackRequest {
    pub message_id: Option<String>,
    pub feedback: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackQuery {
    pub message_id: Option<String>,
}

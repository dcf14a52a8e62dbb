use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;

pub const DEFAULT_RECOMMENDATION_TYPE: &str = "lifestyle";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Recommendation {
    pub id: i32,
    pub user_id: i32,
    #[serde(rename = "type")]
    pub recommendation_type: String,
    pub context: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRecommendationRequest {
    pub context: Option<String>,
    #[serde(rename = "type")]
    pub recommendation_type: Option<String>,
    pub preferences: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    #[serde(rename = "type")]
    pub recommendation_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecommendationFeedbackRequest {
    pub feedback: Option<String>,
}

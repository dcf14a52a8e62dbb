use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

pub const STATUS_PENDING: &str = "Pending Approval";
pub const STATUS_APPROVED: &str = "Approved";
pub const STATUS_REJECTED: &str = "Rejected";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Partner {
    pub id: i32,
    pub partner_name: String,
    pub contact_person: String,
    pub email: String,
    pub phone: Option<String>,
    pub service_type: String,
    pub service_description: Option<String>,
    pub website_url: Option<String>,
    pub api_endpoint: String,
    pub services_offered: Value,
    pub user_id: Option<i32>,
    pub status: String,
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row shape for the partner listing.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PartnerSummary {
    pub id: i32,
    pub partner_name: String,
    pub service_type: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct OnboardPartnerRequest {
    pub partner_name: Option<String>,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub service_type: Option<String>,
    pub service_description: Option<String>,
    pub website_url: Option<String>,
    pub api_endpoint: Option<String>,
    pub services_offered: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdatePartnerRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partner_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_person: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services_offered: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartnerAction {
    Approve,
    Reject,
}

impl PartnerAction {
    pub fn parse(action: &str) -> Option<Self> {
        match action.trim().to_ascii_lowercase().as_str() {
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }

    pub fn resulting_status(&self) -> &'static str {
        match self {
            Self::Approve => STATUS_APPROVED,
            Self::Reject => STATUS_REJECTED,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PartnerActionRequest {
    pub action: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartnerQuery {
    pub status: Option<String>,
    pub user_id: Option<i32>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Order {
    pub id: i32,
    pub user_id: i32,
    pub partner_id: i32,
    #[serde(rename = "type")]
    pub order_type: String,
    pub status: String,
    pub pickup_location: Option<String>,
    pub dropoff_location: Option<String>,
    pub delivery_location: Option<String>,
    pub reservation_details: Option<Value>,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    #[serde(rename = "type")]
    pub order_type: Option<String>,
    pub status: Option<String>,
    pub total_amount: Option<Decimal>,
    pub pickup_location: Option<String>,
    pub dropoff_location: Option<String>,
    pub delivery_location: Option<String>,
    pub reservation_details: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partner_action_parsing() {
        assert_eq!(PartnerAction::parse("approve"), Some(PartnerAction::Approve));
        assert_eq!(PartnerAction::parse(" Reject "), Some(PartnerAction::Reject));
        assert_eq!(PartnerAction::parse("suspend"), None);
        assert_eq!(PartnerAction::Approve.resulting_status(), "Approved");
        assert_eq!(PartnerAction::Reject.resulting_status(), "Rejected");
    }
}

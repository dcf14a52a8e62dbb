use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FinancialProfile {
    pub user_id: i32,
    pub income: Decimal,
    pub expenses: Decimal,
    pub savings: Decimal,
    pub debts: Decimal,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertFinancialsRequest {
    pub income: Option<Decimal>,
    pub expenses: Option<Decimal>,
    pub savings: Option<Decimal>,
    pub debts: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct AffordabilityRequest {
    pub item: Option<String>,
    pub price: Option<Decimal>,
    pub loan_term: Option<i32>,
    pub down_payment: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AffordabilityAnalysis {
    pub id: i32,
    pub user_id: i32,
    pub item: String,
    pub price: Decimal,
    pub loan_term: i32,
    pub down_payment: Decimal,
    pub monthly_payment: Decimal,
    pub affordable: bool,
    pub savings_per_month: Decimal,
    pub savings_duration_months: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Transaction {
    pub id: i32,
    pub user_id: i32,
    pub amount: Decimal,
    pub category: String,
    pub description: Option<String>,
    pub transaction_date: DateTime<Utc>,
    pub linked_expense_id: Option<i32>,
    pub linked_order_id: Option<i32>,
    pub linked_debt_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    pub amount: Option<Decimal>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub transaction_date: Option<String>,
    pub linked_expense_id: Option<i32>,
    pub linked_order_id: Option<i32>,
    pub linked_debt_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub category: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RecurringExpense {
    pub id: i32,
    pub user_id: i32,
    pub amount: Decimal,
    pub category: String,
    pub frequency: String,
    pub description: Option<String>,
    pub last_paid: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRecurringExpenseRequest {
    pub amount: Option<Decimal>,
    pub category: Option<String>,
    pub frequency: Option<String>,
    pub description: Option<String>,
    pub last_paid: Option<String>,
}

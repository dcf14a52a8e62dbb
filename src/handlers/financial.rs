use crate::error::{ApiError, ApiResult};
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::middleware::auth::{auth_middleware, ensure_owner};
use crate::models::auth::Claims;
use crate::models::financial::{
    AffordabilityRequest, CreateRecurringExpenseRequest, CreateTransactionRequest,
    FinancialProfile, RecurringExpense, Transaction, TransactionQuery, UpsertFinancialsRequest,
};
use crate::require_fields;
use crate::services::affordability::{self, Budget, Purchase};
use crate::services::audit;
use crate::utils::{ensure_money, parse_date_param, Pagination};
use crate::AppState;
use axum::{
    extract::Extension,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::sync::Arc;

const TRANSACTION_PAGE_SIZE: i64 = 10;

pub fn financial_routes() -> Router {
    Router::new()
        .route(
            "/users/:user_id/financials",
            get(get_financials).put(upsert_financials),
        )
        .route(
            "/users/:user_id/financials/affordability",
            post(analyze_affordability),
        )
        .route(
            "/users/:user_id/transactions",
            get(list_transactions).post(create_transaction),
        )
        .route(
            "/users/:user_id/recurring-expenses",
            get(list_recurring_expenses).post(create_recurring_expense),
        )
        .route_layer(axum::middleware::from_fn(auth_middleware))
}

pub(crate) async fn fetch_profile(
    pool: &PgPool,
    user_id: i32,
) -> Result<Option<FinancialProfile>, sqlx::Error> {
    sqlx::query_as::<_, FinancialProfile>("SELECT * FROM financial_profiles WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

async fn get_financials(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(user_id): AppPath<i32>,
) -> ApiResult<Json<Value>> {
    ensure_owner(&claims, user_id)?;

    let profile = fetch_profile(&state.db_pool, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Financial data not found"))?;

    let recurring = sqlx::query_as::<_, RecurringExpense>(
        "SELECT * FROM recurring_expenses WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(json!({
        "status": "success",
        "data": {
            "income": profile.income,
            "expenses": profile.expenses,
            "savings": profile.savings,
            "debts": profile.debts,
            "updated_at": profile.updated_at,
            "recurring_expenses": recurring,
        },
    })))
}

async fn upsert_financials(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(user_id): AppPath<i32>,
    AppJson(payload): AppJson<UpsertFinancialsRequest>,
) -> ApiResult<Json<Value>> {
    ensure_owner(&claims, user_id)?;
    require_fields!(payload { income, expenses, savings, debts });

    if [income, expenses, savings, debts]
        .iter()
        .any(Decimal::is_sign_negative)
    {
        return Err(ApiError::bad_request("Financial values must not be negative"));
    }
    for (name, value) in [
        ("income", income),
        ("expenses", expenses),
        ("savings", savings),
        ("debts", debts),
    ] {
        ensure_money(name, value)?;
    }

    let profile = sqlx::query_as::<_, FinancialProfile>(
        "INSERT INTO financial_profiles (user_id, income, expenses, savings, debts)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (user_id) DO UPDATE SET
            income = EXCLUDED.income,
            expenses = EXCLUDED.expenses,
            savings = EXCLUDED.savings,
            debts = EXCLUDED.debts,
            updated_at = NOW()
         RETURNING *",
    )
    .bind(user_id)
    .bind(income)
    .bind(expenses)
    .bind(savings)
    .bind(debts)
    .fetch_one(&state.db_pool)
    .await?;

    Ok(Json(json!({
        "status": "success",
        "message": "Financial data updated successfully",
        "data": profile,
    })))
}

async fn analyze_affordability(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(user_id): AppPath<i32>,
    AppJson(payload): AppJson<AffordabilityRequest>,
) -> ApiResult<Json<Value>> {
    ensure_owner(&claims, user_id)?;
    require_fields!(payload { item, price, loan_term, down_payment });

    let purchase = Purchase {
        price,
        loan_term,
        down_payment,
    };
    purchase.validate().map_err(ApiError::bad_request)?;

    let profile = fetch_profile(&state.db_pool, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Financial data not found"))?;

    let assessment = affordability::assess(
        &purchase,
        &Budget {
            income: profile.income,
            expenses: profile.expenses,
            savings: profile.savings,
        },
    );

    let analysis_id: i32 = sqlx::query_scalar(
        "INSERT INTO affordability_analyses
            (user_id, item, price, loan_term, down_payment, monthly_payment,
             affordable, savings_per_month, savings_duration_months)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         RETURNING id",
    )
    .bind(user_id)
    .bind(&item)
    .bind(price)
    .bind(loan_term)
    .bind(down_payment)
    .bind(assessment.monthly_payment)
    .bind(assessment.affordable)
    .bind(assessment.savings_goal.amount_per_month)
    .bind(assessment.savings_goal.duration)
    .fetch_one(&state.db_pool)
    .await?;

    audit::record_activity(
        &state.db_pool,
        user_id,
        "affordability_analysis",
        json!({
            "analysis_id": analysis_id,
            "item": item,
            "price": price,
            "affordable": assessment.affordable,
        }),
    )
    .await;

    tracing::info!(
        user_id,
        analysis_id,
        affordable = assessment.affordable,
        "affordability analysis stored"
    );

    Ok(Json(json!({
        "status": "success",
        "data": assessment,
        "analysis_id": analysis_id,
    })))
}

async fn create_transaction(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(user_id): AppPath<i32>,
    AppJson(payload): AppJson<CreateTransactionRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    ensure_owner(&claims, user_id)?;

    let transaction_date = parse_date_param("transaction_date", payload.transaction_date.as_deref())?
        .unwrap_or_else(Utc::now);
    let description = payload.description;
    let linked_expense_id = payload.linked_expense_id;
    let linked_order_id = payload.linked_order_id;
    let linked_debt_id = payload.linked_debt_id;
    require_fields!(payload { amount, category });
    ensure_money("amount", amount)?;

    let transaction_id: i32 = sqlx::query_scalar(
        "INSERT INTO transactions
            (user_id, amount, category, description, transaction_date,
             linked_expense_id, linked_order_id, linked_debt_id)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING id",
    )
    .bind(user_id)
    .bind(amount)
    .bind(&category)
    .bind(description)
    .bind(transaction_date)
    .bind(linked_expense_id)
    .bind(linked_order_id)
    .bind(linked_debt_id)
    .fetch_one(&state.db_pool)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": "Transaction added successfully",
            "transaction_id": transaction_id,
        })),
    ))
}

async fn list_transactions(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(user_id): AppPath<i32>,
    AppQuery(query): AppQuery<TransactionQuery>,
) -> ApiResult<Json<Value>> {
    ensure_owner(&claims, user_id)?;

    let start = parse_date_param("start_date", query.start_date.as_deref())?;
    let end = parse_date_param("end_date", query.end_date.as_deref())?;
    let (limit, offset) = Pagination {
        limit: query.limit,
        offset: query.offset,
    }
    .resolve(TRANSACTION_PAGE_SIZE);

    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT * FROM transactions WHERE user_id = ");
    builder.push_bind(user_id);

    if let (Some(start), Some(end)) = (start, end) {
        builder
            .push(" AND transaction_date BETWEEN ")
            .push_bind(start)
            .push(" AND ")
            .push_bind(end);
    }
    if let Some(category) = query.category {
        builder.push(" AND category = ").push_bind(category);
    }

    builder
        .push(" ORDER BY transaction_date DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let transactions = builder
        .build_query_as::<Transaction>()
        .fetch_all(&state.db_pool)
        .await?;

    Ok(Json(json!({ "status": "success", "data": transactions })))
}

async fn create_recurring_expense(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(user_id): AppPath<i32>,
    AppJson(payload): AppJson<CreateRecurringExpenseRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    ensure_owner(&claims, user_id)?;

    let last_paid = parse_date_param("last_paid", payload.last_paid.as_deref())?;
    let description = payload.description;
    require_fields!(payload { amount, category, frequency });

    if amount.is_sign_negative() {
        return Err(ApiError::bad_request("amount must not be negative"));
    }
    ensure_money("amount", amount)?;

    let expense_id: i32 = sqlx::query_scalar(
        "INSERT INTO recurring_expenses
            (user_id, amount, category, frequency, description, last_paid)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING id",
    )
    .bind(user_id)
    .bind(amount)
    .bind(&category)
    .bind(&frequency)
    .bind(description)
    .bind(last_paid)
    .fetch_one(&state.db_pool)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": "Recurring expense added successfully",
            "expense_id": expense_id,
        })),
    ))
}

async fn list_recurring_expenses(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(user_id): AppPath<i32>,
) -> ApiResult<Json<Value>> {
    ensure_owner(&claims, user_id)?;

    let expenses = sqlx::query_as::<_, RecurringExpense>(
        "SELECT * FROM recurring_expenses WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(json!({ "status": "success", "data": expenses })))
}

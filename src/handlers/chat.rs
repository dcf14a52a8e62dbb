use crate::error::{ApiError, ApiResult};
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::handlers::financial::fetch_profile;
use crate::middleware::auth::auth_middleware;
use crate::models::auth::Claims;
use crate::models::chat::{
    ChatMessage, ChatSession, Feedback, FeedbackQuery, SendMessageRequest, StartChatRequest,
    SubmitFeedbackRequest, MESSAGE_TYPE_ASSISTANT, MESSAGE_TYPE_USER,
};
use crate::models::financial::{AffordabilityAnalysis, FinancialProfile};
use crate::require_fields;
use crate::AppState;
use axum::{
    extract::Extension,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use sqlx::PgPool;
use std::sync::Arc;

pub fn chat_routes() -> Router {
    Router::new()
        .route("/chat/start", post(start_chat))
        .route("/chat/:session_id/message", post(send_message))
        .route("/chat/:session_id/history", get(chat_history))
        .route("/chat/:session_id/summarize", post(summarize_chat))
        .route("/chat/:session_id/end", post(end_chat))
        .route("/feedback", get(list_feedback).post(submit_feedback))
        .route("/feedback/submit", post(submit_feedback))
        .route("/feedback/:message_id", get(feedback_for_message))
        .route_layer(axum::middleware::from_fn(auth_middleware))
}

async fn owned_session(pool: &PgPool, session_id: i32, user_id: i32) -> ApiResult<ChatSession> {
    sqlx::query_as::<_, ChatSession>("SELECT * FROM chat_sessions WHERE id = $1 AND user_id = $2")
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Chat session not found"))
}

async fn store_message(
    pool: &PgPool,
    session_id: i32,
    user_id: i32,
    message_type: &str,
    content: &str,
) -> Result<i32, sqlx::Error> {
    sqlx::query_scalar(
        "INSERT INTO chat_messages (session_id, user_id, message_type, content)
         VALUES ($1, $2, $3, $4)
         RETURNING id",
    )
    .bind(session_id)
    .bind(user_id)
    .bind(message_type)
    .bind(content)
    .fetch_one(pool)
    .await
}

fn mentions_affordability(message: &str) -> bool {
    message.to_lowercase().contains("affordability")
}

/// System prompt describing the user's finances, if anything is known.
fn financial_context(
    session_context: Option<&str>,
    profile: Option<&FinancialProfile>,
    analysis: Option<&AffordabilityAnalysis>,
) -> Option<String> {
    let mut parts = Vec::new();

    if let Some(context) = session_context.filter(|c| !c.trim().is_empty()) {
        parts.push(context.trim().to_string());
    }
    if let Some(p) = profile {
        parts.push(format!(
            "User financial profile: monthly income {}, monthly expenses {}, savings {}, debts {}.",
            p.income, p.expenses, p.savings, p.debts
        ));
    }
    if let Some(a) = analysis {
        let verdict = if a.affordable { "affordable" } else { "not affordable" };
        parts.push(format!(
            "Latest affordability analysis: {} priced at {} with {} down over {} months, \
             monthly payment {} ({}).",
            a.item, a.price, a.down_payment, a.loan_term, a.monthly_payment, verdict
        ));
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

async fn start_chat(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    payload: Option<AppJson<StartChatRequest>>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let user_id = claims.user_id()?;
    let payload = payload.map(|AppJson(p)| p).unwrap_or_default();

    let session_id: i32 = sqlx::query_scalar(
        "INSERT INTO chat_sessions (user_id, context) VALUES ($1, $2) RETURNING id",
    )
    .bind(user_id)
    .bind(payload.context)
    .fetch_one(&state.db_pool)
    .await?;

    tracing::info!(user_id, session_id, "chat session started");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Chat session started",
            "session_id": session_id,
        })),
    ))
}

async fn send_message(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(session_id): AppPath<i32>,
    AppJson(payload): AppJson<SendMessageRequest>,
) -> ApiResult<Json<Value>> {
    let user_id = claims.user_id()?;
    require_fields!(payload { message });

    let session = owned_session(&state.db_pool, session_id, user_id).await?;
    if session.end_time.is_some() {
        return Err(ApiError::bad_request("Chat session has ended"));
    }

    store_message(&state.db_pool, session_id, user_id, MESSAGE_TYPE_USER, &message).await?;

    let profile = fetch_profile(&state.db_pool, user_id).await?;
    let analysis = if mentions_affordability(&message) {
        sqlx::query_as::<_, AffordabilityAnalysis>(
            "SELECT * FROM affordability_analyses
             WHERE user_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&state.db_pool)
        .await?
    } else {
        None
    };

    let context = financial_context(
        session.context.as_deref(),
        profile.as_ref(),
        analysis.as_ref(),
    );
    let reply = state
        .assistant
        .generate_response(&message, context.as_deref())
        .await;

    store_message(&state.db_pool, session_id, user_id, MESSAGE_TYPE_ASSISTANT, &reply).await?;

    Ok(Json(json!({
        "user_message": message,
        "assistant_response": reply,
    })))
}

async fn chat_history(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(session_id): AppPath<i32>,
) -> ApiResult<Json<Value>> {
    let user_id = claims.user_id()?;
    owned_session(&state.db_pool, session_id, user_id).await?;

    let messages = sqlx::query_as::<_, ChatMessage>(
        "SELECT * FROM chat_messages WHERE session_id = $1 ORDER BY created_at, id",
    )
    .bind(session_id)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(json!({ "session_id": session_id, "messages": messages })))
}

async fn summarize_chat(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(session_id): AppPath<i32>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let user_id = claims.user_id()?;
    owned_session(&state.db_pool, session_id, user_id).await?;

    let history: Vec<String> = sqlx::query_scalar(
        "SELECT content FROM chat_messages
         WHERE session_id = $1 AND message_type = $2
         ORDER BY created_at, id",
    )
    .bind(session_id)
    .bind(MESSAGE_TYPE_USER)
    .fetch_all(&state.db_pool)
    .await?;

    if history.is_empty() {
        return Err(ApiError::not_found("No messages found for this session"));
    }

    let summary = state.assistant.summarize_chat(&history).await;

    let mut tx = state.db_pool.begin().await?;
    sqlx::query("INSERT INTO chat_summaries (session_id, summary_content) VALUES ($1, $2)")
        .bind(session_id)
        .bind(&summary)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE chat_messages SET is_summarized = TRUE WHERE session_id = $1")
        .bind(session_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(json!({ "summary": summary }))))
}

async fn end_chat(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(session_id): AppPath<i32>,
) -> ApiResult<Json<Value>> {
    let user_id = claims.user_id()?;

    let updated = sqlx::query(
        "UPDATE chat_sessions SET end_time = COALESCE(end_time, NOW())
         WHERE id = $1 AND user_id = $2",
    )
    .bind(session_id)
    .bind(user_id)
    .execute(&state.db_pool)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(ApiError::not_found("Chat session not found"));
    }

    tracing::info!(user_id, session_id, "chat session ended");

    Ok(Json(json!({ "message": "Chat session ended" })))
}

async fn submit_feedback(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppJson(payload): AppJson<SubmitFeedbackRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let user_id = claims.user_id()?;
    require_fields!(payload { message_id, feedback });

    let feedback_id: i32 = sqlx::query_scalar(
        "INSERT INTO feedback (message_id, user_id, feedback) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(&message_id)
    .bind(user_id)
    .bind(&feedback)
    .fetch_one(&state.db_pool)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": "Feedback submitted successfully",
            "feedback_id": feedback_id,
        })),
    ))
}

async fn fetch_feedback(
    pool: &PgPool,
    user_id: i32,
    message_id: Option<&str>,
) -> Result<Vec<Feedback>, sqlx::Error> {
    sqlx::query_as::<_, Feedback>(
        "SELECT * FROM feedback
         WHERE user_id = $1 AND ($2::TEXT IS NULL OR message_id = $2)
         ORDER BY created_at DESC",
    )
    .bind(user_id)
    .bind(message_id)
    .fetch_all(pool)
    .await
}

async fn list_feedback(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppQuery(query): AppQuery<FeedbackQuery>,
) -> ApiResult<Json<Value>> {
    let user_id = claims.user_id()?;
    let feedback = fetch_feedback(&state.db_pool, user_id, query.message_id.as_deref()).await?;
    Ok(Json(json!({ "status": "success", "data": feedback })))
}

async fn feedback_for_message(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppPath(message_id): AppPath<String>,
) -> ApiResult<Json<Value>> {
    let user_id = claims.user_id()?;
    let feedback = fetch_feedback(&state.db_pool, user_id, Some(&message_id)).await?;
    Ok(Json(json!({ "status": "success", "data": feedback })))
}

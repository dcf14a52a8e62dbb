use crate::config::OAuthConfig;
use crate::error::{ApiError, ApiResult};
use crate::extract::{AppForm, AppJson, AppQuery};
use crate::middleware::auth::{auth_middleware, BearerToken};
use crate::models::auth::*;
use crate::models::user::User;
use crate::require_fields;
use crate::services::auth::{hash_password, revoke, verify_password};
use crate::utils::is_valid_email;
use crate::AppState;
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{Json, Redirect},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

const MIN_PASSWORD_LEN: usize = 8;

pub fn auth_routes() -> Router {
    let protected = Router::new()
        .route("/auth/logout", post(logout))
        .route("/auth/validate", get(validate))
        .route("/user/me", get(me))
        .route_layer(axum::middleware::from_fn(auth_middleware));

    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/user/token", post(token))
        .route("/auth/oauth/login", get(oauth_login))
        .route("/auth/oauth/callback", get(oauth_callback))
        .merge(protected)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

async fn register(
    Extension(state): Extension<Arc<AppState>>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require_fields!(payload { email, password, first_name, last_name });

    let email = normalize_email(&email);
    if !is_valid_email(&email) {
        return Err(ApiError::bad_request("Invalid email address"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }

    let password_hash = hash_password(password).await?;

    let user_id: Option<i32> = sqlx::query_scalar(
        "INSERT INTO users (email, password_hash, first_name, last_name)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (email) DO NOTHING
         RETURNING id",
    )
    .bind(&email)
    .bind(&password_hash)
    .bind(first_name.trim())
    .bind(last_name.trim())
    .fetch_optional(&state.db_pool)
    .await?;

    let Some(user_id) = user_id else {
        return Err(ApiError::bad_request("Email already registered"));
    };

    tracing::info!(user_id, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": "User registered successfully",
            "user_id": user_id,
        })),
    ))
}

/// Checks credentials and account status, returning the user on success.
async fn authenticate(state: &AppState, email: &str, password: String) -> ApiResult<User> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(normalize_email(email))
        .fetch_optional(&state.db_pool)
        .await?;

    let invalid = || ApiError::Unauthorized("Invalid credentials".to_string());

    let user = user.ok_or_else(invalid)?;
    let password_hash = user.password_hash.clone().ok_or_else(invalid)?;

    if !verify_password(password, password_hash).await? {
        tracing::warn!(user_id = user.id, "failed login attempt");
        return Err(invalid());
    }

    if !user.is_active() {
        return Err(ApiError::Forbidden("Account is not active".to_string()));
    }

    Ok(user)
}

fn token_response(state: &AppState, user: &User) -> ApiResult<TokenResponse> {
    let issued = state.jwt.issue(user.id, &user.email)?;
    Ok(TokenResponse {
        status: "success",
        access_token: issued.access_token,
        token_type: "bearer",
        expires_in: issued.expires_in,
    })
}

async fn login(
    Extension(state): Extension<Arc<AppState>>,
    AppJson(payload): AppJson<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    require_fields!(payload { email, password });

    let user = authenticate(&state, &email, password).await?;
    tracing::info!(user_id = user.id, "user logged in");

    Ok(Json(token_response(&state, &user)?))
}

/// OAuth2 password grant used by API clients that speak the form flow.
async fn token(
    Extension(state): Extension<Arc<AppState>>,
    AppForm(form): AppForm<TokenForm>,
) -> ApiResult<Json<Value>> {
    require_fields!(form { username, password });

    let user = authenticate(&state, &username, password).await?;
    let issued = token_response(&state, &user)?;

    Ok(Json(json!({
        "access_token": issued.access_token,
        "token_type": issued.token_type,
    })))
}

async fn logout(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Extension(BearerToken(token)): Extension<BearerToken>,
) -> ApiResult<Json<Value>> {
    revoke(&state.db_pool, &claims, &token).await?;
    tracing::info!(user_id = %claims.sub, "token revoked on logout");

    Ok(Json(json!({
        "status": "success",
        "message": "Successfully logged out",
    })))
}

async fn validate(Extension(claims): Extension<Claims>) -> ApiResult<Json<Value>> {
    Ok(Json(json!({
        "status": "success",
        "message": "Token is valid",
        "user_id": claims.user_id()?,
    })))
}

async fn me(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Value>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(claims.user_id()?)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(json!({ "status": "success", "data": user })))
}

fn authorize_url(oauth: &OAuthConfig, state_param: &str) -> String {
    format!(
        "{}/authorize?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
        oauth.provider_url,
        urlencoding::encode(&oauth.client_id),
        urlencoding::encode(&oauth.redirect_uri),
        urlencoding::encode("openid profile email"),
        urlencoding::encode(state_param),
    )
}

fn oauth_config(state: &AppState) -> ApiResult<&OAuthConfig> {
    state
        .config
        .oauth
        .as_ref()
        .ok_or_else(|| ApiError::ServiceUnavailable("OAuth login is not configured".to_string()))
}

async fn oauth_login(Extension(state): Extension<Arc<AppState>>) -> ApiResult<Redirect> {
    let oauth = oauth_config(&state)?;
    let state_param = state.jwt.issue_oauth_state()?;
    tracing::info!("initiating OAuth login");
    Ok(Redirect::to(&authorize_url(oauth, &state_param)))
}

async fn oauth_callback(
    Extension(state): Extension<Arc<AppState>>,
    AppQuery(params): AppQuery<OAuthCallbackQuery>,
) -> ApiResult<Json<TokenResponse>> {
    let oauth = oauth_config(&state)?;

    if let Some(error) = params.error {
        tracing::warn!(error = %error, "OAuth provider returned an error");
        return Err(ApiError::bad_request(format!("OAuth login failed: {error}")));
    }

    let state_param = params
        .state
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("Missing OAuth state"))?;
    if let Err(e) = state.jwt.verify_oauth_state(state_param) {
        tracing::warn!("rejected OAuth callback: {}", e);
        return Err(ApiError::bad_request("Invalid or expired OAuth state"));
    }

    let code = params
        .code
        .ok_or_else(|| ApiError::bad_request("Missing authorization code"))?;

    let provider_tokens = state
        .http_client
        .post(format!("{}/token", oauth.provider_url))
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", oauth.redirect_uri.as_str()),
            ("client_id", oauth.client_id.as_str()),
            ("client_secret", oauth.client_secret.as_str()),
        ])
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| {
            tracing::error!("Failed to exchange code: {}", e);
            ApiError::bad_request("Failed to exchange authorization code")
        })?
        .json::<OAuthTokenResponse>()
        .await
        .map_err(|e| {
            tracing::error!("Invalid token response from OAuth provider: {}", e);
            ApiError::bad_request("Failed to exchange authorization code")
        })?;

    let user_info = state
        .http_client
        .get(format!("{}/userinfo", oauth.provider_url))
        .bearer_auth(&provider_tokens.access_token)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| {
            tracing::error!("Failed to get user info: {}", e);
            ApiError::bad_request("Failed to fetch user profile")
        })?
        .json::<OAuthUserInfo>()
        .await
        .map_err(|e| {
            tracing::error!("Invalid user info response: {}", e);
            ApiError::bad_request("Failed to fetch user profile")
        })?;

    let email = user_info
        .email
        .as_deref()
        .map(normalize_email)
        .filter(|e| is_valid_email(e))
        .ok_or_else(|| ApiError::bad_request("OAuth profile has no email address"))?;

    let (first_name, last_name) = split_profile_name(&user_info);

    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (email, first_name, last_name)
         VALUES ($1, $2, $3)
         ON CONFLICT (email) DO UPDATE SET updated_at = NOW()
         RETURNING *",
    )
    .bind(&email)
    .bind(first_name)
    .bind(last_name)
    .fetch_one(&state.db_pool)
    .await?;

    if !user.is_active() {
        return Err(ApiError::Forbidden("Account is not active".to_string()));
    }

    tracing::info!(user_id = user.id, "user logged in via OAuth");
    Ok(Json(token_response(&state, &user)?))
}

fn split_profile_name(info: &OAuthUserInfo) -> (String, String) {
    if let (Some(first), Some(last)) = (&info.given_name, &info.family_name) {
        return (first.clone(), last.clone());
    }
    match info.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => match name.split_once(' ') {
            Some((first, last)) => (first.to_string(), last.trim().to_string()),
            None => (name.to_string(), String::new()),
        },
        _ => (String::new(), String::new()),
    }
}

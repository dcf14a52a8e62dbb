use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use finwell::config::Config;
use finwell::llm_client::{ChatModel, OpenAiClient};
use finwell::services::assistant::Assistant;
use finwell::services::auth::JwtKeys;
use finwell::services::rate_limit::{
    MemoryStore, RateLimitPolicy, RateLimitStore, RateLimiter, RedisStore,
};
use finwell::{build_router, db, middleware, AppState};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_logging()?;

    let config = Config::from_env()?;
    tracing::info!(
        "Configuration - Environment: {}, Redis: {}, OpenAI: {}, OAuth: {}",
        config.environment.as_str(),
        if config.redis_url.is_some() { "✅" } else { "❌" },
        if config.openai_api_key.is_some() { "✅" } else { "❌" },
        if config.oauth.is_some() { "✅" } else { "❌" },
    );

    // Create the database connection pool (runs pending migrations)
    let db_pool = db::create_pool(&config).await?;

    let jwt = JwtKeys::new(&config.jwt_secret, config.jwt_expiry);

    let store: Arc<dyn RateLimitStore> = match config.redis_url.as_deref() {
        Some(url) => match RedisStore::connect(url).await {
            Ok(store) => {
                tracing::info!("Rate limiting backed by Redis");
                Arc::new(store)
            }
            Err(e) => {
                tracing::warn!(
                    "Redis unavailable ({}), falling back to in-memory rate limiting",
                    e
                );
                Arc::new(MemoryStore::new())
            }
        },
        None => {
            tracing::info!("REDIS_URL not set, using in-memory rate limiting");
            Arc::new(MemoryStore::new())
        }
    };
    let rate_limiter = RateLimiter::new(RateLimitPolicy::from_config(&config.rate_limits), store);

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    // Initialize the language model client if an API key is provided
    let assistant = match config.openai_api_key.clone() {
        Some(api_key) => {
            tracing::info!("Initializing OpenAI client ({})...", config.openai_model);
            let client: Arc<dyn ChatModel> = Arc::new(OpenAiClient::new(
                http_client.clone(),
                api_key,
                config.openai_base_url.clone(),
                config.openai_model.clone(),
            ));
            Assistant::new(Some(client))
        }
        None => {
            tracing::warn!("OPENAI_API_KEY not found. Assistant replies will use fallback text.");
            Assistant::default()
        }
    };

    let bind_addr = config.bind_addr;
    let state = Arc::new(AppState {
        config,
        db_pool,
        jwt,
        rate_limiter,
        assistant,
        http_client,
    });

    middleware::rate_limit::spawn_cleanup_task(state.clone(), CLEANUP_INTERVAL);

    let app = build_router(state);

    // Run the server with ConnectInfo to provide socket addresses for rate limiting
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,finwell=trace,sqlx=info,reqwest=info,hyper=info,tower=info".to_string()
        } else {
            "info,finwell=info,sqlx=warn,reqwest=warn,hyper=warn,tower=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    // JSON output for log aggregation, human-readable otherwise
    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    tracing::info!("💰 Finwell starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Build mode: {}",
        if cfg!(debug_assertions) { "development" } else { "production" }
    );
    tracing::info!("Log level: {}", log_level);

    Ok(())
}

use sqlx::postgres::PgPool;
use std::env;

/// Tables created by the initial migration.
const EXPECTED_TABLES: &[&str] = &[
    "users",
    "token_blacklist",
    "financial_profiles",
    "recurring_expenses",
    "transactions",
    "affordability_analyses",
    "notifications",
    "partners",
    "orders",
    "recommendations",
    "chat_sessions",
    "chat_messages",
    "chat_summaries",
    "feedback",
    "audit_logs",
    "activity_feed",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let database_url = env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?;

    println!("Connecting to database...");
    let pool = PgPool::connect(&database_url).await?;

    let tables: Vec<String> =
        sqlx::query_scalar("SELECT tablename::TEXT FROM pg_tables WHERE schemaname = 'public'")
            .fetch_all(&pool)
            .await?;

    let mut missing = 0;
    for table in EXPECTED_TABLES {
        if tables.iter().any(|t| t == table) {
            println!("✅ {}", table);
        } else {
            println!("❌ {} NOT FOUND", table);
            missing += 1;
        }
    }

    println!("\nApplied migrations:");
    let migrations = sqlx::query_as::<_, (i64, String, bool)>(
        "SELECT version, description, success FROM _sqlx_migrations ORDER BY version DESC",
    )
    .fetch_all(&pool)
    .await;

    match migrations {
        Ok(migrations) => {
            for (version, description, success) in migrations {
                println!("  - {} {} (success: {})", version, description, success);
            }
        }
        Err(e) => println!("❌ Error querying _sqlx_migrations: {}", e),
    }

    pool.close().await;

    if missing > 0 {
        return Err(format!("{missing} expected table(s) missing; start the server once to migrate").into());
    }
    Ok(())
}

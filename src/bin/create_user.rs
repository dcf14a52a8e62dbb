use std::io::{self, Write};

use bcrypt::{hash, DEFAULT_COST};
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;

fn prompt(label: &str) -> io::Result<String> {
    print!("{label}: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("👤 Finwell - Create User");
    println!("========================");

    dotenv().ok();

    let database_url = std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?;

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await?;

    let email = prompt("Email address")?.to_lowercase();
    if !finwell::utils::is_valid_email(&email) {
        eprintln!("❌ Invalid email address");
        return Ok(());
    }

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
        .bind(&email)
        .fetch_one(&pool)
        .await?;
    if exists {
        eprintln!("❌ A user with this email already exists");
        return Ok(());
    }

    let first_name = prompt("First name")?;
    let last_name = prompt("Last name")?;
    if first_name.is_empty() || last_name.is_empty() {
        eprintln!("❌ First and last name are required");
        return Ok(());
    }

    print!("Password: ");
    io::stdout().flush()?;
    let password = rpassword::read_password()?;

    if password.len() < 8 {
        eprintln!("❌ Password must be at least 8 characters long");
        return Ok(());
    }

    print!("Password (again): ");
    io::stdout().flush()?;
    if password != rpassword::read_password()? {
        eprintln!("❌ Passwords don't match");
        return Ok(());
    }

    let password_hash = hash(&password, DEFAULT_COST)?;

    let user_id: i32 = sqlx::query_scalar(
        "INSERT INTO users (email, password_hash, first_name, last_name)
         VALUES ($1, $2, $3, $4)
         RETURNING id",
    )
    .bind(&email)
    .bind(&password_hash)
    .bind(&first_name)
    .bind(&last_name)
    .fetch_one(&pool)
    .await?;

    println!();
    println!("✅ User created successfully!");
    println!("   ID: {}", user_id);
    println!("   Email: {}", email);
    println!("🔐 Log in with POST /auth/login using these credentials");

    pool.close().await;
    Ok(())
}

//! Generates a JWT signing secret and stores it as `JWT_SECRET` in a dotenv
//! file (`.env` unless a path is given). `--print` only prints the secret.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use finwell::config::upsert_env_entry;
use finwell::services::auth::generate_jwt_secret;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔐 Finwell JWT Secret Generator");
    println!("===============================");

    let mut print_only = false;
    let mut path = PathBuf::from(".env");
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--print" => print_only = true,
            flag if flag.starts_with("--") => {
                return Err(format!(
                    "unknown option '{flag}' (usage: generate_jwt_secret [--print] [ENV_FILE])"
                )
                .into());
            }
            file => path = PathBuf::from(file),
        }
    }

    let secret = generate_jwt_secret();

    if print_only {
        println!();
        println!("JWT_SECRET={}", secret);
        return Ok(());
    }

    let existing = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
        Err(e) => return Err(format!("failed to read {}: {}", path.display(), e).into()),
    };
    let (contents, had_secret) = upsert_env_entry(&existing, "JWT_SECRET", &secret);
    fs::write(&path, contents)?;

    println!();
    if had_secret {
        println!("✅ Replaced JWT_SECRET in {}", path.display());
        println!("⚠️  Tokens issued with the previous secret no longer validate; users must log in again.");
    } else {
        println!("✅ Added JWT_SECRET to {}", path.display());
    }

    Ok(())
}

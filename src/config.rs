use std::{env, fmt::Display, net::SocketAddr, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::info;

const DEV_JWT_SECRET: &str = "dev-only-insecure-jwt-secret";
const MAX_JWT_EXPIRY_MINUTES: u64 = 60 * 24 * 365;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid {key} value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Testing,
    Production,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "testing" | "test" => Ok(Self::Testing),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Testing => "testing",
            Self::Production => "production",
        }
    }
}

/// A request budget: at most `max_requests` per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimit {
    pub const fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(60),
        }
    }
}

impl FromStr for RateLimit {
    type Err = String;

    /// Accepts `N/second`, `N/minute`, `N/hour`, `N/day` or a bare `N` (per minute).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (count, period) = match s.trim().split_once('/') {
            Some((count, period)) => (count.trim(), period.trim()),
            None => (s.trim(), "minute"),
        };

        let max_requests: u32 = count
            .parse()
            .map_err(|_| format!("'{count}' is not a request count"))?;
        if max_requests == 0 {
            return Err("request count must be greater than zero".to_string());
        }

        let secs = match period.to_ascii_lowercase().as_str() {
            "s" | "sec" | "second" => 1,
            "m" | "min" | "minute" => 60,
            "h" | "hour" => 3600,
            "d" | "day" => 86_400,
            other => return Err(format!("unknown period '{other}'")),
        };

        Ok(Self {
            max_requests,
            window: Duration::from_secs(secs),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct OAuthConfig {
    pub provider_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub default: RateLimit,
    pub chat: RateLimit,
    pub recommendations: RateLimit,
    pub auth: RateLimit,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: String,
    pub environment: Environment,
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub jwt_expiry: Duration,
    /// `None` means any origin.
    pub cors_allowed_origins: Option<Vec<String>>,
    pub rate_limits: RateLimitConfig,
    pub redis_url: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub oauth: Option<OAuthConfig>,
    /// `None` means every service is mounted.
    pub enabled_services: Option<Vec<String>>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment: Environment = parse_or(&var, "APP_ENV", "development")?;

        let jwt_secret = match var("JWT_SECRET") {
            Some(secret) => secret,
            None if environment == Environment::Production => {
                return Err(ConfigError::Missing("JWT_SECRET"))
            }
            None => {
                info!("JWT_SECRET not set, using development secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        let expiry_minutes: u64 = parse_or(&var, "JWT_EXPIRATION_MINUTES", "60")?;
        let jwt_expiry = jwt_expiry(expiry_minutes)?;

        let cors_allowed_origins = var("CORS_ALLOWED_ORIGINS")
            .filter(|v| v.trim() != "*")
            .map(|v| split_list(&v));

        let enabled_services = var("ENABLED_SERVICES")
            .filter(|v| !v.trim().eq_ignore_ascii_case("all"))
            .map(|v| split_list(&v));

        let oauth = match (
            var("OAUTH_PROVIDER_URL"),
            var("OAUTH_CLIENT_ID"),
            var("OAUTH_CLIENT_SECRET"),
        ) {
            (Some(provider_url), Some(client_id), Some(client_secret)) => Some(OAuthConfig {
                provider_url: provider_url.trim_end_matches('/').to_string(),
                client_id,
                client_secret,
                redirect_uri: var("OAUTH_REDIRECT_URI")
                    .unwrap_or_else(|| "http://localhost:8080/auth/oauth/callback".to_string()),
            }),
            _ => None,
        };

        Ok(Self {
            app_name: var("APP_NAME").unwrap_or_else(|| "Financial Wellbeing Platform".to_string()),
            environment,
            bind_addr: parse_or(&var, "BIND_ADDR", "0.0.0.0:8080")?,
            database_url: var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            db_max_connections: parse_or(&var, "DB_MAX_CONNECTIONS", "20")?,
            jwt_secret,
            jwt_expiry,
            cors_allowed_origins,
            rate_limits: RateLimitConfig {
                default: parse_or(&var, "RATE_LIMIT_DEFAULT", "100/minute")?,
                chat: parse_or(&var, "RATE_LIMIT_CHAT", "50/minute")?,
                recommendations: parse_or(&var, "RATE_LIMIT_RECOMMENDATIONS", "30/minute")?,
                auth: parse_or(&var, "RATE_LIMIT_AUTH", "20/minute")?,
            },
            redis_url: var("REDIS_URL"),
            openai_api_key: var("OPENAI_API_KEY"),
            openai_model: var("OPENAI_MODEL").unwrap_or_else(|| "gpt-4".to_string()),
            openai_base_url: var("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            oauth,
            enabled_services,
        })
    }

    pub fn service_enabled(&self, name: &str) -> bool {
        match &self.enabled_services {
            None => true,
            Some(services) => services.iter().any(|s| s.eq_ignore_ascii_case(name)),
        }
    }
}

fn parse_or<T, V>(var: &V, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    V: Fn(&str) -> Option<String>,
{
    let value = var(key).unwrap_or_else(|| default.to_string());
    let parsed = value.trim().parse::<T>();
    parsed.map_err(|e| ConfigError::Invalid {
        key,
        value,
        reason: e.to_string(),
    })
}

fn jwt_expiry(minutes: u64) -> Result<Duration, ConfigError> {
    if minutes == 0 || minutes > MAX_JWT_EXPIRY_MINUTES {
        return Err(ConfigError::Invalid {
            key: "JWT_EXPIRATION_MINUTES",
            value: minutes.to_string(),
            reason: format!("must be between 1 and {MAX_JWT_EXPIRY_MINUTES}"),
        });
    }
    minutes
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::Invalid {
            key: "JWT_EXPIRATION_MINUTES",
            value: minutes.to_string(),
            reason: "overflows seconds".to_string(),
        })
}

/// Sets `key` in dotenv-formatted `contents`, replacing every existing
/// assignment (`KEY=` or `export KEY=`) or appending one if there is none.
/// Returns the new contents and whether an assignment was replaced.
pub fn upsert_env_entry(contents: &str, key: &str, value: &str) -> (String, bool) {
    let entry = format!("{key}={value}");
    let assigns_key = |line: &str| {
        let line = line.trim_start();
        let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);
        line.strip_prefix(key)
            .is_some_and(|rest| rest.trim_start().starts_with('='))
    };

    let mut replaced = false;
    let mut lines: Vec<String> = contents
        .lines()
        .filter_map(|line| {
            if !assigns_key(line) {
                return Some(line.to_string());
            }
            if replaced {
                return None;
            }
            replaced = true;
            Some(entry.clone())
        })
        .collect();
    if !replaced {
        lines.push(entry);
    }

    let mut out = lines.join("\n");
    out.push('\n');
    (out, replaced)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("DATABASE_URL", "postgres://localhost/finwell")]).unwrap();

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.jwt_expiry, Duration::from_secs(3600));
        assert_eq!(config.rate_limits.default, RateLimit::per_minute(100));
        assert_eq!(config.rate_limits.chat, RateLimit::per_minute(50));
        assert_eq!(config.rate_limits.recommendations, RateLimit::per_minute(30));
        assert_eq!(config.openai_model, "gpt-4");
        assert!(config.cors_allowed_origins.is_none());
        assert!(config.oauth.is_none());
        assert!(config.service_enabled("chat"));
    }

    #[test]
    fn test_database_url_is_required() {
        let err = config_from(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn test_production_requires_jwt_secret() {
        let err = config_from(&[
            ("DATABASE_URL", "postgres://localhost/finwell"),
            ("APP_ENV", "production"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));
    }

    #[test]
    fn test_lists_and_services() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/finwell"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example, https://b.example"),
            ("ENABLED_SERVICES", "users,Chat"),
        ])
        .unwrap();

        assert_eq!(
            config.cors_allowed_origins.as_deref(),
            Some(&["https://a.example".to_string(), "https://b.example".to_string()][..])
        );
        assert!(config.service_enabled("chat"));
        assert!(config.service_enabled("users"));
        assert!(!config.service_enabled("partners"));
    }

    #[test]
    fn test_rate_limit_parsing() {
        assert_eq!("100/minute".parse::<RateLimit>().unwrap(), RateLimit::per_minute(100));
        assert_eq!("25".parse::<RateLimit>().unwrap(), RateLimit::per_minute(25));

        let hourly: RateLimit = "10/hour".parse().unwrap();
        assert_eq!(hourly.window, Duration::from_secs(3600));

        assert!("0/minute".parse::<RateLimit>().is_err());
        assert!("ten/minute".parse::<RateLimit>().is_err());
        assert!("10/fortnight".parse::<RateLimit>().is_err());
    }

    #[test]
    fn test_invalid_rate_limit_names_variable() {
        let err = config_from(&[
            ("DATABASE_URL", "postgres://localhost/finwell"),
            ("RATE_LIMIT_CHAT", "lots"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "RATE_LIMIT_CHAT", .. }));
    }

    #[test]
    fn test_jwt_expiry_bounds() {
        let base = ("DATABASE_URL", "postgres://localhost/finwell");

        let config = config_from(&[base, ("JWT_EXPIRATION_MINUTES", "1440")]).unwrap();
        assert_eq!(config.jwt_expiry, Duration::from_secs(86_400));

        for value in ["0", "18446744073709551615", "525601"] {
            let err = config_from(&[base, ("JWT_EXPIRATION_MINUTES", value)]).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { key: "JWT_EXPIRATION_MINUTES", .. }),
                "{value} should be rejected"
            );
        }
    }

    #[test]
    fn test_upsert_env_entry() {
        let (appended, replaced) =
            upsert_env_entry("DATABASE_URL=postgres://db\n", "JWT_SECRET", "new");
        assert_eq!(appended, "DATABASE_URL=postgres://db\nJWT_SECRET=new\n");
        assert!(!replaced);

        let (rotated, replaced) = upsert_env_entry(
            "JWT_SECRET=old\nJWT_SECRET_BACKUP=keep\n# JWT_SECRET=commented\nexport JWT_SECRET = older\n",
            "JWT_SECRET",
            "new",
        );
        assert_eq!(
            rotated,
            "JWT_SECRET=new\nJWT_SECRET_BACKUP=keep\n# JWT_SECRET=commented\n"
        );
        assert!(replaced);

        assert_eq!(upsert_env_entry("", "JWT_SECRET", "x").0, "JWT_SECRET=x\n");
    }
}

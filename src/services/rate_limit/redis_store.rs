use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Client;
use std::time::Duration;

use super::{RateDecision, RateLimitError, RateLimitStore};
use crate::config::RateLimit;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Fixed-window counter in Redis, shared by every instance of the service.
///
/// The first request of a window creates the key with the window as its
/// TTL; later requests only increment it. Creation, increment and TTL read
/// run as one MULTI/EXEC pipeline.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, RateLimitError> {
        let client = Client::open(redis_url)?;
        let connection = tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                redis::RedisError::from((redis::ErrorKind::IoError, "connection timed out"))
            })??;

        Ok(Self { connection })
    }
}

pub(crate) fn decide(count: u64, pttl_ms: i64, limit: RateLimit) -> RateDecision {
    let max = u64::from(limit.max_requests);
    if count > max {
        let retry_after = if pttl_ms > 0 {
            Duration::from_millis(pttl_ms as u64)
        } else {
            limit.window
        };
        RateDecision::deny(limit.max_requests, retry_after)
    } else {
        RateDecision::allow(limit.max_requests, (max - count) as u32)
    }
}

#[async_trait]
impl RateLimitStore for RedisStore {
    async fn hit(&self, key: &str, limit: RateLimit) -> Result<RateDecision, RateLimitError> {
        let window_secs = limit.window.as_secs().max(1);
        let mut connection = self.connection.clone();

        let (count, pttl_ms): (u64, i64) = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(key)
            .arg(0)
            .arg("EX")
            .arg(window_secs)
            .arg("NX")
            .ignore()
            .cmd("INCR")
            .arg(key)
            .cmd("PTTL")
            .arg(key)
            .query_async(&mut connection)
            .await?;

        Ok(decide(count, pttl_ms, limit))
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_within_window_are_allowed() {
        let limit = RateLimit::per_minute(5);

        let first = decide(1, 60_000, limit);
        assert!(first.allowed);
        assert_eq!(first.remaining, 4);

        let last = decide(5, 12_000, limit);
        assert!(last.allowed);
        assert_eq!(last.remaining, 0);
    }

    #[test]
    fn test_over_limit_uses_key_ttl() {
        let limit = RateLimit::per_minute(5);

        let denied = decide(6, 12_500, limit);
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Duration::from_millis(12_500));
        assert_eq!(denied.retry_after_secs(), 13);

        // a key without expiry falls back to the full window
        let no_ttl = decide(9, -1, limit);
        assert_eq!(no_ttl.retry_after, Duration::from_secs(60));
    }
}

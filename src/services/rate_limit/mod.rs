//! Request rate limiting.
//!
//! Every request is charged against a key built from the client identity,
//! the policy bucket its path falls in, and the route it matched. Counting
//! is delegated to a [`RateLimitStore`]: [`MemoryStore`] keeps a sliding log
//! per key inside this process, [`RedisStore`] keeps a fixed-window counter
//! shared by every process pointed at the same Redis.

mod memory;
mod policy;
mod redis_store;

pub use memory::MemoryStore;
pub use policy::{RateLimitPolicy, Rule};
pub use redis_store::RedisStore;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::RateLimit;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Outcome of charging one request against a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// How long until the next request would be admitted. Zero when allowed.
    pub retry_after: Duration,
}

impl RateDecision {
    pub fn allow(limit: u32, remaining: u32) -> Self {
        Self {
            allowed: true,
            limit,
            remaining,
            retry_after: Duration::ZERO,
        }
    }

    pub fn deny(limit: u32, retry_after: Duration) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            retry_after,
        }
    }

    /// `Retry-After` value in whole seconds, never less than one.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs();
        if self.retry_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs.max(1)
        }
    }
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Records one request for `key` and reports whether it fits in `limit`.
    async fn hit(&self, key: &str, limit: RateLimit) -> Result<RateDecision, RateLimitError>;

    /// Drops state that can no longer affect a decision.
    async fn cleanup(&self) {}

    fn backend(&self) -> &'static str;
}

#[derive(Clone)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy, store: Arc<dyn RateLimitStore>) -> Self {
        Self { policy, store }
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Charges a request from `client` to `route` (the matched route
    /// template, or the raw path when nothing matched).
    ///
    /// Store failures admit the request.
    pub async fn check(&self, client: &str, route: &str) -> RateDecision {
        let (bucket, limit) = self.policy.limit_for(route);
        let key = format!("rl:{client}:{bucket}:{route}");

        match self.store.hit(&key, limit).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "rate limit store unavailable, allowing request");
                RateDecision::allow(limit.max_requests, limit.max_requests)
            }
        }
    }

    pub async fn cleanup(&self) {
        self.store.cleanup().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;

    struct BrokenStore;

    #[async_trait]
    impl RateLimitStore for BrokenStore {
        async fn hit(&self, _key: &str, _limit: RateLimit) -> Result<RateDecision, RateLimitError> {
            Err(RateLimitError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "connection refused",
            ))))
        }

        fn backend(&self) -> &'static str {
            "broken"
        }
    }

    fn policy() -> RateLimitPolicy {
        RateLimitPolicy::from_config(&RateLimitConfig {
            default: RateLimit::per_minute(3),
            chat: RateLimit::per_minute(1),
            recommendations: RateLimit::per_minute(2),
            auth: RateLimit::per_minute(2),
        })
    }

    #[tokio::test]
    async fn test_limits_are_per_client_and_route() {
        let limiter = RateLimiter::new(policy(), Arc::new(MemoryStore::new()));

        assert!(limiter.check("10.0.0.1", "/chat/start").await.allowed);
        assert!(!limiter.check("10.0.0.1", "/chat/start").await.allowed);

        // another client, and another route for the same client, have their own budget
        assert!(limiter.check("10.0.0.2", "/chat/start").await.allowed);
        assert!(limiter.check("10.0.0.1", "/chat/:session_id/message").await.allowed);
    }

    #[tokio::test]
    async fn test_store_errors_fail_open() {
        let limiter = RateLimiter::new(policy(), Arc::new(BrokenStore));
        for _ in 0..10 {
            assert!(limiter.check("10.0.0.1", "/users/:user_id").await.allowed);
        }
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(RateDecision::deny(1, Duration::from_millis(1500)).retry_after_secs(), 2);
        assert_eq!(RateDecision::deny(1, Duration::from_secs(3)).retry_after_secs(), 3);
        assert_eq!(RateDecision::deny(1, Duration::ZERO).retry_after_secs(), 1);
    }
}

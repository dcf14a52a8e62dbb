use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use super::{RateDecision, RateLimitError, RateLimitStore};
use crate::config::RateLimit;

struct Log {
    hits: VecDeque<Instant>,
    window: Duration,
}

/// Sliding-window log kept in process memory.
///
/// Each key keeps the instants of its admitted requests. A request is
/// admitted when fewer than `max_requests` of them fall inside the trailing
/// window. Not shared between processes.
#[derive(Default)]
pub struct MemoryStore {
    logs: Mutex<HashMap<String, Log>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit_at(&self, key: &str, limit: RateLimit, now: Instant) -> RateDecision {
        let mut logs = self.logs.lock();
        let log = logs.entry(key.to_string()).or_insert_with(|| Log {
            hits: VecDeque::new(),
            window: limit.window,
        });
        log.window = limit.window;

        while let Some(&oldest) = log.hits.front() {
            if now.saturating_duration_since(oldest) >= limit.window {
                log.hits.pop_front();
            } else {
                break;
            }
        }

        let max = limit.max_requests as usize;
        if log.hits.len() >= max {
            let retry_after = log
                .hits
                .front()
                .map(|&oldest| (oldest + limit.window).saturating_duration_since(now))
                .unwrap_or(limit.window);
            return RateDecision::deny(limit.max_requests, retry_after);
        }

        log.hits.push_back(now);
        RateDecision::allow(limit.max_requests, (max - log.hits.len()) as u32)
    }

    pub fn cleanup_at(&self, now: Instant) -> usize {
        let mut logs = self.logs.lock();
        let before = logs.len();
        logs.retain(|_, log| {
            log.hits
                .back()
                .is_some_and(|&newest| now.saturating_duration_since(newest) < log.window)
        });
        before - logs.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.logs.lock().len()
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn hit(&self, key: &str, limit: RateLimit) -> Result<RateDecision, RateLimitError> {
        Ok(self.hit_at(key, limit, Instant::now()))
    }

    async fn cleanup(&self) {
        let removed = self.cleanup_at(Instant::now());
        if removed > 0 {
            tracing::debug!(removed, "pruned idle rate limit keys");
        }
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: RateLimit = RateLimit {
        max_requests: 3,
        window: Duration::from_secs(60),
    };

    #[test]
    fn test_admits_up_to_limit() {
        let store = MemoryStore::new();
        let now = Instant::now();

        let remaining: Vec<u32> = (0..3)
            .map(|_| store.hit_at("k", LIMIT, now).remaining)
            .collect();
        assert_eq!(remaining, vec![2, 1, 0]);

        let denied = store.hit_at("k", LIMIT, now);
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Duration::from_secs(60));
    }

    #[test]
    fn test_window_slides() {
        let store = MemoryStore::new();
        let start = Instant::now();

        store.hit_at("k", LIMIT, start);
        store.hit_at("k", LIMIT, start + Duration::from_secs(20));
        store.hit_at("k", LIMIT, start + Duration::from_secs(40));

        let blocked = store.hit_at("k", LIMIT, start + Duration::from_secs(50));
        assert!(!blocked.allowed);
        assert_eq!(blocked.retry_after, Duration::from_secs(10));

        // the first hit has left the window, so exactly one slot frees up
        let later = start + Duration::from_secs(61);
        assert!(store.hit_at("k", LIMIT, later).allowed);
        assert!(!store.hit_at("k", LIMIT, later).allowed);
    }

    #[test]
    fn test_denied_requests_are_not_recorded() {
        let store = MemoryStore::new();
        let start = Instant::now();
        let one = RateLimit {
            max_requests: 1,
            window: Duration::from_secs(10),
        };

        assert!(store.hit_at("k", one, start).allowed);
        for s in 1..10 {
            assert!(!store.hit_at("k", one, start + Duration::from_secs(s)).allowed);
        }
        assert!(store.hit_at("k", one, start + Duration::from_secs(10)).allowed);
    }

    #[test]
    fn test_cleanup_drops_idle_keys() {
        let store = MemoryStore::new();
        let start = Instant::now();

        store.hit_at("idle", LIMIT, start);
        store.hit_at("busy", LIMIT, start + Duration::from_secs(50));
        assert_eq!(store.tracked_keys(), 2);

        let removed = store.cleanup_at(start + Duration::from_secs(70));
        assert_eq!(removed, 1);
        assert_eq!(store.tracked_keys(), 1);
    }
}

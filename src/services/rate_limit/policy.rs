use crate::config::{RateLimit, RateLimitConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    /// Path equals the prefix or continues it with `/`.
    Prefix(&'static str),
    /// Any path segment equals the value.
    Segment(&'static str),
}

impl Matcher {
    fn matches(&self, path: &str) -> bool {
        match self {
            Self::Prefix(prefix) => {
                path == *prefix
                    || path
                        .strip_prefix(prefix)
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            Self::Segment(segment) => path.split('/').any(|s| s == *segment),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub bucket: &'static str,
    pub matcher: Matcher,
    pub limit: RateLimit,
}

/// Maps a route to the budget it is charged against. Rules are tried in
/// order; the first match wins and unmatched routes use the default.
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    default: RateLimit,
    rules: Vec<Rule>,
}

impl RateLimitPolicy {
    pub fn new(default: RateLimit, rules: Vec<Rule>) -> Self {
        Self { default, rules }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        let rule = |bucket: &'static str, matcher: Matcher, limit: RateLimit| Rule {
            bucket,
            matcher,
            limit,
        };

        Self::new(
            config.default,
            vec![
                rule("auth", Matcher::Prefix("/auth"), config.auth),
                rule("auth", Matcher::Prefix("/user/token"), config.auth),
                rule("chat", Matcher::Prefix("/chat"), config.chat),
                rule(
                    "recommendations",
                    Matcher::Segment("recommendations"),
                    config.recommendations,
                ),
            ],
        )
    }

    pub fn limit_for(&self, path: &str) -> (&'static str, RateLimit) {
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(path))
            .map(|rule| (rule.bucket, rule.limit))
            .unwrap_or(("default", self.default))
    }

    pub fn default_limit(&self) -> RateLimit {
        self.default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RateLimitPolicy {
        RateLimitPolicy::from_config(&RateLimitConfig {
            default: RateLimit::per_minute(100),
            chat: RateLimit::per_minute(50),
            recommendations: RateLimit::per_minute(30),
            auth: RateLimit::per_minute(20),
        })
    }

    #[test]
    fn test_paths_map_to_buckets() {
        let policy = policy();

        assert_eq!(policy.limit_for("/chat/start"), ("chat", RateLimit::per_minute(50)));
        assert_eq!(policy.limit_for("/chat"), ("chat", RateLimit::per_minute(50)));
        assert_eq!(
            policy.limit_for("/users/:user_id/recommendations"),
            ("recommendations", RateLimit::per_minute(30))
        );
        assert_eq!(
            policy.limit_for("/recommendations/:recommendation_id"),
            ("recommendations", RateLimit::per_minute(30))
        );
        assert_eq!(policy.limit_for("/auth/login"), ("auth", RateLimit::per_minute(20)));
        assert_eq!(policy.limit_for("/user/token"), ("auth", RateLimit::per_minute(20)));
        assert_eq!(policy.limit_for("/users/:user_id"), ("default", RateLimit::per_minute(100)));
    }

    #[test]
    fn test_prefix_respects_segment_boundaries() {
        let policy = policy();
        assert_eq!(policy.limit_for("/chatter").0, "default");
        assert_eq!(policy.limit_for("/authors").0, "default");
        assert_eq!(policy.limit_for("/user/me").0, "default");
    }
}

use std::sync::Arc;
use std::time::Duration;

use crate::services::cache::KeyValueCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { count: u64 },
    Limited { count: u64 },
    /// The counter could not be read; the request proceeds unlimited.
    Unchecked,
}

impl RateDecision {
    pub fn is_limited(self) -> bool {
        matches!(self, RateDecision::Limited { .. })
    }
}

/// Fixed-window per-client counter backed by the shared cache.
pub struct RateLimiter {
    cache: Arc<dyn KeyValueCache>,
    limit: u64,
    window: Duration,
}

impl RateLimiter {
    pub fn new(cache: Arc<dyn KeyValueCache>, limit: u64, window: Duration) -> Self {
        Self {
            cache,
            limit,
            window,
        }
    }

    /// Count one request for `client` and decide whether it may proceed.
    pub async fn check(&self, client: &str) -> RateDecision {
        let key = format!("rate_limit:ip:{client}");
        match self.cache.increment(&key, self.window).await {
            Ok(count) if count > self.limit => RateDecision::Limited { count },
            Ok(count) => RateDecision::Allowed { count },
            Err(e) => {
                tracing::warn!(client, error = %e, "Rate limit check failed, continuing");
                RateDecision::Unchecked
            }
        }
    }
}

//! Per-client rate limiting with a fixed-window counter.
//!
//! Transport-agnostic core. The HTTP crate derives the client key
//! (forwarded IP or socket address) and calls `check()` on write requests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Whole seconds until the client may retry, rounded up, at least 1.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Allowed => None,
            Self::Limited { retry_after } => {
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                Some(secs.max(1))
            }
        }
    }
}

/// In-memory per-client rate limiter with fixed-window counters.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<RateLimiterInner>,
}

struct RateLimiterInner {
    max_requests: u64,
    window: Duration,
    counters: DashMap<String, (u64, Instant)>,
}

impl RateLimiter {
    pub fn new(max_requests: u64, window: Duration) -> Self {
        Self {
            inner: Arc::new(RateLimiterInner {
                max_requests,
                window,
                counters: DashMap::new(),
            }),
        }
    }

    pub fn max_requests(&self) -> u64 {
        self.inner.max_requests
    }

    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.inner.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.counters.is_empty()
    }

    /// Counts a request from `client` and decides whether to admit it.
    ///
    /// A missing or blank client key is always limited.
    pub fn check(&self, client: Option<&str>) -> RateDecision {
        self.check_at(client, Instant::now())
    }

    /// Same as [`check`](Self::check) with an explicit clock reading.
    pub fn check_at(&self, client: Option<&str>, now: Instant) -> RateDecision {
        let window = self.inner.window;
        let Some(key) = client.map(str::trim).filter(|k| !k.is_empty()) else {
            return RateDecision::Limited {
                retry_after: window,
            };
        };

        // The entry guard holds the shard lock for the whole read-modify-write.
        let mut entry = self
            .inner
            .counters
            .entry(key.to_string())
            .or_insert((0, now));
        let (count, window_start) = entry.value_mut();

        let elapsed = now.saturating_duration_since(*window_start);
        if elapsed > window {
            *count = 1;
            *window_start = now;
            return RateDecision::Allowed;
        }

        // Limited requests still count towards the current window.
        *count = count.saturating_add(1);
        if *count > self.inner.max_requests {
            RateDecision::Limited {
                retry_after: window.saturating_sub(elapsed),
            }
        } else {
            RateDecision::Allowed
        }
    }

    /// Evicts clients whose window started more than two windows ago.
    /// Returns the number of entries removed.
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    pub fn cleanup_at(&self, now: Instant) -> usize {
        let idle_limit = self.inner.window.saturating_mul(2);
        let before = self.inner.counters.len();
        self.inner
            .counters
            .retain(|_, (_, start)| now.saturating_duration_since(*start) <= idle_limit);
        before.saturating_sub(self.inner.counters.len())
    }
}

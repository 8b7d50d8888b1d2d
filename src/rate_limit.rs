//! Rate Limiter
//!
//! Per-(subject, resource) request budget over a trailing window. Rejected
//! requests are logged but do not consume budget.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::events::{EventLog, EventType, SecurityEvent};
use crate::window::{SlidingWindowCounter, WindowOutcome, WindowedKey, DEFAULT_SHARDS};

/// Sliding-window request limiter
pub struct RateLimiter {
    counter: SlidingWindowCounter<WindowedKey>,
    limit: usize,
    log: Arc<EventLog>,
}

impl RateLimiter {
    /// Allow `limit` requests per `window` for each (subject, resource)
    pub fn new(limit: usize, window: Duration, log: Arc<EventLog>) -> Self {
        Self::with_shards(limit, window, DEFAULT_SHARDS, log)
    }

    /// Same as `new` with an explicit shard count
    pub fn with_shards(limit: usize, window: Duration, shard_count: usize, log: Arc<EventLog>) -> Self {
        Self {
            counter: SlidingWindowCounter::with_shards(window, shard_count),
            limit,
            log,
        }
    }

    /// Requests allowed per window
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Admit or reject one request.
    ///
    /// The check and the record happen atomically per key. A rejection
    /// appends a `RATE_LIMIT_EXCEEDED` event and is not itself counted.
    pub fn allow(&self, subject_id: &str, resource: &str, now: DateTime<Utc>) -> bool {
        let key = WindowedKey::new(subject_id, resource);

        match self.counter.try_record(&key, now, self.limit) {
            WindowOutcome::Admitted { count } => {
                debug!(
                    subject = subject_id,
                    resource = resource,
                    count = count,
                    limit = self.limit,
                    "Request admitted"
                );
                true
            }
            WindowOutcome::Rejected { count } => {
                debug!(
                    subject = subject_id,
                    resource = resource,
                    count = count,
                    limit = self.limit,
                    "Rate limit exceeded"
                );
                self.log.append(
                    SecurityEvent::new(
                        EventType::RateLimitExceeded,
                        format!("User {} exceeded rate limit for {}", subject_id, resource),
                        now,
                    )
                    .with_subject(Some(subject_id)),
                );
                false
            }
        }
    }

    /// Requests left in the current window
    pub fn remaining(&self, subject_id: &str, resource: &str, now: DateTime<Utc>) -> usize {
        let key = WindowedKey::new(subject_id, resource);
        self.limit.saturating_sub(self.counter.count(&key, now))
    }

    /// Time until another request would be admitted, or `None` if one would be now
    pub fn retry_after(&self, subject_id: &str, resource: &str, now: DateTime<Utc>) -> Option<Duration> {
        let key = WindowedKey::new(subject_id, resource);
        self.counter.time_until_below(&key, now, self.limit)
    }

    /// Drop idle counters. Returns the number of keys removed.
    pub fn purge_idle(&self, now: DateTime<Utc>) -> usize {
        self.counter.purge_idle(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn limiter(limit: usize) -> (RateLimiter, Arc<EventLog>) {
        let log = Arc::new(EventLog::default());
        (RateLimiter::new(limit, Duration::seconds(60), log.clone()), log)
    }

    #[test]
    fn test_limit_within_window() {
        let (limiter, log) = limiter(3);
        let now = t0();

        assert!(limiter.allow("alice", "/api", now));
        assert!(limiter.allow("alice", "/api", now + Duration::seconds(1)));
        assert!(limiter.allow("alice", "/api", now + Duration::seconds(2)));
        assert!(!limiter.allow("alice", "/api", now + Duration::seconds(3)));

        let events = log.snapshot();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::RateLimitExceeded);
        assert_eq!(events[0].description, "User alice exceeded rate limit for /api");
        assert_eq!(events[0].subject_id.as_deref(), Some("alice"));
    }

    #[test]
    fn test_rejection_does_not_consume_budget() {
        let (limiter, _) = limiter(3);
        let now = t0();

        for i in 0..3 {
            assert!(limiter.allow("alice", "/api", now + Duration::seconds(i)));
        }
        // Many rejections late in the window
        for i in 0..10 {
            assert!(!limiter.allow("alice", "/api", now + Duration::seconds(50 + i)));
        }

        // Once the admitted hits age out the budget is fully back
        let later = now + Duration::seconds(62);
        assert_eq!(limiter.remaining("alice", "/api", later), 3);
        assert!(limiter.allow("alice", "/api", later));
    }

    #[test]
    fn test_keys_are_independent() {
        let (limiter, _) = limiter(1);
        let now = t0();

        assert!(limiter.allow("alice", "/a", now));
        assert!(limiter.allow("alice", "/b", now));
        assert!(limiter.allow("bob", "/a", now));
        assert!(!limiter.allow("alice", "/a", now));
    }

    #[test]
    fn test_retry_after() {
        let (limiter, _) = limiter(2);
        let now = t0();

        assert_eq!(limiter.retry_after("alice", "/api", now), None);
        limiter.allow("alice", "/api", now);
        limiter.allow("alice", "/api", now + Duration::seconds(10));

        assert_eq!(
            limiter.retry_after("alice", "/api", now + Duration::seconds(20)),
            Some(Duration::seconds(40))
        );
    }
}

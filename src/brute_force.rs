//! Brute Force Guard
//!
//! Counts failed logins per (subject, origin) over the lockout window. Once
//! `max_attempts` failures are inside the window, further attempts are
//! rejected until enough of them age out.
//!
//! Only confirmed failures are recorded. With `block_on_lockout` the guard
//! also keeps a block entry for the remaining lockout, so repeat checks
//! during a lockout are answered from the block list.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::blocklist::TemporalBlockList;
use crate::events::{EventLog, EventType, SecurityEvent};
use crate::window::{SlidingWindowCounter, WindowedKey, DEFAULT_SHARDS};

/// Failed-login lockout policy
pub struct BruteForceGuard {
    failures: SlidingWindowCounter<WindowedKey>,
    max_attempts: usize,
    lockouts: Option<TemporalBlockList<WindowedKey>>,
    shard_count: usize,
    log: Arc<EventLog>,
}

impl BruteForceGuard {
    /// Lock out a (subject, origin) after `max_attempts` failures within `lockout`
    pub fn new(max_attempts: usize, lockout: Duration, log: Arc<EventLog>) -> Self {
        Self::with_shards(max_attempts, lockout, DEFAULT_SHARDS, log)
    }

    /// Same as `new` with an explicit shard count
    pub fn with_shards(
        max_attempts: usize,
        lockout: Duration,
        shard_count: usize,
        log: Arc<EventLog>,
    ) -> Self {
        Self {
            failures: SlidingWindowCounter::with_shards(lockout, shard_count),
            max_attempts,
            lockouts: None,
            shard_count,
            log,
        }
    }

    /// Also keep a block entry for each active lockout
    pub fn with_lockout_blocks(mut self) -> Self {
        self.lockouts = Some(TemporalBlockList::with_shards(self.shard_count));
        self
    }

    /// Failures allowed before lockout
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Lockout window
    pub fn lockout(&self) -> Duration {
        self.failures.window()
    }

    /// True if a login attempt from `origin` for `subject_id` may proceed.
    ///
    /// A locked-out check appends a `BRUTE_FORCE_DETECTED` event.
    pub fn allowed(&self, subject_id: &str, origin: &str, now: DateTime<Utc>) -> bool {
        let key = WindowedKey::new(subject_id, origin);

        if let Some(lockouts) = &self.lockouts {
            if lockouts.is_blocked(&key, now) {
                self.detected(subject_id, origin, now);
                return false;
            }
        }

        let count = self.failures.count(&key, now);
        if count < self.max_attempts {
            return true;
        }

        if let Some(lockouts) = &self.lockouts {
            if let Some(remaining) = self.failures.time_until_below(&key, now, self.max_attempts) {
                let until = lockouts.block(key, remaining, "brute force lockout", now);
                info!(
                    subject = subject_id,
                    origin = origin,
                    blocked_until = %until,
                    "Lockout block added"
                );
            }
        }

        self.detected(subject_id, origin, now);
        false
    }

    /// Record a confirmed failed login. Returns failures now in the window.
    pub fn record_failure(&self, subject_id: &str, origin: &str, now: DateTime<Utc>) -> usize {
        let key = WindowedKey::new(subject_id, origin);
        let count = self.failures.record(&key, now);
        debug!(
            subject = subject_id,
            origin = origin,
            failures = count,
            max_attempts = self.max_attempts,
            "Login failure recorded"
        );
        count
    }

    /// Failures currently in the window
    pub fn failures(&self, subject_id: &str, origin: &str, now: DateTime<Utc>) -> usize {
        self.failures.count(&WindowedKey::new(subject_id, origin), now)
    }

    /// Forget all failures and any lockout for the key. Returns true if anything was cleared.
    pub fn reset(&self, subject_id: &str, origin: &str) -> bool {
        let key = WindowedKey::new(subject_id, origin);
        let cleared = self.failures.clear(&key);
        let unblocked = self
            .lockouts
            .as_ref()
            .map_or(false, |lockouts| lockouts.unblock(&key));
        cleared || unblocked
    }

    /// Drop idle counters and expired lockouts. Returns the number of rows removed.
    pub fn purge(&self, now: DateTime<Utc>) -> usize {
        let lockouts = self
            .lockouts
            .as_ref()
            .map_or(0, |lockouts| lockouts.purge_expired(now));
        self.failures.purge_idle(now) + lockouts
    }

    fn detected(&self, subject_id: &str, origin: &str, now: DateTime<Utc>) {
        self.log.append(
            SecurityEvent::new(
                EventType::BruteForceDetected,
                format!("Brute force detected for user {} from IP {}", subject_id, origin),
                now,
            )
            .with_subject(Some(subject_id))
            .with_origin(Some(origin)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn guard() -> (BruteForceGuard, Arc<EventLog>) {
        let log = Arc::new(EventLog::default());
        (BruteForceGuard::new(5, Duration::seconds(900), log.clone()), log)
    }

    #[test]
    fn test_lockout_after_max_failures() {
        let (guard, log) = guard();
        let now = t0();

        for i in 0..5 {
            assert!(guard.allowed("alice", "10.0.0.1", now + Duration::seconds(i)));
            guard.record_failure("alice", "10.0.0.1", now + Duration::seconds(i));
        }

        assert!(!guard.allowed("alice", "10.0.0.1", now + Duration::seconds(10)));

        let events = log.snapshot();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::BruteForceDetected);
        assert_eq!(
            events[0].description,
            "Brute force detected for user alice from IP 10.0.0.1"
        );
        assert_eq!(events[0].origin.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_lockout_expires() {
        let (guard, _) = guard();
        let now = t0();

        for _ in 0..5 {
            guard.record_failure("alice", "10.0.0.1", now);
        }
        assert!(!guard.allowed("alice", "10.0.0.1", now + Duration::seconds(899)));
        assert!(guard.allowed("alice", "10.0.0.1", now + Duration::seconds(900)));
    }

    #[test]
    fn test_origin_scoped() {
        let (guard, _) = guard();
        let now = t0();

        for _ in 0..5 {
            guard.record_failure("alice", "10.0.0.1", now);
        }
        assert!(!guard.allowed("alice", "10.0.0.1", now));
        assert!(guard.allowed("alice", "10.0.0.2", now));
        assert!(guard.allowed("bob", "10.0.0.1", now));
    }

    #[test]
    fn test_checks_do_not_count_as_failures() {
        let (guard, _) = guard();
        let now = t0();

        for _ in 0..20 {
            assert!(guard.allowed("alice", "10.0.0.1", now));
        }
        assert_eq!(guard.failures("alice", "10.0.0.1", now), 0);
    }

    #[test]
    fn test_reset_clears_failures() {
        let (guard, _) = guard();
        let now = t0();

        for _ in 0..5 {
            guard.record_failure("alice", "10.0.0.1", now);
        }
        assert!(guard.reset("alice", "10.0.0.1"));
        assert!(guard.allowed("alice", "10.0.0.1", now));
        assert!(!guard.reset("alice", "10.0.0.1"));
    }

    #[test]
    fn test_lockout_blocks_last_remaining_window() {
        let log = Arc::new(EventLog::default());
        let guard = BruteForceGuard::new(3, Duration::seconds(100), log).with_lockout_blocks();
        let now = t0();

        guard.record_failure("alice", "ip", now);
        guard.record_failure("alice", "ip", now + Duration::seconds(10));
        guard.record_failure("alice", "ip", now + Duration::seconds(20));

        // Breach at +30: the oldest failure leaves the window at +100
        assert!(!guard.allowed("alice", "ip", now + Duration::seconds(30)));
        assert!(!guard.allowed("alice", "ip", now + Duration::seconds(99)));
        assert!(guard.allowed("alice", "ip", now + Duration::seconds(100)));

        // Reset lifts the block as well
        for i in 0..3 {
            guard.record_failure("alice", "ip", now + Duration::seconds(200 + i));
        }
        assert!(!guard.allowed("alice", "ip", now + Duration::seconds(205)));
        assert!(guard.reset("alice", "ip"));
        assert!(guard.allowed("alice", "ip", now + Duration::seconds(206)));
    }

    #[test]
    fn test_stale_failures_still_lock_out() {
        let (guard, _) = guard();
        let now = t0() + Duration::seconds(10_000);

        assert!(guard.allowed("alice", "10.0.0.1", now));
        // Failures reported with a clock 1000s behind land at the latest check
        for _ in 0..5 {
            guard.record_failure("alice", "10.0.0.1", now - Duration::seconds(1_000));
        }
        assert!(!guard.allowed("alice", "10.0.0.1", now));
        assert!(!guard.allowed("alice", "10.0.0.1", now + Duration::seconds(899)));
        assert!(guard.allowed("alice", "10.0.0.1", now + Duration::seconds(900)));
    }

    #[test]
    fn test_purge() {
        let log = Arc::new(EventLog::default());
        let guard = BruteForceGuard::new(1, Duration::seconds(10), log).with_lockout_blocks();
        let now = t0();

        guard.record_failure("alice", "ip", now);
        assert!(!guard.allowed("alice", "ip", now));
        assert_eq!(guard.purge(now + Duration::seconds(20)), 2);
    }
}

//! Sliding Window Counter
//!
//! Per-key counters over a trailing time window, shared by the rate limiter
//! and the brute-force guard.
//!
//! Each key holds the ordered instants at which it was recorded. Every access
//! first drops instants that fell out of the window, so at any observation
//! point every retained instant satisfies `now - instant < window`.
//!
//! Time is always supplied by the caller. A `now` earlier than the latest
//! instant already observed for a key is clamped up to that instant: a stale
//! clock can neither resurrect pruned entries nor shrink the count. A key
//! keeps its latest instant after its hits are pruned, and the row is only
//! dropped by `purge_idle` once a full window has passed since that instant.

use std::collections::VecDeque;
use std::hash::{BuildHasherDefault, Hash};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

/// Default number of shards
pub const DEFAULT_SHARDS: usize = 16;

pub(crate) type FxBuildHasher = BuildHasherDefault<FxHasher>;

/// Shard amount accepted by `DashMap`: a power of two greater than one
pub(crate) fn shard_amount(shard_count: usize) -> usize {
    shard_count.max(2).next_power_of_two()
}

/// Composite counter key: a subject plus the resource or origin it acted on
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowedKey {
    /// Subject identifier supplied by the caller
    pub subject: String,
    /// Resource (rate limiting) or origin (brute force)
    pub scope: String,
}

impl WindowedKey {
    /// Create a new key
    pub fn new(subject: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            scope: scope.into(),
        }
    }
}

impl std::fmt::Display for WindowedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.subject, self.scope)
    }
}

/// Outcome of an atomic check-and-record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowOutcome {
    /// The hit was recorded; `count` includes it
    Admitted { count: usize },
    /// The window was already full; nothing was recorded
    Rejected { count: usize },
}

impl WindowOutcome {
    /// True if the hit was recorded
    pub fn is_admitted(&self) -> bool {
        matches!(self, WindowOutcome::Admitted { .. })
    }

    /// Number of hits in the window after the operation
    pub fn count(&self) -> usize {
        match self {
            WindowOutcome::Admitted { count } | WindowOutcome::Rejected { count } => *count,
        }
    }
}

#[derive(Debug)]
struct CounterState {
    hits: VecDeque<DateTime<Utc>>,
    latest: DateTime<Utc>,
}

impl CounterState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            hits: VecDeque::new(),
            latest: now,
        }
    }

    /// Clamp `now` against the latest instant seen for this key
    fn observe(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        if now > self.latest {
            self.latest = now;
        }
        self.latest
    }

    fn prune(&mut self, now: DateTime<Utc>, window: Duration) {
        while let Some(oldest) = self.hits.front() {
            if now - *oldest >= window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }

    /// No hits left and a full window has passed since the latest observation
    fn is_idle(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.hits.is_empty() && now - self.latest >= window
    }
}

/// Trailing-window hit counter keyed by `K`
pub struct SlidingWindowCounter<K = WindowedKey> {
    window: Duration,
    states: DashMap<K, CounterState, FxBuildHasher>,
}

impl<K: Hash + Eq + Clone> SlidingWindowCounter<K> {
    /// Create a counter over the given window
    pub fn new(window: Duration) -> Self {
        Self::with_shards(window, DEFAULT_SHARDS)
    }

    /// Create a counter with at least `shard_count` shards (rounded up to a power of two)
    pub fn with_shards(window: Duration, shard_count: usize) -> Self {
        Self {
            window,
            states: DashMap::with_hasher_and_shard_amount(
                FxBuildHasher::default(),
                shard_amount(shard_count),
            ),
        }
    }

    /// Length of the trailing window
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a hit for `key` at `now`
    pub fn record(&self, key: &K, now: DateTime<Utc>) -> usize {
        let mut state = self
            .states
            .entry(key.clone())
            .or_insert_with(|| CounterState::new(now));
        let now = state.observe(now);
        state.prune(now, self.window);
        state.hits.push_back(now);
        state.hits.len()
    }

    /// Number of hits for `key` inside the window ending at `now`.
    ///
    /// The observation is remembered even for an unseen key, so later stale
    /// records for it are clamped too.
    pub fn count(&self, key: &K, now: DateTime<Utc>) -> usize {
        let mut state = self
            .states
            .entry(key.clone())
            .or_insert_with(|| CounterState::new(now));
        let now = state.observe(now);
        state.prune(now, self.window);
        state.hits.len()
    }

    /// Record a hit only if fewer than `limit` hits are already in the window.
    ///
    /// The count and the append happen under one shard lock, so concurrent
    /// callers on the same key can never admit more than `limit` hits per window.
    pub fn try_record(&self, key: &K, now: DateTime<Utc>, limit: usize) -> WindowOutcome {
        let mut state = self
            .states
            .entry(key.clone())
            .or_insert_with(|| CounterState::new(now));
        let now = state.observe(now);
        state.prune(now, self.window);

        let count = state.hits.len();
        if count >= limit {
            WindowOutcome::Rejected { count }
        } else {
            state.hits.push_back(now);
            WindowOutcome::Admitted { count: count + 1 }
        }
    }

    /// Time until the count for `key` drops below `limit`, or `None` if it already is
    pub fn time_until_below(&self, key: &K, now: DateTime<Utc>, limit: usize) -> Option<Duration> {
        let mut state = self.states.get_mut(key)?;
        let now = state.observe(now);
        state.prune(now, self.window);

        let count = state.hits.len();
        if count < limit || count == 0 {
            return None;
        }
        // The count falls below `limit` once this hit leaves the window
        let pivot = state.hits[count - limit.max(1)];
        Some(pivot + self.window - now)
    }

    /// Drop all hits for `key`, keeping its latest instant. Returns true if any hit was dropped.
    pub fn clear(&self, key: &K) -> bool {
        match self.states.get_mut(key) {
            Some(mut state) => {
                let had_hits = !state.hits.is_empty();
                state.hits.clear();
                had_hits
            }
            None => false,
        }
    }

    /// Remove keys with no hits whose latest instant is a full window before
    /// `now`. Returns the number removed.
    pub fn purge_idle(&self, now: DateTime<Utc>) -> usize {
        let window = self.window;
        let mut removed = 0;
        self.states.retain(|_, state| {
            // The sweep's own clock must not advance the key's latest instant
            state.prune(now.max(state.latest), window);
            let idle = state.is_idle(now, window);
            if idle {
                removed += 1;
            }
            !idle
        });
        removed
    }

    /// Number of keys currently tracked, including idle keys not yet purged
    pub fn tracked_keys(&self) -> usize {
        self.states.len()
    }
}

//! Temporal Block List
//!
//! Maps a key (an origin address, or a subject/origin pair) to the instant
//! its block expires. Expired entries are logically absent and are evicted
//! by the lookup that observes them; `purge_expired` is available for
//! memory bounding under high key churn.
//!
//! Like the window counters, each key remembers the latest instant it was
//! observed at, so a stale `now` neither revives a lapsed block nor
//! shortens a new one. An evicted key keeps that instant until the sweep.

use std::hash::Hash;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::window::{shard_amount, FxBuildHasher, DEFAULT_SHARDS};

/// A copy of one block-list row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockEntry<K> {
    /// Blocked key
    pub key: K,
    /// Instant at which the block lapses
    pub blocked_until: DateTime<Utc>,
    /// Why the key was blocked
    pub reason: String,
}

#[derive(Debug)]
struct Block {
    until: DateTime<Utc>,
    reason: String,
}

#[derive(Debug)]
struct BlockState {
    block: Option<Block>,
    latest: DateTime<Utc>,
}

impl BlockState {
    fn observe(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        if now > self.latest {
            self.latest = now;
        }
        self.latest
    }

    /// Drop the block if it has lapsed at the clamped `now`
    fn expire(&mut self, now: DateTime<Utc>) {
        if self.block.as_ref().map_or(false, |b| now >= b.until) {
            self.block = None;
        }
    }
}

/// Store of temporary blocks keyed by `K`
pub struct TemporalBlockList<K = String> {
    entries: DashMap<K, BlockState, FxBuildHasher>,
}

impl<K: Hash + Eq + Clone> TemporalBlockList<K> {
    /// Create an empty block list
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Create an empty block list with an explicit shard count
    pub fn with_shards(shard_count: usize) -> Self {
        Self {
            entries: DashMap::with_hasher_and_shard_amount(
                FxBuildHasher::default(),
                shard_amount(shard_count),
            ),
        }
    }

    /// Block `key` for `duration` starting at `now`, clamped to the key's
    /// latest observed instant.
    ///
    /// Overwrites any existing entry for the key; durations never accumulate.
    /// Returns the new expiry instant.
    pub fn block(
        &self,
        key: K,
        duration: Duration,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let mut state = self.entries.entry(key).or_insert_with(|| BlockState {
            block: None,
            latest: now,
        });
        let now = state.observe(now);
        let until = now
            .checked_add_signed(duration)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        state.block = Some(Block {
            until,
            reason: reason.into(),
        });
        until
    }

    /// True iff `key` has an entry and `now < blocked_until`
    pub fn is_blocked(&self, key: &K, now: DateTime<Utc>) -> bool {
        self.entry(key, now).is_some()
    }

    /// Copy of the live entry for `key`, evicting it if it has expired
    pub fn entry(&self, key: &K, now: DateTime<Utc>) -> Option<BlockEntry<K>> {
        let mut state = self.entries.get_mut(key)?;
        let now = state.observe(now);
        state.expire(now);

        state.block.as_ref().map(|block| BlockEntry {
            key: key.clone(),
            blocked_until: block.until,
            reason: block.reason.clone(),
        })
    }

    /// Lift a block early. Returns true if a block was removed.
    pub fn unblock(&self, key: &K) -> bool {
        self.entries
            .get_mut(key)
            .map_or(false, |mut state| state.block.take().is_some())
    }

    /// Remove every key without a live block at `now`. Keys last observed
    /// after `now` are kept. Returns the number removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, state| {
            if state.latest > now {
                return true;
            }
            state.expire(now);
            let keep = state.block.is_some();
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Number of stored blocks, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|s| s.block.is_some()).count()
    }

    /// True if no block is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Hash + Eq + Clone> Default for TemporalBlockList<K> {
    fn default() -> Self {
        Self::new()
    }
}

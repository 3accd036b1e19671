//! Timed client blocks.
//!
//! An entry is authoritative only while `now < unblock_at`. Expired entries
//! are treated as absent on read and removed by [`BlockRegistry::purge_expired`];
//! the purge exists for memory hygiene, correctness never depends on it.

use std::num::NonZeroU32;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use serde::Serialize;

use super::ClientIdentity;

/// Why a client was blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockReason {
    /// Flood threshold exceeded.
    Ddos,
    /// Blocked by an operator.
    Manual,
}

/// A single block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockEntry {
    pub blocked_at: DateTime<Utc>,
    pub unblock_at: DateTime<Utc>,
    pub reason: BlockReason,
}

impl BlockEntry {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.unblock_at
    }

    /// Remaining block time rounded up to whole minutes, 0 once expired.
    pub fn remaining_minutes(&self, now: DateTime<Utc>) -> i64 {
        ceil_minutes(self.unblock_at - now)
    }
}

/// Reporting view of an active block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedIdentity {
    pub identity: ClientIdentity,
    pub remaining_minutes: i64,
    pub unblock_at: DateTime<Utc>,
    pub reason: BlockReason,
}

/// Registry of blocked clients.
#[derive(Debug, Default)]
pub struct BlockRegistry {
    entries: DashMap<ClientIdentity, BlockEntry>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_blocked(&self, identity: &str, now: DateTime<Utc>) -> bool {
        self.active(identity, now).is_some()
    }

    /// The entry for `identity` if it is still in force.
    pub fn active(&self, identity: &str, now: DateTime<Utc>) -> Option<BlockEntry> {
        self.entries
            .get(identity)
            .map(|entry| *entry)
            .filter(|entry| entry.is_active(now))
    }

    /// Block `identity` from `now` for `minutes`, replacing any existing entry.
    ///
    /// A non-zero duration guarantees `unblock_at > blocked_at`.
    pub fn block(
        &self,
        identity: &ClientIdentity,
        now: DateTime<Utc>,
        minutes: NonZeroU32,
        reason: BlockReason,
    ) -> BlockEntry {
        let entry = BlockEntry {
            blocked_at: now,
            unblock_at: now + TimeDelta::minutes(i64::from(minutes.get())),
            reason,
        };
        self.entries.insert(identity.clone(), entry);
        entry
    }

    /// Remove any entry for `identity`.
    ///
    /// Idempotent. Returns `true` only when a block that was still in force
    /// got lifted.
    pub fn unblock(&self, identity: &str, now: DateTime<Utc>) -> bool {
        self.entries
            .remove(identity)
            .is_some_and(|(_, entry)| entry.is_active(now))
    }

    /// Active blocks, sorted by identity.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Vec<BlockedIdentity> {
        let mut blocked: Vec<BlockedIdentity> = self
            .entries
            .iter()
            .filter(|item| item.value().is_active(now))
            .map(|item| BlockedIdentity {
                identity: item.key().clone(),
                remaining_minutes: item.value().remaining_minutes(now),
                unblock_at: item.value().unblock_at,
                reason: item.value().reason,
            })
            .collect();
        blocked.sort_by(|a, b| a.identity.cmp(&b.identity));
        blocked
    }

    pub fn active_count(&self, now: DateTime<Utc>) -> usize {
        self.entries
            .iter()
            .filter(|item| item.value().is_active(now))
            .count()
    }

    /// Drop expired entries and return the identities that were released.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Vec<ClientIdentity> {
        let mut released = Vec::new();
        self.entries.retain(|identity, entry| {
            if entry.is_active(now) {
                true
            } else {
                released.push(identity.clone());
                false
            }
        });
        released
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Round a duration up to whole minutes, clamping negatives to 0.
pub(crate) fn ceil_minutes(delta: TimeDelta) -> i64 {
    let millis = delta.num_milliseconds().max(0);
    (millis + 59_999) / 60_000
}

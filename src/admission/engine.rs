//! The admission decision.
//!
//! # Ordering
//!
//! Checks run in a fixed order and the first match decides:
//!
//! 1. active block → [`Rejection::Blocked`], no counter is touched
//! 2. minute count above the flood threshold → block, [`Rejection::DdosBlocked`]
//! 3. hourly count above quota → [`Rejection::RateLimited`], no block
//! 4. otherwise → [`Admission`]
//!
//! # Atomicity
//!
//! `decide` holds the client's usage-table entry for the whole sequence, so
//! concurrent requests from one client serialize on the read-increment-compare
//! step and cannot slip past a threshold together. Clients in different
//! shards do not contend. Lock order is usage table, then block registry.

use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, warn};

use super::block::ceil_minutes;
use super::{
    BlockEntry, BlockReason, BlockRegistry, ClientIdentity, IdentityUsage, Limits, Window,
    WindowCounter,
};

/// Per-client window state.
#[derive(Debug, Default, Clone, Copy)]
struct UsageRecord {
    hourly: Option<Window>,
    minute: Option<Window>,
}

/// A request that passed admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub hourly_count: u32,
    pub hourly_limit: u32,
    pub minute_count: u32,
}

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The client is under an active block.
    Blocked {
        unblock_at: DateTime<Utc>,
        remaining_minutes: i64,
    },
    /// This request tripped the flood threshold; a block now exists.
    DdosBlocked {
        minute_count: u32,
        block_duration_minutes: u32,
    },
    /// Hourly quota used up. No block is recorded.
    RateLimited {
        hourly_count: u32,
        limit: u32,
        reset_in_minutes: i64,
    },
}

impl Rejection {
    pub fn outcome(&self) -> &'static str {
        match self {
            Rejection::Blocked { .. } => "BLOCKED",
            Rejection::DdosBlocked { .. } => "DDOS_BLOCKED",
            Rejection::RateLimited { .. } => "RATE_LIMITED",
        }
    }
}

/// Aggregate counters, monotonically increasing.
#[derive(Debug, Default)]
struct RequestCounters {
    total: AtomicU64,
    successful: AtomicU64,
    blocked: AtomicU64,
    ddos_blocked: AtomicU64,
    rate_limited: AtomicU64,
    backend_failures: AtomicU64,
}

/// Point-in-time copy of the aggregate counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub blocked_requests: u64,
    pub ddos_blocked_requests: u64,
    pub rate_limited_requests: u64,
    pub backend_failures: u64,
}

/// What a sweep removed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Blocks that had run out.
    pub expired_blocks: Vec<ClientIdentity>,
    /// Usage records whose windows had all closed.
    pub dropped_records: usize,
}

/// Composes the hourly and minute windows with the block registry.
#[derive(Debug)]
pub struct AdmissionEngine {
    limits: Limits,
    hourly: WindowCounter,
    minute: WindowCounter,
    usage: DashMap<ClientIdentity, UsageRecord>,
    blocks: BlockRegistry,
    counters: RequestCounters,
}

impl AdmissionEngine {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            hourly: WindowCounter::hourly(limits.requests_per_hour.get()),
            minute: WindowCounter::per_minute(limits.ddos_requests_per_minute.get()),
            usage: DashMap::new(),
            blocks: BlockRegistry::new(),
            counters: RequestCounters::default(),
        }
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub fn blocks(&self) -> &BlockRegistry {
        &self.blocks
    }

    /// Run the admission pipeline for one request at `now`.
    pub fn decide(
        &self,
        identity: &ClientIdentity,
        now: DateTime<Utc>,
    ) -> Result<Admission, Rejection> {
        self.counters.total.fetch_add(1, Ordering::Relaxed);

        // Held until return: per-client serialization point
        let mut record = self.usage.entry(identity.clone()).or_default();

        if let Some(entry) = self.blocks.active(identity.as_str(), now) {
            self.counters.blocked.fetch_add(1, Ordering::Relaxed);
            return Err(Rejection::Blocked {
                unblock_at: entry.unblock_at,
                remaining_minutes: entry.remaining_minutes(now),
            });
        }

        let minute = self.minute.observe(&mut record.minute, now);
        if minute.exceeded() {
            let block_minutes = self.limits.block_duration_minutes;
            self.blocks
                .block(identity, now, block_minutes, BlockReason::Ddos);
            self.counters.ddos_blocked.fetch_add(1, Ordering::Relaxed);
            warn!(
                identity = %identity,
                minute_count = minute.count,
                threshold = minute.limit,
                block_minutes = block_minutes.get(),
                "Flood threshold exceeded, blocking client"
            );
            return Err(Rejection::DdosBlocked {
                minute_count: minute.count,
                block_duration_minutes: block_minutes.get(),
            });
        }

        let hourly = self.hourly.observe(&mut record.hourly, now);
        if hourly.exceeded() {
            self.counters.rate_limited.fetch_add(1, Ordering::Relaxed);
            return Err(Rejection::RateLimited {
                hourly_count: hourly.count,
                limit: hourly.limit,
                reset_in_minutes: ceil_minutes(self.hourly.resets_in(record.hourly.as_ref(), now)),
            });
        }

        Ok(Admission {
            hourly_count: hourly.count,
            hourly_limit: hourly.limit,
            minute_count: minute.count,
        })
    }

    /// The backend answered an admitted request.
    pub fn record_success(&self) {
        self.counters.successful.fetch_add(1, Ordering::Relaxed);
    }

    /// The backend could not be reached for an admitted request.
    pub fn record_backend_failure(&self) {
        self.counters.backend_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Operator block, independent of traffic.
    pub fn manual_block(
        &self,
        identity: &ClientIdentity,
        now: DateTime<Utc>,
        minutes: NonZeroU32,
    ) -> BlockEntry {
        self.blocks
            .block(identity, now, minutes, BlockReason::Manual)
    }

    /// Lift any block on `identity`. Returns whether an active block was
    /// lifted; window counts are left alone.
    pub fn unblock(&self, identity: &str, now: DateTime<Utc>) -> bool {
        self.blocks.unblock(identity, now)
    }

    pub fn counters(&self) -> CounterSnapshot {
        CounterSnapshot {
            total_requests: self.counters.total.load(Ordering::Relaxed),
            successful_requests: self.counters.successful.load(Ordering::Relaxed),
            blocked_requests: self.counters.blocked.load(Ordering::Relaxed),
            ddos_blocked_requests: self.counters.ddos_blocked.load(Ordering::Relaxed),
            rate_limited_requests: self.counters.rate_limited.load(Ordering::Relaxed),
            backend_failures: self.counters.backend_failures.load(Ordering::Relaxed),
        }
    }

    /// Hourly count for `identity` without recording a request.
    pub fn peek_hourly(&self, identity: &str, now: DateTime<Utc>) -> u32 {
        self.usage
            .get(identity)
            .map_or(0, |record| self.hourly.peek(record.hourly.as_ref(), now))
    }

    /// Minute count for `identity` without recording a request.
    pub fn peek_minute(&self, identity: &str, now: DateTime<Utc>) -> u32 {
        self.usage
            .get(identity)
            .map_or(0, |record| self.minute.peek(record.minute.as_ref(), now))
    }

    /// Clients with a live hourly window.
    pub fn active_identity_count(&self, now: DateTime<Utc>) -> usize {
        self.usage
            .iter()
            .filter(|item| self.hourly.peek(item.value().hourly.as_ref(), now) > 0)
            .count()
    }

    /// Hourly usage of every client with a live hourly window.
    pub fn usage_snapshot(&self, now: DateTime<Utc>) -> BTreeMap<ClientIdentity, IdentityUsage> {
        let limit = self.hourly.limit();
        self.usage
            .iter()
            .filter_map(|item| {
                let count = self.hourly.peek(item.value().hourly.as_ref(), now);
                (count > 0).then(|| {
                    (
                        item.key().clone(),
                        IdentityUsage {
                            hourly_count: count,
                            remaining: limit.saturating_sub(count),
                        },
                    )
                })
            })
            .collect()
    }

    /// Stored usage records, inert ones included.
    pub fn tracked_identity_count(&self) -> usize {
        self.usage.len()
    }

    /// Drop usage records whose windows have all closed and purge expired
    /// blocks.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let before = self.usage.len();
        self.usage.retain(|_, record| {
            let hourly_live = record
                .hourly
                .as_ref()
                .is_some_and(|window| self.hourly.is_live(window, now));
            let minute_live = record
                .minute
                .as_ref()
                .is_some_and(|window| self.minute.is_live(window, now));
            hourly_live || minute_live
        });
        let dropped_records = before.saturating_sub(self.usage.len());

        let expired_blocks = self.blocks.purge_expired(now);

        debug!(
            dropped_records,
            expired_blocks = expired_blocks.len(),
            "Admission state swept"
        );

        SweepReport {
            expired_blocks,
            dropped_records,
        }
    }
}

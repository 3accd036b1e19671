//! Read-only reporting over an [`AdmissionEngine`].
//!
//! Reporting never records a request, never opens a window and never purges
//! anything.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{AdmissionEngine, BlockedIdentity, ClientIdentity, CounterSnapshot};

/// Hourly usage for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IdentityUsage {
    pub hourly_count: u32,
    pub remaining: u32,
}

/// Summary for liveness reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    pub active_identity_count: usize,
    pub blocked_identity_count: usize,
    #[serde(flatten)]
    pub counters: CounterSnapshot,
}

/// Per-client detail for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetailedSnapshot {
    pub blocked: Vec<BlockedIdentity>,
    pub usage: BTreeMap<ClientIdentity, IdentityUsage>,
    pub counters: CounterSnapshot,
}

/// Borrowing view used by the health and stats endpoints.
#[derive(Debug, Clone, Copy)]
pub struct StatsReporter<'a> {
    engine: &'a AdmissionEngine,
}

impl<'a> StatsReporter<'a> {
    pub fn new(engine: &'a AdmissionEngine) -> Self {
        Self { engine }
    }

    pub fn health_snapshot(&self, now: DateTime<Utc>) -> HealthSnapshot {
        HealthSnapshot {
            active_identity_count: self.engine.active_identity_count(now),
            blocked_identity_count: self.engine.blocks().active_count(now),
            counters: self.engine.counters(),
        }
    }

    pub fn detailed_snapshot(&self, now: DateTime<Utc>) -> DetailedSnapshot {
        DetailedSnapshot {
            blocked: self.engine.blocks().snapshot(now),
            usage: self.engine.usage_snapshot(now),
            counters: self.engine.counters(),
        }
    }
}

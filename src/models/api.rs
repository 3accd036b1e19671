use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::admission::{
    BlockEntry, BlockReason, BlockedIdentity, ClientIdentity, CounterSnapshot, IdentityUsage,
};

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "healthy" while the process serves requests
    pub status: String,
    /// Crate version
    pub version: String,
    /// Configured backend
    pub backend_url: String,
    /// Clients with a live hourly window
    pub active_identity_count: usize,
    /// Clients under an active block
    pub blocked_identity_count: usize,
    #[serde(flatten)]
    pub counters: CounterSnapshot,
    pub timestamp: DateTime<Utc>,
}

/// Limits and backend as currently configured.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigurationSummary {
    pub backend_url: String,
    pub requests_per_hour: u32,
    pub ddos_requests_per_minute: u32,
    pub block_duration_minutes: u32,
}

/// Detailed statistics response.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub timestamp: DateTime<Utc>,
    /// Active blocks, sorted by identity
    pub blocked: Vec<BlockedIdentity>,
    /// Hourly usage per client with a live window
    pub usage: BTreeMap<ClientIdentity, IdentityUsage>,
    pub statistics: CounterSnapshot,
    pub configuration: ConfigurationSummary,
    /// Seconds since the service started
    pub uptime_seconds: u64,
}

/// Response to a manual unblock.
#[derive(Debug, Serialize)]
pub struct UnblockResponse {
    pub message: String,
    /// Whether an active block was lifted
    pub success: bool,
    pub identity: ClientIdentity,
}

/// Query parameters for a manual block.
#[derive(Debug, Default, Deserialize)]
pub struct BlockParams {
    /// Block length; defaults to the configured flood block duration
    pub minutes: Option<u32>,
}

/// Response to a manual block.
#[derive(Debug, Serialize)]
pub struct BlockResponse {
    pub message: String,
    pub identity: ClientIdentity,
    pub blocked_at: DateTime<Utc>,
    pub unblock_time: DateTime<Utc>,
    pub remaining_minutes: i64,
    pub reason: BlockReason,
}

impl BlockResponse {
    pub fn new(identity: ClientIdentity, entry: BlockEntry, now: DateTime<Utc>) -> Self {
        Self {
            message: format!("{identity} blocked until {}", entry.unblock_at),
            identity,
            blocked_at: entry.blocked_at,
            unblock_time: entry.unblock_at,
            remaining_minutes: entry.remaining_minutes(now),
            reason: entry.reason,
        }
    }
}

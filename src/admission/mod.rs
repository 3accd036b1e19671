//! Admission control: per-client quotas, flood detection, and timed blocks.
//!
//! # Decision Pipeline
//!
//! ```text
//! ClientIdentity
//!      │
//!      ▼
//! ┌──────────────┐  blocked   ┌──────────────────────┐
//! │ BlockRegistry│──────────► │ 429 BLOCKED          │
//! └──────┬───────┘            └──────────────────────┘
//!        │
//!        ▼
//! ┌──────────────┐  > limit   ┌──────────────────────┐
//! │ minute window│──────────► │ block + DDOS_BLOCKED │
//! └──────┬───────┘            └──────────────────────┘
//!        │
//!        ▼
//! ┌──────────────┐  > limit   ┌──────────────────────┐
//! │ hourly window│──────────► │ 429 RATE_LIMITED     │
//! └──────┬───────┘            └──────────────────────┘
//!        │
//!        ▼
//!     Admitted
//! ```
//!
//! All per-client state lives in memory and is owned by [`AdmissionEngine`].
//! Nothing here is static; each engine is independent, which keeps tests
//! isolated.

mod block;
mod engine;
mod stats;
mod window;

use std::borrow::Borrow;
use std::fmt;
use std::num::NonZeroU32;

use serde::Serialize;

pub use block::{BlockEntry, BlockReason, BlockRegistry, BlockedIdentity};
pub use engine::{Admission, AdmissionEngine, CounterSnapshot, Rejection, SweepReport};
pub use stats::{DetailedSnapshot, HealthSnapshot, IdentityUsage, StatsReporter};
pub use window::{Observation, Window, WindowCounter};

/// Identity used when nothing about the client can be determined.
///
/// Every such request shares one bucket.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Canonical client key, typically an IP address.
///
/// Never empty. Derived per request and used as the key into all per-client
/// state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Build an identity from `value` with surrounding whitespace removed,
    /// falling back to [`UNKNOWN_IDENTITY`] for blank input.
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        match value.trim() {
            "" => Self::unknown(),
            trimmed if trimmed.len() == value.len() => Self(value),
            trimmed => Self(trimmed.to_string()),
        }
    }

    /// The shared fallback identity.
    pub fn unknown() -> Self {
        Self(UNKNOWN_IDENTITY.to_string())
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_IDENTITY
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ClientIdentity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Process-wide admission limits, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Limits {
    /// Requests allowed per client per fixed hour window.
    pub requests_per_hour: NonZeroU32,
    /// Requests per fixed minute window above which a client is blocked.
    pub ddos_requests_per_minute: NonZeroU32,
    /// How long a flood block lasts.
    pub block_duration_minutes: NonZeroU32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            requests_per_hour: nonzero(60),
            ddos_requests_per_minute: nonzero(20),
            block_duration_minutes: nonzero(60),
        }
    }
}

/// `NonZeroU32` from a literal, clamping zero to one.
pub const fn nonzero(value: u32) -> NonZeroU32 {
    match NonZeroU32::new(value) {
        Some(value) => value,
        None => NonZeroU32::MIN,
    }
}

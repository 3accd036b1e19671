//! One structured event per terminal decision or operator action.
//!
//! Events go to the `quota_gate::access` tracing target so they can be routed
//! or filtered independently, e.g. `RUST_LOG=info,quota_gate::access=warn`.

use std::fmt;

use tracing::{info, warn};

use crate::admission::Rejection;
use crate::metrics;

/// Tracing target for access events.
pub const TARGET: &str = "quota_gate::access";

/// Terminal outcome of a request or administrative action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Forwarded,
    Blocked,
    DdosBlocked,
    RateLimited,
    BackendUnavailable,
    MalformedRequest,
    PayloadTooLarge,
    ManualUnblock,
    ManualBlock,
    BlockExpired,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Forwarded => "FORWARDED",
            Outcome::Blocked => "BLOCKED",
            Outcome::DdosBlocked => "DDOS_BLOCKED",
            Outcome::RateLimited => "RATE_LIMITED",
            Outcome::BackendUnavailable => "BACKEND_UNAVAILABLE",
            Outcome::MalformedRequest => "MALFORMED_REQUEST",
            Outcome::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Outcome::ManualUnblock => "MANUAL_UNBLOCK",
            Outcome::ManualBlock => "MANUAL_BLOCK",
            Outcome::BlockExpired => "BLOCK_EXPIRED",
        }
    }

    fn is_manual(&self) -> bool {
        matches!(
            self,
            Outcome::ManualUnblock | Outcome::ManualBlock | Outcome::BlockExpired
        )
    }

    fn is_refusal(&self) -> bool {
        matches!(
            self,
            Outcome::Blocked
                | Outcome::DdosBlocked
                | Outcome::RateLimited
                | Outcome::BackendUnavailable
                | Outcome::MalformedRequest
                | Outcome::PayloadTooLarge
        )
    }
}

impl From<&Rejection> for Outcome {
    fn from(rejection: &Rejection) -> Self {
        match rejection {
            Rejection::Blocked { .. } => Outcome::Blocked,
            Rejection::DdosBlocked { .. } => Outcome::DdosBlocked,
            Rejection::RateLimited { .. } => Outcome::RateLimited,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emit an access event and bump the matching metric.
///
/// Refusals log at `warn`, everything else at `info`.
pub fn record(identity: &str, method: &str, path: &str, outcome: Outcome, details: &str) {
    if outcome.is_refusal() {
        warn!(
            target: TARGET,
            identity,
            method,
            path,
            outcome = outcome.as_str(),
            details,
            "request refused"
        );
    } else {
        info!(
            target: TARGET,
            identity,
            method,
            path,
            outcome = outcome.as_str(),
            details,
            "request handled"
        );
    }

    if outcome.is_manual() {
        metrics::record_manual_action(outcome.as_str());
    } else {
        metrics::record_decision(outcome.as_str());
    }
}

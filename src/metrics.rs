//! Prometheus metrics for the gateway.
//!
//! Exposed by a dedicated listener on `METRICS_PORT`, separate from the proxy
//! port so scraping never consumes client quota.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `quota_gate_decisions_total` - Terminal request outcomes (label: outcome)
//! - `quota_gate_manual_actions_total` - Operator actions and block expiries (label: action)
//!
//! ## Histograms
//! - `quota_gate_upstream_duration_seconds` - Backend round-trip time (label: status)
//!
//! ## Gauges
//! - `quota_gate_blocked_identities` - Currently blocked clients
//! - `quota_gate_tracked_identities` - Usage records held in memory
//!
//! # Usage
//!
//! ```rust,ignore
//! use quota_gate::metrics::{init_metrics, record_decision};
//!
//! init_metrics("0.0.0.0:9090".parse()?)?;
//! record_decision("FORWARDED");
//! ```

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const DECISIONS_TOTAL: &str = "quota_gate_decisions_total";
    pub const MANUAL_ACTIONS_TOTAL: &str = "quota_gate_manual_actions_total";
    pub const UPSTREAM_DURATION_SECONDS: &str = "quota_gate_upstream_duration_seconds";
    pub const BLOCKED_IDENTITIES: &str = "quota_gate_blocked_identities";
    pub const TRACKED_IDENTITIES: &str = "quota_gate_tracked_identities";
}

/// Install the Prometheus exporter and its HTTP listener.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::DECISIONS_TOTAL,
        "Requests by terminal outcome (FORWARDED, BLOCKED, DDOS_BLOCKED, ...)"
    );
    describe_counter!(
        names::MANUAL_ACTIONS_TOTAL,
        "Manual blocks, manual unblocks and block expiries"
    );
    describe_histogram!(
        names::UPSTREAM_DURATION_SECONDS,
        "Backend round-trip duration in seconds"
    );
    describe_gauge!(
        names::BLOCKED_IDENTITIES,
        "Clients currently under an active block"
    );
    describe_gauge!(
        names::TRACKED_IDENTITIES,
        "Per-client usage records held in memory"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Like [`init_metrics`], but logs instead of failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

// =============================================================================
// Counter Recording Functions
// =============================================================================

pub fn record_decision(outcome: &'static str) {
    counter!(names::DECISIONS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_manual_action(action: &'static str) {
    counter!(names::MANUAL_ACTIONS_TOTAL, "action" => action).increment(1);
}

// =============================================================================
// Histogram Recording Functions
// =============================================================================

/// Record a backend round trip. `status` is the HTTP status or `"error"`.
pub fn record_upstream_duration(status: &str, duration_secs: f64) {
    histogram!(names::UPSTREAM_DURATION_SECONDS, "status" => status.to_string())
        .record(duration_secs);
}

// =============================================================================
// Gauge Recording Functions
// =============================================================================

pub fn set_blocked_identities(count: usize) {
    gauge!(names::BLOCKED_IDENTITIES).set(count as f64);
}

pub fn set_tracked_identities(count: usize) {
    gauge!(names::TRACKED_IDENTITIES).set(count as f64);
}

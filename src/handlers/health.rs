//! Health, readiness, and statistics endpoints.
//!
//! # Endpoints
//!
//! - `GET /health` - Liveness with aggregate counters
//! - `GET /ready` - Readiness probe, 503 once shutdown has begun
//! - `GET /stats` - Per-client usage, active blocks and configuration
//!
//! None of these pass through admission, so polling them never consumes a
//! client's quota.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use tracing::instrument;

use crate::admission::StatsReporter;
use crate::models::{ConfigurationSummary, HealthResponse, StatsResponse};
use crate::state::AppState;

/// Health check endpoint.
///
/// Always returns 200 OK while the process is serving.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "backend_url": "https://httpbin.org",
///   "active_identity_count": 12,
///   "blocked_identity_count": 1,
///   "total_requests": 480,
///   "successful_requests": 431,
///   "blocked_requests": 9,
///   "ddos_blocked_requests": 1,
///   "rate_limited_requests": 37,
///   "backend_failures": 2,
///   "timestamp": "2024-01-15T10:30:00Z"
/// }
/// ```
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let now = Utc::now();
    let snapshot = StatsReporter::new(&state.engine).health_snapshot(now);

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend_url: state.config.backend_url.clone(),
        active_identity_count: snapshot.active_identity_count,
        blocked_identity_count: snapshot.blocked_identity_count,
        counters: snapshot.counters,
        timestamp: now,
    })
}

/// Readiness check endpoint for Kubernetes probes.
#[instrument(skip(state))]
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    if state.is_shutting_down() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

/// Detailed statistics endpoint.
///
/// Computed on demand; reading it never changes any counter or window.
#[instrument(skip(state))]
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let now = Utc::now();
    let detail = StatsReporter::new(&state.engine).detailed_snapshot(now);
    let limits = state.engine.limits();

    Json(StatsResponse {
        timestamp: now,
        blocked: detail.blocked,
        usage: detail.usage,
        statistics: detail.counters,
        configuration: ConfigurationSummary {
            backend_url: state.config.backend_url.clone(),
            requests_per_hour: limits.requests_per_hour.get(),
            ddos_requests_per_minute: limits.ddos_requests_per_minute.get(),
            block_duration_minutes: limits.block_duration_minutes.get(),
        },
        uptime_seconds: state.uptime_seconds(),
    })
}

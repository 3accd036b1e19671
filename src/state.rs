//! Shared application state for Axum handlers.
//!
//! - **Engine**: the admission engine that owns all per-client state
//! - **Gateway**: the backend forwarder
//! - **Configuration**: runtime configuration access
//!
//! # Structured Concurrency
//!
//! The expired-state sweep runs as a background task managed by
//! `tokio_util::task::TaskTracker` and `CancellationToken`. Call `shutdown()`
//! to stop it before the process exits.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::access_log::{self, Outcome};
use crate::admission::{AdmissionEngine, StatsReporter};
use crate::config::Config;
use crate::error::AppResult;
use crate::gateway::ForwardingGateway;
use crate::metrics;
use crate::middleware::TrustedProxyConfig;

/// Shared application state for Axum handlers.
///
/// Cheap to clone; everything heavy sits behind `Arc`.
///
/// # Lifecycle
///
/// The sweep task is spawned on construction, so `new` must run inside a
/// Tokio runtime:
///
/// ```rust,ignore
/// let state = AppState::new(config)?;
/// // ... serve ...
/// state.shutdown().await;
/// ```
#[derive(Clone)]
pub struct AppState {
    /// Admission engine (quotas, flood detection, blocks)
    pub engine: Arc<AdmissionEngine>,
    /// Backend forwarder
    pub gateway: ForwardingGateway,
    /// Application configuration
    pub config: Arc<Config>,
    /// Parsed `TRUSTED_PROXIES`
    pub trusted_proxies: Arc<TrustedProxyConfig>,
    /// When the application started
    pub started_at: Instant,
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Build state from configuration and start the sweep task.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the limits or backend URL are invalid.
    pub fn new(config: Config) -> AppResult<Self> {
        let engine = Arc::new(AdmissionEngine::new(config.limits()?));
        let gateway = ForwardingGateway::new(&config.backend_url, config.backend_timeout)?;
        let trusted_proxies = Arc::new(TrustedProxyConfig::new(&config.trusted_proxies));

        let state = Self {
            engine,
            gateway,
            config: Arc::new(config),
            trusted_proxies,
            started_at: Instant::now(),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        };

        state.spawn_sweep_task();

        Ok(state)
    }

    /// Spawn the periodic sweep of expired blocks and idle usage records.
    ///
    /// Correctness never depends on this task; it only bounds memory.
    fn spawn_sweep_task(&self) {
        let engine = self.engine.clone();
        let period = self.config.sweep_interval;
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Sweep task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => sweep_once(&engine),
                }
            }

            debug!("Sweep task shutting down");
        });
    }

    /// Whether `shutdown()` has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Gracefully stop background tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// One sweep pass: purge, log expiries, refresh gauges.
pub fn sweep_once(engine: &AdmissionEngine) {
    let now = Utc::now();
    let report = engine.sweep(now);

    for identity in &report.expired_blocks {
        access_log::record(identity.as_str(), "-", "-", Outcome::BlockExpired, "block expired");
    }

    let health = StatsReporter::new(engine).health_snapshot(now);
    metrics::set_blocked_identities(health.blocked_identity_count);
    metrics::set_tracked_identities(engine.tracked_identity_count());

    if !report.expired_blocks.is_empty() || report.dropped_records > 0 {
        info!(
            expired_blocks = report.expired_blocks.len(),
            dropped_records = report.dropped_records,
            "Swept expired admission state"
        );
    }
}

//! # Quota Gate
//!
//! A quota-enforcing HTTP reverse proxy in front of a single backend:
//!
//! - **Hourly quotas**: fixed-window request budget per client identity
//! - **Flood detection**: a per-minute burst threshold that triggers a timed block
//! - **Operator control**: health, statistics, manual block and unblock
//! - **Streaming forwarding**: bodies relayed without buffering, hop-by-hop
//!   headers stripped
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Request ID → Trace → CORS → Body Limit)        │
//! ├───────────────────────────────┬─────────────────────────────┤
//! │  Control handlers             │  AdmissionLayer             │
//! │  (health, stats, block)       │  → proxy handler            │
//! ├───────────────────────────────┴─────────────────────────────┤
//! │  AdmissionEngine (windows, blocks, counters)                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ForwardingGateway (hyper client → backend)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::net::SocketAddr;
//!
//! use quota_gate::{AppState, Config, build_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let addr = config.server_addr();
//!     let state = AppState::new(config)?;
//!     let app = build_router(state.clone());
//!
//!     let listener = tokio::net::TcpListener::bind(addr).await?;
//!     axum::serve(
//!         listener,
//!         app.into_make_service_with_connect_info::<SocketAddr>(),
//!     )
//!     .await?;
//!
//!     state.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```bash
//! BACKEND_URL=http://localhost:3000 REQUESTS_PER_HOUR=100 cargo run
//! ```

pub mod access_log;
pub mod admission;
pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use admission::{AdmissionEngine, ClientIdentity, Limits};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use routes::build_router;
pub use state::AppState;

use std::net::SocketAddr;
use std::process::ExitCode;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use quota_gate::{AppState, Config, build_router, metrics, utils};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Initialize logging, text or JSON depending on `LOG_FORMAT`.
fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Run the application, returning an exit code on error.
async fn run() -> Result<(), exitcode::ExitCode> {
    // Load configuration before logging so LOG_FORMAT and RUST_LOG apply
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing("info", false);
            error!("Configuration error: {e}");
            return Err(exitcode::CONFIG);
        }
    };
    init_tracing(&config.log_level, config.log_json);

    info!("Starting Quota Gate v{}", env!("CARGO_PKG_VERSION"));
    info!(
        host = %config.host,
        port = %config.port,
        backend = %config.backend_url,
        requests_per_hour = config.requests_per_hour,
        ddos_requests_per_minute = config.ddos_requests_per_minute,
        block_duration_minutes = config.block_duration_minutes,
        "Configuration loaded"
    );
    if !config.proxy_validation_enabled() {
        warn!("TRUSTED_PROXIES is empty; forwarding headers are believed from any peer");
    }

    // Metrics exporter
    if let Some(metrics_addr) = config.metrics_addr() {
        metrics::try_init_metrics(metrics_addr);
    }

    // Build application state and router
    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;
    let state = AppState::new(config).map_err(|e| {
        error!("Failed to build application state: {e}");
        exitcode::CONFIG
    })?;
    let app = build_router(state.clone());

    // Start server
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("Endpoints:");
    info!("  GET  /health              - Health check with counters");
    info!("  GET  /ready               - Readiness check");
    info!("  GET  /stats               - Usage, blocks and configuration");
    info!("  GET  /unblock/{{identity}}  - Lift a block");
    info!("  POST /block/{{identity}}    - Block for ?minutes=N");
    info!("  ANY  /*                   - Proxied to {}", state.config.backend_url);

    // Start server with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(utils::shutdown_signal())
    .await
    .map_err(|e| {
        error!("Server error: {e}");
        exitcode::SOFTWARE
    })?;

    // Gracefully shutdown background tasks
    info!("HTTP server stopped, shutting down background tasks...");
    state.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}

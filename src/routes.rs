//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │   Request ID     │ ← Sets and propagates X-Request-Id
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response spans
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │      CORS        │ ← Cross-origin headers
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   Body Limit     │ ← 413 above MAX_REQUEST_BODY_SIZE
//! └────────┬─────────┘
//!          │
//!    ┌─────┴──────────────────────────┐
//!    ▼                                ▼
//! control routes               ┌──────────────┐
//! (/health, /ready, /stats,    │  Admission   │ ← 400 / 429
//!  /unblock, /block)           └──────┬───────┘
//!                                     ▼
//!                                proxy handler ← 502 on backend failure
//! ```
//!
//! # Route Groups
//!
//! - `/health`, `/ready`, `/stats` - Health & monitoring
//! - `/unblock/{identity}`, `/block/{identity}` - Operator actions
//! - everything else - admission, then forwarded to the backend
//!
//! Control routes bypass admission so operators can always reach them, even
//! from a blocked address.

use axum::Router;
use axum::handler::Handler;
use axum::http::HeaderName;
use axum::routing::{get, post};
use tower::Layer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;
use crate::middleware::AdmissionLayer;
use crate::state::AppState;

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Build the application router with all routes and middleware configured.
///
/// # Arguments
///
/// * `state` - Application state containing config, engine and gateway
///
/// # Returns
///
/// Fully configured Axum router ready to be served. Serve it with
/// `into_make_service_with_connect_info::<SocketAddr>()` so the peer address
/// is available for identity resolution.
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    let cors = build_cors_layer(&config.cors_allowed_origins);

    // =========================================================================
    // Proxy path: admission in front of the forwarding handler
    // =========================================================================
    info!(
        requests_per_hour = config.requests_per_hour,
        ddos_requests_per_minute = config.ddos_requests_per_minute,
        block_duration_minutes = config.block_duration_minutes,
        trusted_proxies = config.trusted_proxies.len(),
        "Admission control enabled"
    );
    let admission = AdmissionLayer::new(state.engine.clone(), state.trusted_proxies.clone());
    let proxy = admission.layer(handlers::proxy.with_state(state.clone()));

    // =========================================================================
    // Build Router with Routes
    // =========================================================================
    let mut router = Router::new()
        // Health and status endpoints
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/stats", get(handlers::stats))
        // Operator actions
        .route("/unblock/{identity}", get(handlers::unblock))
        .route("/block/{identity}", post(handlers::block))
        // Everything else is proxied
        .fallback_service(proxy);

    // =========================================================================
    // Apply Middleware Stack (order matters - applied bottom to top)
    // =========================================================================

    // 1. Request body size limit, enforced while streaming
    info!(
        max_size_mb = config.max_request_body_size / (1024 * 1024),
        "Request body size limit configured"
    );
    router = router.layer(RequestBodyLimitLayer::new(config.max_request_body_size));

    // 2. CORS
    router = router.layer(cors);

    // 3. Tracing
    router = router.layer(TraceLayer::new_for_http());

    // 4. Request ID: propagate to the response, then set on the request
    router = router.layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER));
    router = router.layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid));

    router.with_state(state)
}

/// Build CORS layer from configuration.
///
/// # Arguments
///
/// * `allowed_origins` - List of allowed origins, or `["*"]` for any origin
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_any = allowed_origins.iter().any(|o| o == "*");

    if allow_any {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::net::SocketAddr;

    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;

    fn state() -> AppState {
        AppState::new(Config {
            backend_url: "http://127.0.0.1:9".to_string(),
            backend_timeout: std::time::Duration::from_secs(1),
            requests_per_hour: 2,
            metrics_port: 0,
            ..Config::default()
        })
        .unwrap()
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_build_cors_layer_variants() {
        let _any = build_cors_layer(&["*".to_string()]);
        let _specific = build_cors_layer(&[
            "https://example.com".to_string(),
            "https://app.example.com".to_string(),
        ]);
    }

    #[tokio::test]
    async fn test_health_route_has_request_id() {
        let app = build_router(state());

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["total_requests"], 0);
    }

    #[tokio::test]
    async fn test_control_routes_bypass_admission() {
        let state = state();
        let app = build_router(state.clone());

        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(Request::get("/stats").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        assert_eq!(state.engine.counters().total_requests, 0);
    }

    #[tokio::test]
    async fn test_fallback_goes_through_admission() {
        let state = state();
        let app = build_router(state.clone());

        let mut req = Request::get("/some/path").body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo::<SocketAddr>("198.51.100.10:4000".parse().unwrap()));
        let _ = app.oneshot(req).await.unwrap();

        let counters = state.engine.counters();
        assert_eq!(counters.total_requests, 1);
        assert_eq!(state.engine.peek_hourly("198.51.100.10", chrono::Utc::now()), 1);
    }

    #[tokio::test]
    async fn test_block_then_unblock_via_routes() {
        let state = state();
        let app = build_router(state.clone());

        let response = app
            .clone()
            .oneshot(
                Request::post("/block/203.0.113.7?minutes=5")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["reason"], "MANUAL");
        assert_eq!(body["remaining_minutes"], 5);

        let response = app
            .clone()
            .oneshot(
                Request::get("/anything")
                    .header("x-forwarded-for", "203.0.113.7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let response = app
            .oneshot(
                Request::get("/unblock/203.0.113.7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["identity"], "203.0.113.7");
    }

    #[tokio::test]
    async fn test_block_rejects_out_of_range_minutes() {
        let app = build_router(state());

        let response = app
            .oneshot(
                Request::post("/block/203.0.113.7?minutes=0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["error"], "Invalid request");
    }
}

//! Admission middleware in front of the proxy handler.
//!
//! # Flow
//!
//! ```text
//! Request ─► target check ─► identity ─► AdmissionEngine::decide
//!               │ 400                         │ 429        │ ok
//!               ▼                             ▼            ▼
//!          MALFORMED_REQUEST        BLOCKED / DDOS /   inner service
//!                                   RATE_LIMITED       (ClientIdentity and
//!                                                       Admission in extensions)
//! ```
//!
//! The engine's per-client guard is released before the inner service runs,
//! so backend latency never holds admission state.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use chrono::Utc;
use tower::{Layer, Service};

use super::ip::{TrustedProxyConfig, resolve_client_identity};
use crate::access_log::{self, Outcome};
use crate::admission::AdmissionEngine;
use crate::error::AppError;
use crate::validation::validate_request_target;

/// Tower layer running the admission pipeline.
///
/// # Example
///
/// ```rust,ignore
/// let layer = AdmissionLayer::new(engine.clone(), trusted_proxies.clone());
/// let proxy = layer.layer(handlers::proxy.with_state(state));
/// let app = Router::new().fallback_service(proxy);
/// ```
#[derive(Clone)]
pub struct AdmissionLayer {
    engine: Arc<AdmissionEngine>,
    trusted_proxies: Arc<TrustedProxyConfig>,
}

impl AdmissionLayer {
    pub fn new(engine: Arc<AdmissionEngine>, trusted_proxies: Arc<TrustedProxyConfig>) -> Self {
        Self {
            engine,
            trusted_proxies,
        }
    }
}

impl<S> Layer<S> for AdmissionLayer {
    type Service = AdmissionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdmissionService {
            inner,
            engine: self.engine.clone(),
            trusted_proxies: self.trusted_proxies.clone(),
        }
    }
}

/// Service produced by [`AdmissionLayer`].
#[derive(Clone)]
pub struct AdmissionService<S> {
    inner: S,
    engine: Arc<AdmissionEngine>,
    trusted_proxies: Arc<TrustedProxyConfig>,
}

impl<S> Service<Request<Body>> for AdmissionService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        // Take the service that was driven to readiness
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        if let Err(err) = validate_request_target(&req) {
            let identity = peer.map_or_else(|| "-".to_string(), |addr| addr.ip().to_string());
            access_log::record(
                &identity,
                &method,
                &req.uri().to_string(),
                Outcome::MalformedRequest,
                &err.to_string(),
            );
            return Box::pin(async move { Ok(err.into_response()) });
        }

        let identity = resolve_client_identity(&req, peer, &self.trusted_proxies);

        match self.engine.decide(&identity, Utc::now()) {
            Ok(admission) => {
                req.extensions_mut().insert(identity);
                req.extensions_mut().insert(admission);
                Box::pin(async move { inner.call(req).await })
            }
            Err(rejection) => {
                let outcome = Outcome::from(&rejection);
                let err = AppError::from(rejection);
                access_log::record(
                    identity.as_str(),
                    &method,
                    &path,
                    outcome,
                    &err.to_string(),
                );
                Box::pin(async move { Ok(err.into_response()) })
            }
        }
    }
}

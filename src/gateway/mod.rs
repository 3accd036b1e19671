//! Forwarding of admitted requests to the backend.
//!
//! The request body and the response body are streamed, never buffered, so
//! multipart payloads reach the backend byte for byte and `Content-Length` is
//! passed through untouched. There are no retries: a connection failure or a
//! timeout is reported once as [`AppError::BackendUnavailable`]. A request
//! body that fails while streaming is the client's fault and is reported as
//! [`AppError::PayloadTooLarge`] or [`AppError::MalformedRequest`].

mod headers;

use std::error::Error as StdError;
use std::time::Duration;

use axum::body::Body;
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{Request, Response, Uri, Version};
use http_body_util::LengthLimitError;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::{Client, Error as ClientError};
use hyper_util::rt::TokioExecutor;
use tracing::{debug, instrument};

use crate::error::{AppError, AppResult};

pub use headers::{outbound_request_headers, strip_hop_by_hop};

/// Location of the backend: scheme, host and optional base path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    scheme: Scheme,
    authority: Authority,
    base_path: String,
}

impl BackendTarget {
    /// Parse an absolute `http://` or `https://` URL.
    ///
    /// # Errors
    ///
    /// `ConfigError` for relative URLs, other schemes, a missing host, or a
    /// query string.
    pub fn parse(backend_url: &str) -> AppResult<Self> {
        let uri: Uri = backend_url.parse().map_err(|e| {
            AppError::ConfigError(format!("Invalid BACKEND_URL '{backend_url}': {e}"))
        })?;

        let scheme = match uri.scheme() {
            Some(scheme) if *scheme == Scheme::HTTP || *scheme == Scheme::HTTPS => scheme.clone(),
            _ => {
                return Err(AppError::ConfigError(format!(
                    "BACKEND_URL must use http:// or https://, got '{backend_url}'"
                )));
            }
        };

        let authority = uri.authority().cloned().ok_or_else(|| {
            AppError::ConfigError(format!("BACKEND_URL '{backend_url}' has no host"))
        })?;

        if uri.query().is_some() {
            return Err(AppError::ConfigError(format!(
                "BACKEND_URL '{backend_url}' must not carry a query string"
            )));
        }

        Ok(Self {
            scheme,
            authority,
            base_path: uri.path().trim_end_matches('/').to_string(),
        })
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }
}

/// Relays requests to a single HTTP or HTTPS backend.
#[derive(Clone)]
pub struct ForwardingGateway {
    client: Client<HttpsConnector<HttpConnector>, Body>,
    target: BackendTarget,
    timeout: Duration,
}

impl std::fmt::Debug for ForwardingGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardingGateway")
            .field("target", &self.target)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ForwardingGateway {
    /// Build a gateway for `backend_url`.
    ///
    /// # Errors
    ///
    /// `ConfigError` when [`BackendTarget::parse`] rejects the URL.
    pub fn new(backend_url: &str, timeout: Duration) -> AppResult<Self> {
        let target = BackendTarget::parse(backend_url)?;
        let connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            client,
            target,
            timeout,
        })
    }

    /// Map an inbound URI onto the backend: base path, then the original path
    /// and query.
    pub fn upstream_uri(&self, original: &Uri) -> AppResult<Uri> {
        let original_pq = original
            .path_and_query()
            .map_or("/", PathAndQuery::as_str);

        let path_and_query: PathAndQuery = format!("{}{}", self.target.base_path, original_pq)
            .parse()
            .map_err(|e| AppError::MalformedRequest(format!("Unmappable request target: {e}")))?;

        Uri::builder()
            .scheme(self.target.scheme.clone())
            .authority(self.target.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| AppError::MalformedRequest(format!("Unmappable request target: {e}")))
    }

    /// Forward `req` and stream the backend's response back.
    #[instrument(skip(self, req), fields(method = %req.method(), path = %req.uri().path()))]
    pub async fn relay(&self, req: Request<Body>) -> AppResult<Response<Body>> {
        let (mut parts, body) = req.into_parts();
        parts.uri = self.upstream_uri(&parts.uri)?;
        outbound_request_headers(&mut parts.headers);
        // Inbound h2 must not leak into the backend connection
        parts.version = Version::HTTP_11;

        debug!(upstream = %parts.uri, "Forwarding request");

        let request = Request::from_parts(parts, body);
        let response = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| {
                AppError::BackendUnavailable(format!(
                    "no response within {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| classify_send_error(&e))?;

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

/// Attribute a failed exchange to the client body or to the backend.
///
/// Errors raised while polling the inbound body surface as an [`axum::Error`]
/// somewhere in the source chain; the body limit layer's
/// [`LengthLimitError`] sits beneath it.
fn classify_send_error(err: &ClientError) -> AppError {
    let mut body_failed = false;
    let mut cause: Option<&(dyn StdError + 'static)> = Some(err as &(dyn StdError + 'static));

    while let Some(current) = cause {
        if current.is::<LengthLimitError>() {
            return AppError::PayloadTooLarge;
        }
        if current.is::<axum::Error>() {
            body_failed = true;
        }
        cause = current.source();
    }

    if body_failed {
        AppError::MalformedRequest(format!("Request body could not be read: {err}"))
    } else {
        AppError::BackendUnavailable(err.to_string())
    }
}

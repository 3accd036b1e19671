use std::time::Instant;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::Response;
use tracing::instrument;

use crate::access_log::{self, Outcome};
use crate::admission::{Admission, ClientIdentity};
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::state::AppState;

/// Forward an admitted request and account for the result.
///
/// Runs behind [`AdmissionLayer`](crate::middleware::AdmissionLayer), which
/// places the [`ClientIdentity`] and [`Admission`] in the request extensions.
/// Only an unreachable or silent backend counts as a backend failure; a
/// request body that breaks off mid-stream is charged to the client.
#[instrument(skip_all, fields(method = %req.method(), path = %req.uri().path()))]
pub async fn proxy(State(state): State<AppState>, req: Request) -> AppResult<Response<Body>> {
    let identity = req
        .extensions()
        .get::<ClientIdentity>()
        .cloned()
        .unwrap_or_else(ClientIdentity::unknown);
    let admission = req.extensions().get::<Admission>().copied();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    let started = Instant::now();
    let result = state.gateway.relay(req).await;
    let elapsed = started.elapsed().as_secs_f64();

    match &result {
        Ok(response) => {
            state.engine.record_success();
            let status = response.status();
            metrics::record_upstream_duration(status.as_str(), elapsed);

            let usage = admission.map_or_else(String::new, |a| {
                format!(" {}/{}", a.hourly_count, a.hourly_limit)
            });
            access_log::record(
                identity.as_str(),
                &method,
                &path,
                Outcome::Forwarded,
                &format!("{}{usage}", status.as_u16()),
            );
        }
        Err(err) => {
            let outcome = match err {
                AppError::BackendUnavailable(_) => {
                    state.engine.record_backend_failure();
                    metrics::record_upstream_duration("error", elapsed);
                    Outcome::BackendUnavailable
                }
                AppError::PayloadTooLarge => Outcome::PayloadTooLarge,
                _ => Outcome::MalformedRequest,
            };
            access_log::record(identity.as_str(), &method, &path, outcome, &err.to_string());
        }
    }

    result
}

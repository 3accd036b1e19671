use axum::http::header::{HeaderName, HeaderValue, RETRY_AFTER};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::admission::Rejection;

/// Header carrying the configured hourly quota on rate-limited responses.
pub const RATE_LIMIT_LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");

/// Header carrying the remaining quota on rate-limited responses.
pub const RATE_LIMIT_REMAINING_HEADER: HeaderName =
    HeaderName::from_static("x-ratelimit-remaining");

/// Application-wide error types with appropriate HTTP status codes.
///
/// # Admission Refusals
///
/// `Blocked`, `DdosBlocked` and `RateLimited` are client-facing refusals
/// produced by the admission engine. They always map to 429 and are never
/// fatal to the process.
///
/// # Upstream Failures
///
/// `BackendUnavailable` covers connection failures and timeouts talking to
/// the backend. It maps to 502 and is not retried. A request body that
/// breaks off or overruns `MAX_REQUEST_BODY_SIZE` mid-stream is the client's
/// fault and maps to `MalformedRequest` or `PayloadTooLarge` instead.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Client is blocked until {unblock_at}")]
    Blocked {
        unblock_at: DateTime<Utc>,
        remaining_minutes: i64,
    },

    #[error("Flood detected: {current_count} requests in the current minute")]
    DdosBlocked {
        current_count: u32,
        block_duration_minutes: u32,
    },

    #[error("Hourly quota exceeded: {current_count}/{limit}")]
    RateLimited {
        current_count: u32,
        limit: u32,
        reset_in_minutes: i64,
    },

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Request body exceeds the size limit")]
    PayloadTooLarge,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl AppError {
    /// Outcome label used in access logs and metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            AppError::Blocked { .. } => "BLOCKED",
            AppError::DdosBlocked { .. } => "DDOS_BLOCKED",
            AppError::RateLimited { .. } => "RATE_LIMITED",
            AppError::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
            AppError::MalformedRequest(_) => "MALFORMED_REQUEST",
            AppError::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::ConfigError(_) => "CONFIG_ERROR",
        }
    }
}

impl From<Rejection> for AppError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::Blocked {
                unblock_at,
                remaining_minutes,
            } => AppError::Blocked {
                unblock_at,
                remaining_minutes,
            },
            Rejection::DdosBlocked {
                minute_count,
                block_duration_minutes,
            } => AppError::DdosBlocked {
                current_count: minute_count,
                block_duration_minutes,
            },
            Rejection::RateLimited {
                hourly_count,
                limit,
                reset_in_minutes,
            } => AppError::RateLimited {
                current_count: hourly_count,
                limit,
                reset_in_minutes,
            },
        }
    }
}

/// Error response body for API endpoints.
///
/// Fields that do not apply to a given error kind are omitted.
#[derive(Serialize, Default)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reset_in_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remaining_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unblock_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    block_duration_minutes: Option<u32>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::BackendUnavailable(_) | AppError::ConfigError(_) => {
                tracing::error!(error = %self, "Request failed");
            }
            _ => tracing::debug!(error = %self, "Request refused"),
        }

        let mut headers: Vec<(HeaderName, HeaderValue)> = Vec::new();

        let (status, body) = match &self {
            AppError::Blocked {
                unblock_at,
                remaining_minutes,
            } => {
                headers.push((RETRY_AFTER, minutes_header(*remaining_minutes)));
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    ErrorResponse {
                        error: "IP temporarily blocked".to_string(),
                        reason: Some("Too many requests detected"),
                        remaining_minutes: Some(*remaining_minutes),
                        unblock_time: Some(*unblock_at),
                        ..Default::default()
                    },
                )
            }
            AppError::DdosBlocked {
                current_count,
                block_duration_minutes,
            } => {
                headers.push((
                    RETRY_AFTER,
                    minutes_header(i64::from(*block_duration_minutes)),
                ));
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    ErrorResponse {
                        error: "IP blocked due to suspicious activity".to_string(),
                        reason: Some("DDoS detected"),
                        current_count: Some(*current_count),
                        block_duration_minutes: Some(*block_duration_minutes),
                        ..Default::default()
                    },
                )
            }
            AppError::RateLimited {
                current_count,
                limit,
                reset_in_minutes,
            } => {
                headers.push((RETRY_AFTER, minutes_header(*reset_in_minutes)));
                headers.push((RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(*limit)));
                headers.push((RATE_LIMIT_REMAINING_HEADER, HeaderValue::from_static("0")));
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    ErrorResponse {
                        error: "Rate limit exceeded".to_string(),
                        limit: Some(format!("{limit} requests per hour")),
                        current_count: Some(*current_count),
                        reset_in_minutes: Some(*reset_in_minutes),
                        ..Default::default()
                    },
                )
            }
            // Never leak upstream connection details to clients
            AppError::BackendUnavailable(_) => (
                StatusCode::BAD_GATEWAY,
                ErrorResponse {
                    error: "Backend service unavailable".to_string(),
                    ..Default::default()
                },
            ),
            AppError::MalformedRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: "Malformed request".to_string(),
                    message: Some(msg.clone()),
                    ..Default::default()
                },
            ),
            AppError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorResponse {
                    error: "Payload too large".to_string(),
                    message: Some(self.to_string()),
                    ..Default::default()
                },
            ),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: "Invalid request".to_string(),
                    message: Some(msg.clone()),
                    ..Default::default()
                },
            ),
            AppError::ConfigError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    error: "Service configuration error".to_string(),
                    ..Default::default()
                },
            ),
        };

        let mut response = (status, axum::Json(body)).into_response();
        response.headers_mut().extend(headers);
        response
    }
}

/// Render a minute count as a `Retry-After` value in seconds (at least 1).
fn minutes_header(minutes: i64) -> HeaderValue {
    HeaderValue::from(minutes.max(0).saturating_mul(60).max(1))
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

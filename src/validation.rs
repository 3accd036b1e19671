use axum::http::Request;

use crate::error::{AppError, AppResult};

// =============================================================================
// Validation Constants
// =============================================================================

/// Maximum length of an identity accepted on the admin endpoints.
///
/// Comfortably above the longest textual IPv6 address with zone id.
pub const MAX_IDENTITY_LENGTH: usize = 255;

/// Shortest manual block.
pub const MIN_BLOCK_MINUTES: u32 = 1;

/// Longest manual block (one week).
pub const MAX_BLOCK_MINUTES: u32 = 7 * 24 * 60;

/// Validate an identity taken from an admin path segment.
///
/// Rules:
/// - Must be between 1 and 255 bytes
/// - Must not be blank
/// - Must not contain control characters
pub fn validate_identity(identity: &str) -> AppResult<()> {
    if identity.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Identity cannot be empty".to_string(),
        ));
    }

    if identity.len() > MAX_IDENTITY_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Identity cannot exceed {} characters (got {})",
            MAX_IDENTITY_LENGTH,
            identity.len()
        )));
    }

    if let Some(pos) = identity.chars().position(|c| c.is_control()) {
        return Err(AppError::BadRequest(format!(
            "Identity contains invalid control character at position {pos}"
        )));
    }

    Ok(())
}

/// Validate the duration of a manual block.
pub fn validate_block_minutes(minutes: u32) -> AppResult<()> {
    if minutes < MIN_BLOCK_MINUTES {
        return Err(AppError::BadRequest(format!(
            "Block must last at least {MIN_BLOCK_MINUTES} minute"
        )));
    }

    if minutes > MAX_BLOCK_MINUTES {
        return Err(AppError::BadRequest(format!(
            "Block cannot exceed {MAX_BLOCK_MINUTES} minutes"
        )));
    }

    Ok(())
}

/// Reject request targets that cannot be mapped onto the backend.
///
/// Only origin-form targets (`/path?query`) are forwardable. Authority-form
/// (`CONNECT host:443`) and asterisk-form (`OPTIONS *`) are refused.
pub fn validate_request_target<B>(req: &Request<B>) -> AppResult<()> {
    let Some(path_and_query) = req.uri().path_and_query() else {
        return Err(AppError::MalformedRequest(format!(
            "Request target '{}' has no path",
            req.uri()
        )));
    };

    if !path_and_query.path().starts_with('/') {
        return Err(AppError::MalformedRequest(format!(
            "Request target '{path_and_query}' is not an absolute path"
        )));
    }

    Ok(())
}

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::Method;
use chrono::Utc;
use tracing::instrument;

use crate::access_log::{self, Outcome};
use crate::admission::{ClientIdentity, nonzero};
use crate::error::AppResult;
use crate::models::{BlockParams, BlockResponse, UnblockResponse};
use crate::state::AppState;
use crate::validation::{validate_block_minutes, validate_identity};

/// Lift any block on an identity.
///
/// Idempotent: unblocking an identity that was never blocked still returns
/// 200, with `success: false`. Window counts are not reset.
#[instrument(skip(state))]
pub async fn unblock(
    State(state): State<AppState>,
    method: Method,
    Path(identity): Path<String>,
) -> AppResult<Json<UnblockResponse>> {
    validate_identity(&identity)?;

    let identity = ClientIdentity::new(identity);
    let lifted = state.engine.unblock(identity.as_str(), Utc::now());

    let message = if lifted {
        format!("{identity} unblocked")
    } else {
        format!("{identity} was not blocked")
    };

    access_log::record(
        identity.as_str(),
        method.as_str(),
        &format!("/unblock/{identity}"),
        Outcome::ManualUnblock,
        if lifted { "lifted" } else { "no active block" },
    );

    Ok(Json(UnblockResponse {
        message,
        success: lifted,
        identity,
    }))
}

/// Block an identity for `?minutes=N`, defaulting to the flood block length.
///
/// Overwrites any existing block.
#[instrument(skip(state))]
pub async fn block(
    State(state): State<AppState>,
    method: Method,
    Path(identity): Path<String>,
    Query(params): Query<BlockParams>,
) -> AppResult<Json<BlockResponse>> {
    validate_identity(&identity)?;

    let minutes = params
        .minutes
        .unwrap_or_else(|| state.engine.limits().block_duration_minutes.get());
    validate_block_minutes(minutes)?;

    let identity = ClientIdentity::new(identity);
    let now = Utc::now();
    let entry = state.engine.manual_block(&identity, now, nonzero(minutes));

    access_log::record(
        identity.as_str(),
        method.as_str(),
        &format!("/block/{identity}"),
        Outcome::ManualBlock,
        &format!("{minutes} minutes"),
    );

    Ok(Json(BlockResponse::new(identity, entry, now)))
}

//! Handlers for reviewing detection results.
//!
//! A pending result is approved, rejected or overridden exactly once; a
//! second decision on the same result responds 409 `PRECONDITION_VIOLATION`.

use avicast_core::review::OverrideInput;
use avicast_core::types::DbId;
use avicast_db::models::detection::{DetectionResult, ReviewQueueItem};
use avicast_pipeline::ReviewOutcome;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::rbac::RequireReviewer;
use crate::query::ReviewQueueParams;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for approve and reject.
#[derive(Debug, Default, Deserialize)]
pub struct ReviewNotesRequest {
    pub notes: Option<String>,
}

/// GET /api/v1/review-queue
///
/// Pending results, oldest first. Deferred results sort last and are left
/// out with `?include_deferred=false`.
pub async fn review_queue(
    RequireReviewer(_user): RequireReviewer,
    State(state): State<AppState>,
    Query(params): Query<ReviewQueueParams>,
) -> AppResult<Json<DataResponse<Vec<ReviewQueueItem>>>> {
    let items = state
        .workflow
        .review_queue(params.include_deferred, params.limit, params.offset)
        .await?;
    Ok(Json(DataResponse { data: items }))
}

/// POST /api/v1/results/{id}/approve
pub async fn approve_result(
    RequireReviewer(user): RequireReviewer,
    State(state): State<AppState>,
    Path(result_id): Path<DbId>,
    Json(input): Json<ReviewNotesRequest>,
) -> AppResult<Json<DataResponse<ReviewOutcome>>> {
    let outcome = state
        .workflow
        .approve(&user.context(), result_id, input.notes.as_deref())
        .await?;
    Ok(Json(DataResponse { data: outcome }))
}

/// POST /api/v1/results/{id}/reject
///
/// Terminal. The result is kept for audit and never offered for allocation.
pub async fn reject_result(
    RequireReviewer(user): RequireReviewer,
    State(state): State<AppState>,
    Path(result_id): Path<DbId>,
    Json(input): Json<ReviewNotesRequest>,
) -> AppResult<Json<DataResponse<ReviewOutcome>>> {
    let outcome = state
        .workflow
        .reject(&user.context(), result_id, input.notes.as_deref())
        .await?;
    Ok(Json(DataResponse { data: outcome }))
}

/// POST /api/v1/results/{id}/override
///
/// Body: `{ "species"?, "count"?, "reason"? }`. At least one of species or
/// count is required; the other falls back to the detected value.
pub async fn override_result(
    RequireReviewer(user): RequireReviewer,
    State(state): State<AppState>,
    Path(result_id): Path<DbId>,
    Json(input): Json<OverrideInput>,
) -> AppResult<Json<DataResponse<ReviewOutcome>>> {
    let outcome = state
        .workflow
        .override_result(&user.context(), result_id, &input)
        .await?;
    Ok(Json(DataResponse { data: outcome }))
}

/// POST /api/v1/results/{id}/defer
pub async fn defer_result(
    RequireReviewer(user): RequireReviewer,
    State(state): State<AppState>,
    Path(result_id): Path<DbId>,
) -> AppResult<Json<DataResponse<DetectionResult>>> {
    let result = state
        .workflow
        .defer_review(&user.context(), result_id)
        .await?;
    Ok(Json(DataResponse { data: result }))
}

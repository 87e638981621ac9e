//! Handlers for allocating reviewed results to census observations.

use avicast_core::types::DbId;
use avicast_db::models::census::CensusAllocation;
use avicast_db::models::detection::AllocationCandidate;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::rbac::RequireReviewer;
use crate::query::PaginationParams;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for allocation.
#[derive(Debug, Deserialize)]
pub struct AllocateRequest {
    pub observation_id: DbId,
}

/// POST /api/v1/results/{id}/allocate
///
/// Only approved or overridden results can be allocated, and only once.
pub async fn allocate_result(
    RequireReviewer(user): RequireReviewer,
    State(state): State<AppState>,
    Path(result_id): Path<DbId>,
    Json(input): Json<AllocateRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<CensusAllocation>>)> {
    let allocation = state
        .workflow
        .allocate(&user.context(), result_id, input.observation_id)
        .await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: allocation })))
}

/// GET /api/v1/allocation-candidates
pub async fn list_candidates(
    RequireReviewer(_user): RequireReviewer,
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<DataResponse<Vec<AllocationCandidate>>>> {
    let candidates = state
        .workflow
        .allocation_candidates(params.limit, params.offset)
        .await?;
    Ok(Json(DataResponse { data: candidates }))
}

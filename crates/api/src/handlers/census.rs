use avicast_core::types::DbId;
use avicast_db::models::census::CensusObservation;
use axum::extract::{Path, State};
use axum::Json;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/census/observations/{id}
pub async fn get_observation(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(observation_id): Path<DbId>,
) -> AppResult<Json<DataResponse<CensusObservation>>> {
    let observation = state.workflow.get_observation(observation_id).await?;
    Ok(Json(DataResponse { data: observation }))
}

use axum::routing::get;
use axum::Router;

use crate::handlers::census;
use crate::state::AppState;

/// Census routes, nested under `/census`.
///
/// ```text
/// GET    /observations/{id}    get_observation
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/observations/{id}", get(census::get_observation))
}

use axum::routing::post;
use axum::Router;

use crate::handlers::{allocation, review};
use crate::state::AppState;

/// Result-scoped review and allocation routes, nested under `/results`.
///
/// ```text
/// POST   /{id}/approve     approve_result
/// POST   /{id}/reject      reject_result
/// POST   /{id}/override    override_result
/// POST   /{id}/defer       defer_result
/// POST   /{id}/allocate    allocate_result
/// ```
pub fn results_router() -> Router<AppState> {
    Router::new()
        .route("/{id}/approve", post(review::approve_result))
        .route("/{id}/reject", post(review::reject_result))
        .route("/{id}/override", post(review::override_result))
        .route("/{id}/defer", post(review::defer_result))
        .route("/{id}/allocate", post(allocation::allocate_result))
}

pub mod census;
pub mod health;
pub mod images;
pub mod review;

use axum::routing::get;
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /images                              upload (POST), list (GET)
/// /images/{id}                         image detail
/// /images/{id}/process                 run detection (POST)
/// /images/{id}/process-later           mark deferred (POST)
///
/// /review-queue                        pending results (GET)
/// /results/{id}/approve                approve (POST)
/// /results/{id}/reject                 reject (POST)
/// /results/{id}/override               override species/count (POST)
/// /results/{id}/defer                  review later (POST)
/// /results/{id}/allocate               allocate to census (POST)
/// /allocation-candidates               approved/overridden, unallocated (GET)
///
/// /census/observations/{id}            observation lookup
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/images", images::router())
        .nest("/results", review::results_router())
        .route("/review-queue", get(handlers::review::review_queue))
        .route(
            "/allocation-candidates",
            get(handlers::allocation::list_candidates),
        )
        .nest("/census", census::router())
}

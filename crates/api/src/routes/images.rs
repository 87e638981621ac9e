use axum::routing::{get, post};
use axum::Router;

use crate::handlers::images;
use crate::state::AppState;

/// Image routes, nested under `/images`.
///
/// ```text
/// POST   /                      upload_image
/// GET    /                      list_images
/// GET    /{id}                  get_image
/// POST   /{id}/process          process_image
/// POST   /{id}/process-later    process_later
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(images::upload_image).get(images::list_images))
        .route("/{id}", get(images::get_image))
        .route("/{id}/process", post(images::process_image))
        .route("/{id}/process-later", post(images::process_later))
}

//! Handlers for image capture and processing.
//!
//! Upload, list and inspect images, run detection on a captured image, or
//! mark it to be processed later.

use avicast_core::types::DbId;
use avicast_core::workflow::ImageStage;
use avicast_db::models::image::{ImageListFilter, UploadedImage};
use avicast_pipeline::{ImageDetail, NewUpload, ProcessOutcome};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireCapture;
use crate::query::ImageListParams;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/images
///
/// Multipart upload with a `file` part and an optional `site_hint` text part.
/// The new image starts in `captured`.
pub async fn upload_image(
    RequireCapture(user): RequireCapture,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<UploadedImage>>)> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut site_hint: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                file = Some((filename, data.to_vec()));
            }
            Some("site_hint") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                site_hint = Some(text);
            }
            _ => {}
        }
    }

    let (original_filename, bytes) =
        file.ok_or_else(|| AppError::BadRequest("Missing 'file' part".into()))?;

    let image = state
        .workflow
        .upload(
            &user.context(),
            NewUpload {
                bytes,
                original_filename,
                site_hint,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: image })))
}

/// GET /api/v1/images
///
/// Field workers see only their own uploads; reviewers and admins see all.
pub async fn list_images(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<ImageListParams>,
) -> AppResult<Json<DataResponse<Vec<UploadedImage>>>> {
    let stage = params
        .stage
        .as_deref()
        .map(ImageStage::parse)
        .transpose()?;

    let filter = ImageListFilter {
        uploaded_by: None,
        stage,
        limit: params.limit,
        offset: params.offset,
    };
    let images = state.workflow.list_images(&auth.context(), filter).await?;
    Ok(Json(DataResponse { data: images }))
}

/// GET /api/v1/images/{id}
///
/// The image with its detection result, summary, override and allocation.
pub async fn get_image(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(image_id): Path<DbId>,
) -> AppResult<Json<DataResponse<ImageDetail>>> {
    let detail = state.workflow.image_detail(&auth.context(), image_id).await?;
    Ok(Json(DataResponse { data: detail }))
}

/// POST /api/v1/images/{id}/process
///
/// Runs detection synchronously. Responds 503 `DETECTION_UNAVAILABLE` when
/// the detector fails; the image then stays `captured` and can be retried.
pub async fn process_image(
    RequireCapture(user): RequireCapture,
    State(state): State<AppState>,
    Path(image_id): Path<DbId>,
) -> AppResult<Json<DataResponse<ProcessOutcome>>> {
    let outcome = state.workflow.process(&user.context(), image_id).await?;
    Ok(Json(DataResponse { data: outcome }))
}

/// POST /api/v1/images/{id}/process-later
pub async fn process_later(
    RequireCapture(user): RequireCapture,
    State(state): State<AppState>,
    Path(image_id): Path<DbId>,
) -> AppResult<Json<DataResponse<UploadedImage>>> {
    let image = state
        .workflow
        .process_later(&user.context(), image_id)
        .await?;
    Ok(Json(DataResponse { data: image }))
}


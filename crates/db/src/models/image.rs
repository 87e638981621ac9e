//! Uploaded image models.

use avicast_core::error::CoreError;
use avicast_core::types::{DbId, Timestamp};
use avicast_core::workflow::ImageStage;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `uploaded_images` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UploadedImage {
    pub id: DbId,
    pub file_path: String,
    pub original_filename: String,
    pub content_type: String,
    pub file_size_bytes: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub uploaded_by: DbId,
    pub site_hint: Option<String>,
    pub stage: String,
    pub error_note: Option<String>,
    pub process_deferred_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl UploadedImage {
    /// Parsed workflow stage.
    pub fn stage(&self) -> Result<ImageStage, CoreError> {
        ImageStage::parse(&self.stage)
    }
}

/// DTO for recording a new upload. Stage always starts at `captured`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUploadedImage {
    pub file_path: String,
    pub original_filename: String,
    pub content_type: String,
    pub file_size_bytes: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub uploaded_by: DbId,
    pub site_hint: Option<String>,
}

/// Filters for listing images.
#[derive(Debug, Clone, Default)]
pub struct ImageListFilter {
    /// Restrict to one uploader; `None` lists every upload.
    pub uploaded_by: Option<DbId>,
    pub stage: Option<ImageStage>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

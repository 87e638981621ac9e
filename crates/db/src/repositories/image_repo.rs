//! Repository for the `uploaded_images` table.

use avicast_core::types::{DbId, Timestamp};
use avicast_core::workflow::ImageStage;
use sqlx::SqliteExecutor;

use crate::models::image::{CreateUploadedImage, ImageListFilter, UploadedImage};
use crate::repositories::{clamp_limit, clamp_offset};

/// Column list for uploaded_images queries.
const COLUMNS: &str = "id, file_path, original_filename, content_type, file_size_bytes, \
    width, height, uploaded_by, site_hint, stage, error_note, process_deferred_at, \
    created_at, updated_at";

/// Provides persistence for uploaded images and their workflow stage.
pub struct ImageRepo;

impl ImageRepo {
    /// Insert a new upload in the `captured` stage, returning the created row.
    pub async fn create<'e, E: SqliteExecutor<'e>>(
        executor: E,
        input: &CreateUploadedImage,
        at: Timestamp,
    ) -> Result<UploadedImage, sqlx::Error> {
        let query = format!(
            "INSERT INTO uploaded_images
                (file_path, original_filename, content_type, file_size_bytes, width, height,
                 uploaded_by, site_hint, stage, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, UploadedImage>(&query)
            .bind(&input.file_path)
            .bind(&input.original_filename)
            .bind(&input.content_type)
            .bind(input.file_size_bytes)
            .bind(input.width)
            .bind(input.height)
            .bind(input.uploaded_by)
            .bind(&input.site_hint)
            .bind(ImageStage::Captured.as_str())
            .bind(at)
            .fetch_one(executor)
            .await
    }

    /// Find an image by its ID.
    pub async fn find_by_id<'e, E: SqliteExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<Option<UploadedImage>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM uploaded_images WHERE id = $1");
        sqlx::query_as::<_, UploadedImage>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// List images, newest first.
    pub async fn list<'e, E: SqliteExecutor<'e>>(
        executor: E,
        filter: &ImageListFilter,
    ) -> Result<Vec<UploadedImage>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM uploaded_images
             WHERE ($1 IS NULL OR uploaded_by = $1)
               AND ($2 IS NULL OR stage = $2)
             ORDER BY created_at DESC, id DESC
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, UploadedImage>(&query)
            .bind(filter.uploaded_by)
            .bind(filter.stage.map(ImageStage::as_str))
            .bind(clamp_limit(filter.limit))
            .bind(clamp_offset(filter.offset))
            .fetch_all(executor)
            .await
    }

    /// Move an image from `from` to `to` if it is still in `from`.
    ///
    /// Reaching `organized` clears any error note left by an earlier failed
    /// detection. Returns `false` when the image was not in `from`.
    pub async fn transition<'e, E: SqliteExecutor<'e>>(
        executor: E,
        id: DbId,
        from: ImageStage,
        to: ImageStage,
        at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE uploaded_images
             SET stage = $3,
                 error_note = CASE WHEN $3 = 'organized' THEN NULL ELSE error_note END,
                 updated_at = $4
             WHERE id = $1 AND stage = $2",
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(at)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Return a `clarified` image to `captured` with the detection error attached.
    pub async fn fail_processing<'e, E: SqliteExecutor<'e>>(
        executor: E,
        id: DbId,
        error_note: &str,
        at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE uploaded_images
             SET stage = 'captured', error_note = $2, updated_at = $3
             WHERE id = $1 AND stage = 'clarified'",
        )
        .bind(id)
        .bind(error_note)
        .bind(at)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Stamp the "process later" marker on a `captured` image.
    pub async fn mark_process_deferred<'e, E: SqliteExecutor<'e>>(
        executor: E,
        id: DbId,
        at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE uploaded_images
             SET process_deferred_at = $2, updated_at = $2
             WHERE id = $1 AND stage = 'captured'",
        )
        .bind(id)
        .bind(at)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

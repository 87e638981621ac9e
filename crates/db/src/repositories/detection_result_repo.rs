//! Repository for the `detection_results` and `detection_overrides` tables.

use avicast_core::review::ReviewDecision;
use avicast_core::types::{DbId, Timestamp};
use sqlx::types::Json;
use sqlx::SqliteExecutor;

use crate::models::detection::{
    AllocationCandidate, CreateDetectionOverride, CreateDetectionResult, DetectionOverride,
    DetectionResult, RecordDecision, ReviewQueueItem,
};
use crate::repositories::{clamp_limit, clamp_offset};

/// Column list for detection_results queries.
const RESULT_COLUMNS: &str = "id, image_id, detections, model_name, decision, reviewed_by, \
    reviewed_at, review_notes, review_deferred_at, created_at, updated_at";

/// Column list for detection_overrides queries.
const OVERRIDE_COLUMNS: &str =
    "id, detection_result_id, species, count, reason, overridden_by, created_at";

/// Provides persistence for detection results and review decisions.
pub struct DetectionResultRepo;

impl DetectionResultRepo {
    /// Insert a pending result for an image, returning the created row.
    pub async fn create<'e, E: SqliteExecutor<'e>>(
        executor: E,
        input: &CreateDetectionResult,
        at: Timestamp,
    ) -> Result<DetectionResult, sqlx::Error> {
        let query = format!(
            "INSERT INTO detection_results
                (image_id, detections, model_name, decision, created_at, updated_at)
             VALUES ($1, $2, $3, 'pending', $4, $4)
             RETURNING {RESULT_COLUMNS}"
        );
        sqlx::query_as::<_, DetectionResult>(&query)
            .bind(input.image_id)
            .bind(Json(&input.detections))
            .bind(&input.model_name)
            .bind(at)
            .fetch_one(executor)
            .await
    }

    /// Find a result by its ID.
    pub async fn find_by_id<'e, E: SqliteExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<Option<DetectionResult>, sqlx::Error> {
        let query = format!("SELECT {RESULT_COLUMNS} FROM detection_results WHERE id = $1");
        sqlx::query_as::<_, DetectionResult>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Find the result belonging to an image.
    pub async fn find_by_image<'e, E: SqliteExecutor<'e>>(
        executor: E,
        image_id: DbId,
    ) -> Result<Option<DetectionResult>, sqlx::Error> {
        let query =
            format!("SELECT {RESULT_COLUMNS} FROM detection_results WHERE image_id = $1");
        sqlx::query_as::<_, DetectionResult>(&query)
            .bind(image_id)
            .fetch_optional(executor)
            .await
    }

    /// Record a reviewer decision if the result is still pending.
    ///
    /// This single conditional update is what makes concurrent reviewers
    /// safe: only the first writer sees one affected row.
    pub async fn record_decision<'e, E: SqliteExecutor<'e>>(
        executor: E,
        id: DbId,
        input: &RecordDecision,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE detection_results
             SET decision = $2, reviewed_by = $3, reviewed_at = $4, review_notes = $5,
                 updated_at = $4
             WHERE id = $1 AND decision = 'pending'",
        )
        .bind(id)
        .bind(input.decision.as_str())
        .bind(input.reviewed_by)
        .bind(input.reviewed_at)
        .bind(&input.review_notes)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Stamp the "review later" marker on a pending result.
    pub async fn mark_review_deferred<'e, E: SqliteExecutor<'e>>(
        executor: E,
        id: DbId,
        at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE detection_results
             SET review_deferred_at = $2, updated_at = $2
             WHERE id = $1 AND decision = 'pending'",
        )
        .bind(id)
        .bind(at)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Pending results awaiting review, oldest first.
    ///
    /// Deferred items sort after fresh ones; with `include_deferred = false`
    /// they are left out entirely.
    pub async fn review_queue<'e, E: SqliteExecutor<'e>>(
        executor: E,
        include_deferred: bool,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<ReviewQueueItem>, sqlx::Error> {
        sqlx::query_as::<_, ReviewQueueItem>(
            "SELECT
                r.id AS result_id,
                i.id AS image_id,
                i.file_path,
                i.site_hint,
                i.uploaded_by,
                i.created_at AS uploaded_at,
                r.detections,
                r.review_deferred_at
             FROM detection_results r
             JOIN uploaded_images i ON i.id = r.image_id
             WHERE r.decision = 'pending'
               AND i.stage = 'organized'
               AND ($1 OR r.review_deferred_at IS NULL)
             ORDER BY (r.review_deferred_at IS NOT NULL) ASC, r.created_at ASC, r.id ASC
             LIMIT $2 OFFSET $3",
        )
        .bind(include_deferred)
        .bind(clamp_limit(limit))
        .bind(clamp_offset(offset))
        .fetch_all(executor)
        .await
    }

    /// Approved or overridden results not yet linked to a census observation.
    pub async fn allocation_candidates<'e, E: SqliteExecutor<'e>>(
        executor: E,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<AllocationCandidate>, sqlx::Error> {
        sqlx::query_as::<_, AllocationCandidate>(
            "SELECT
                r.id AS result_id,
                i.id AS image_id,
                r.decision,
                i.site_hint,
                r.reviewed_by,
                r.reviewed_at,
                r.detections,
                o.species AS override_species,
                o.count AS override_count
             FROM detection_results r
             JOIN uploaded_images i ON i.id = r.image_id
             LEFT JOIN detection_overrides o ON o.detection_result_id = r.id
             WHERE r.decision IN ($1, $2)
               AND NOT EXISTS (
                   SELECT 1 FROM census_allocations a WHERE a.detection_result_id = r.id
               )
             ORDER BY r.reviewed_at ASC, r.id ASC
             LIMIT $3 OFFSET $4",
        )
        .bind(ReviewDecision::Approved.as_str())
        .bind(ReviewDecision::Overridden.as_str())
        .bind(clamp_limit(limit))
        .bind(clamp_offset(offset))
        .fetch_all(executor)
        .await
    }
}

/// Provides persistence for reviewer overrides.
pub struct DetectionOverrideRepo;

impl DetectionOverrideRepo {
    /// Insert an override record, returning the created row.
    pub async fn create<'e, E: SqliteExecutor<'e>>(
        executor: E,
        input: &CreateDetectionOverride,
        at: Timestamp,
    ) -> Result<DetectionOverride, sqlx::Error> {
        let query = format!(
            "INSERT INTO detection_overrides
                (detection_result_id, species, count, reason, overridden_by, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {OVERRIDE_COLUMNS}"
        );
        sqlx::query_as::<_, DetectionOverride>(&query)
            .bind(input.detection_result_id)
            .bind(&input.species)
            .bind(input.count)
            .bind(&input.reason)
            .bind(input.overridden_by)
            .bind(at)
            .fetch_one(executor)
            .await
    }

    /// Find the override attached to a result, if any.
    pub async fn find_by_result<'e, E: SqliteExecutor<'e>>(
        executor: E,
        detection_result_id: DbId,
    ) -> Result<Option<DetectionOverride>, sqlx::Error> {
        let query = format!(
            "SELECT {OVERRIDE_COLUMNS} FROM detection_overrides WHERE detection_result_id = $1"
        );
        sqlx::query_as::<_, DetectionOverride>(&query)
            .bind(detection_result_id)
            .fetch_optional(executor)
            .await
    }
}

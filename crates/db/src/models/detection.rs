//! Detection result, override, and review queue models.

use avicast_core::detection::{summarize, Detection, DetectionSummary};
use avicast_core::error::CoreError;
use avicast_core::review::{ResolvedOverride, ReviewDecision};
use avicast_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// DetectionResult
// ---------------------------------------------------------------------------

/// A row from the `detection_results` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DetectionResult {
    pub id: DbId,
    pub image_id: DbId,
    pub detections: Json<Vec<Detection>>,
    pub model_name: Option<String>,
    pub decision: String,
    pub reviewed_by: Option<DbId>,
    pub reviewed_at: Option<Timestamp>,
    pub review_notes: Option<String>,
    pub review_deferred_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl DetectionResult {
    pub fn decision(&self) -> Result<ReviewDecision, CoreError> {
        ReviewDecision::parse(&self.decision)
    }

    pub fn summary(&self) -> DetectionSummary {
        summarize(&self.detections)
    }
}

/// DTO for inserting a freshly detected result (decision starts pending).
#[derive(Debug, Clone)]
pub struct CreateDetectionResult {
    pub image_id: DbId,
    pub detections: Vec<Detection>,
    pub model_name: Option<String>,
}

/// Decision write for a pending result.
#[derive(Debug, Clone)]
pub struct RecordDecision {
    pub decision: ReviewDecision,
    pub reviewed_by: DbId,
    pub reviewed_at: Timestamp,
    pub review_notes: Option<String>,
}

// ---------------------------------------------------------------------------
// DetectionOverride
// ---------------------------------------------------------------------------

/// A row from the `detection_overrides` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DetectionOverride {
    pub id: DbId,
    pub detection_result_id: DbId,
    pub species: String,
    pub count: i64,
    pub reason: Option<String>,
    pub overridden_by: DbId,
    pub created_at: Timestamp,
}

impl DetectionOverride {
    pub fn resolved(&self) -> ResolvedOverride {
        ResolvedOverride {
            species: self.species.clone(),
            count: self.count,
            reason: self.reason.clone(),
        }
    }
}

/// DTO for creating an override record.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDetectionOverride {
    pub detection_result_id: DbId,
    pub species: String,
    pub count: i64,
    pub reason: Option<String>,
    pub overridden_by: DbId,
}

// ---------------------------------------------------------------------------
// Read models
// ---------------------------------------------------------------------------

/// A review queue item: a pending result joined with its image.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ReviewQueueItem {
    pub result_id: DbId,
    pub image_id: DbId,
    pub file_path: String,
    pub site_hint: Option<String>,
    pub uploaded_by: DbId,
    pub uploaded_at: Timestamp,
    pub detections: Json<Vec<Detection>>,
    pub review_deferred_at: Option<Timestamp>,
}

/// An approved or overridden result that has not been allocated yet.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AllocationCandidate {
    pub result_id: DbId,
    pub image_id: DbId,
    pub decision: String,
    pub site_hint: Option<String>,
    pub reviewed_by: Option<DbId>,
    pub reviewed_at: Option<Timestamp>,
    pub detections: Json<Vec<Detection>>,
    pub override_species: Option<String>,
    pub override_count: Option<i64>,
}

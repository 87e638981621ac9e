//! Image review workflow state machine.
//!
//! An image moves through
//! `captured -> clarified -> organized -> {approved | rejected | overridden} -> allocated`.
//! The only backward edge is `clarified -> captured` after a failed detection.
//!
//! [`ImageStage`] is the flat form stored in the database. [`WorkflowState`]
//! is the typed form: each variant carries a payload type, and transition
//! functions exist only on the payload types of the stages that allow them.
//! Asking a state for the wrong payload yields
//! [`CoreError::PreconditionViolation`].

use std::sync::Arc;

use serde::Serialize;

use crate::detection::{summarize, Detection, DetectionSummary};
use crate::error::CoreError;
use crate::review::{normalize_notes, OverrideInput, ResolvedOverride, ReviewDecision};
use crate::types::{DbId, Timestamp};

/* --------------------------------------------------------------------------
Stages
-------------------------------------------------------------------------- */

pub const STAGE_CAPTURED: &str = "captured";
pub const STAGE_CLARIFIED: &str = "clarified";
pub const STAGE_ORGANIZED: &str = "organized";
pub const STAGE_APPROVED: &str = "approved";
pub const STAGE_REJECTED: &str = "rejected";
pub const STAGE_OVERRIDDEN: &str = "overridden";
pub const STAGE_ALLOCATED: &str = "allocated";

/// All valid stage values.
pub const VALID_STAGES: &[&str] = &[
    STAGE_CAPTURED,
    STAGE_CLARIFIED,
    STAGE_ORGANIZED,
    STAGE_APPROVED,
    STAGE_REJECTED,
    STAGE_OVERRIDDEN,
    STAGE_ALLOCATED,
];

/// Workflow stage of an uploaded image, as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStage {
    Captured,
    Clarified,
    Organized,
    Approved,
    Rejected,
    Overridden,
    Allocated,
}

impl ImageStage {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageStage::Captured => STAGE_CAPTURED,
            ImageStage::Clarified => STAGE_CLARIFIED,
            ImageStage::Organized => STAGE_ORGANIZED,
            ImageStage::Approved => STAGE_APPROVED,
            ImageStage::Rejected => STAGE_REJECTED,
            ImageStage::Overridden => STAGE_OVERRIDDEN,
            ImageStage::Allocated => STAGE_ALLOCATED,
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            STAGE_CAPTURED => Ok(ImageStage::Captured),
            STAGE_CLARIFIED => Ok(ImageStage::Clarified),
            STAGE_ORGANIZED => Ok(ImageStage::Organized),
            STAGE_APPROVED => Ok(ImageStage::Approved),
            STAGE_REJECTED => Ok(ImageStage::Rejected),
            STAGE_OVERRIDDEN => Ok(ImageStage::Overridden),
            STAGE_ALLOCATED => Ok(ImageStage::Allocated),
            other => Err(CoreError::Validation(format!(
                "Invalid stage '{other}'. Must be one of: {}",
                VALID_STAGES.join(", ")
            ))),
        }
    }

    /// Position in the workflow's total order. The three decision stages share a rank.
    pub fn rank(self) -> u8 {
        match self {
            ImageStage::Captured => 0,
            ImageStage::Clarified => 1,
            ImageStage::Organized => 2,
            ImageStage::Approved | ImageStage::Rejected | ImageStage::Overridden => 3,
            ImageStage::Allocated => 4,
        }
    }

    /// Whether `self -> next` is an edge of the workflow graph.
    pub fn can_transition_to(self, next: ImageStage) -> bool {
        use ImageStage::*;
        matches!(
            (self, next),
            (Captured, Clarified)
                | (Clarified, Organized)
                | (Clarified, Captured)
                | (Organized, Approved)
                | (Organized, Rejected)
                | (Organized, Overridden)
                | (Approved, Allocated)
                | (Overridden, Allocated)
        )
    }

    /// Stage an image takes once its result carries `decision`.
    pub fn for_decision(decision: ReviewDecision) -> ImageStage {
        match decision {
            ReviewDecision::Pending => ImageStage::Organized,
            ReviewDecision::Approved => ImageStage::Approved,
            ReviewDecision::Rejected => ImageStage::Rejected,
            ReviewDecision::Overridden => ImageStage::Overridden,
        }
    }
}

impl std::fmt::Display for ImageStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/* --------------------------------------------------------------------------
Action context
-------------------------------------------------------------------------- */

/// The user performing a workflow action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: DbId,
    pub role: String,
}

/// Explicit per-request context: who acts, and the time the action is stamped with.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub actor: Actor,
    pub at: Timestamp,
}

impl ActionContext {
    pub fn new(actor: Actor, at: Timestamp) -> Self {
        Self { actor, at }
    }

    /// Context stamped with the current wall-clock time.
    pub fn now(actor: Actor) -> Self {
        Self::new(actor, chrono::Utc::now())
    }
}

/// Who made a review decision, when, and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewStamp {
    pub reviewer_id: DbId,
    pub reviewed_at: Timestamp,
    pub notes: Option<String>,
}

impl ReviewStamp {
    fn from_context(ctx: &ActionContext, notes: Option<&str>) -> Result<Self, CoreError> {
        Ok(Self {
            reviewer_id: ctx.actor.user_id,
            reviewed_at: ctx.at,
            notes: normalize_notes(notes)?,
        })
    }
}

/* --------------------------------------------------------------------------
Stage payloads and transitions
-------------------------------------------------------------------------- */

/// Stored, not yet processed. `error_note` is set after a failed detection.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedImage {
    pub image_id: DbId,
    pub error_note: Option<String>,
}

impl CapturedImage {
    /// "Process now": claim the image for detection.
    pub fn begin_processing(self) -> ClarifiedImage {
        ClarifiedImage {
            image_id: self.image_id,
        }
    }
}

/// Detection is running.
#[derive(Debug, Clone, PartialEq)]
pub struct ClarifiedImage {
    pub image_id: DbId,
}

impl ClarifiedImage {
    /// Detection finished; `kept` must already be confidence-filtered.
    pub fn organize(self, kept: Vec<Detection>) -> OrganizedImage {
        OrganizedImage {
            image_id: self.image_id,
            detections: kept.into(),
        }
    }

    /// Detection failed; the image returns to captured with the error attached.
    pub fn fail(self, error_note: impl Into<String>) -> CapturedImage {
        CapturedImage {
            image_id: self.image_id,
            error_note: Some(error_note.into()),
        }
    }
}

/// Detection output waiting to be persisted as a pending result.
#[derive(Debug, Clone, PartialEq)]
pub struct OrganizedImage {
    pub image_id: DbId,
    pub detections: Arc<[Detection]>,
}

/// A persisted result awaiting a reviewer decision.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingReview {
    pub result_id: DbId,
    pub image_id: DbId,
    pub detections: Arc<[Detection]>,
    pub deferred_at: Option<Timestamp>,
}

impl PendingReview {
    pub fn summary(&self) -> DetectionSummary {
        summarize(&self.detections)
    }

    pub fn approve(self, ctx: &ActionContext, notes: Option<&str>) -> Result<ApprovedResult, CoreError> {
        Ok(ApprovedResult {
            result_id: self.result_id,
            image_id: self.image_id,
            detections: self.detections,
            review: ReviewStamp::from_context(ctx, notes)?,
        })
    }

    pub fn reject(self, ctx: &ActionContext, notes: Option<&str>) -> Result<RejectedResult, CoreError> {
        Ok(RejectedResult {
            result_id: self.result_id,
            image_id: self.image_id,
            detections: self.detections,
            review: ReviewStamp::from_context(ctx, notes)?,
        })
    }

    /// Replace the detected species and/or count. The detection list is kept as-is.
    pub fn override_with(
        self,
        ctx: &ActionContext,
        input: &OverrideInput,
    ) -> Result<OverriddenResult, CoreError> {
        let resolved = input.resolve(&self.summary())?;
        Ok(OverriddenResult {
            result_id: self.result_id,
            image_id: self.image_id,
            detections: self.detections,
            review: ReviewStamp {
                reviewer_id: ctx.actor.user_id,
                reviewed_at: ctx.at,
                notes: None,
            },
            replacement: resolved,
        })
    }

    /// "Review later". The decision stays pending; only the marker changes.
    pub fn defer(self, ctx: &ActionContext) -> PendingReview {
        PendingReview {
            deferred_at: Some(ctx.at),
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApprovedResult {
    pub result_id: DbId,
    pub image_id: DbId,
    pub detections: Arc<[Detection]>,
    pub review: ReviewStamp,
}

/// Terminal. Kept for audit, never allocated.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedResult {
    pub result_id: DbId,
    pub image_id: DbId,
    pub detections: Arc<[Detection]>,
    pub review: ReviewStamp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverriddenResult {
    pub result_id: DbId,
    pub image_id: DbId,
    /// Original detections, untouched by the override.
    pub detections: Arc<[Detection]>,
    pub review: ReviewStamp,
    pub replacement: ResolvedOverride,
}

/// Terminal. Linked to a census observation.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocatedResult {
    pub result_id: DbId,
    pub image_id: DbId,
    pub decision: ReviewDecision,
    pub observation_id: DbId,
    pub allocated_by: DbId,
    pub allocated_at: Timestamp,
}

/// Results that may be attached to a census observation.
pub trait Allocatable: std::fmt::Debug {
    fn result_id(&self) -> DbId;
    fn image_id(&self) -> DbId;
    fn decision(&self) -> ReviewDecision;
    /// Species and count the census should record for this result.
    fn census_entry(&self) -> (Option<String>, i64);

    fn allocate(&self, observation_id: DbId, ctx: &ActionContext) -> AllocatedResult {
        AllocatedResult {
            result_id: self.result_id(),
            image_id: self.image_id(),
            decision: self.decision(),
            observation_id,
            allocated_by: ctx.actor.user_id,
            allocated_at: ctx.at,
        }
    }
}

impl Allocatable for ApprovedResult {
    fn result_id(&self) -> DbId {
        self.result_id
    }
    fn image_id(&self) -> DbId {
        self.image_id
    }
    fn decision(&self) -> ReviewDecision {
        ReviewDecision::Approved
    }
    fn census_entry(&self) -> (Option<String>, i64) {
        let summary = summarize(&self.detections);
        (summary.primary_species, summary.total_count)
    }
}

impl Allocatable for OverriddenResult {
    fn result_id(&self) -> DbId {
        self.result_id
    }
    fn image_id(&self) -> DbId {
        self.image_id
    }
    fn decision(&self) -> ReviewDecision {
        ReviewDecision::Overridden
    }
    fn census_entry(&self) -> (Option<String>, i64) {
        (Some(self.replacement.species.clone()), self.replacement.count)
    }
}

/* --------------------------------------------------------------------------
Typed state
-------------------------------------------------------------------------- */

/// Typed workflow state of one image and its detection result.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowState {
    Captured(CapturedImage),
    Clarified(ClarifiedImage),
    Organized(PendingReview),
    Approved(ApprovedResult),
    Rejected(RejectedResult),
    Overridden(OverriddenResult),
    Allocated(AllocatedResult),
}

/// Plain persisted data a [`WorkflowState`] is restored from.
#[derive(Debug, Clone)]
pub struct WorkflowSnapshot {
    pub image_id: DbId,
    pub stage: ImageStage,
    pub error_note: Option<String>,
    pub result: Option<ResultSnapshot>,
    pub replacement: Option<ResolvedOverride>,
    pub allocation: Option<AllocationSnapshot>,
}

#[derive(Debug, Clone)]
pub struct ResultSnapshot {
    pub result_id: DbId,
    pub decision: ReviewDecision,
    pub detections: Vec<Detection>,
    pub reviewer_id: Option<DbId>,
    pub reviewed_at: Option<Timestamp>,
    pub notes: Option<String>,
    pub deferred_at: Option<Timestamp>,
}

#[derive(Debug, Clone)]
pub struct AllocationSnapshot {
    pub observation_id: DbId,
    pub allocated_by: DbId,
    pub allocated_at: Timestamp,
}

impl WorkflowState {
    pub fn stage(&self) -> ImageStage {
        match self {
            WorkflowState::Captured(_) => ImageStage::Captured,
            WorkflowState::Clarified(_) => ImageStage::Clarified,
            WorkflowState::Organized(_) => ImageStage::Organized,
            WorkflowState::Approved(_) => ImageStage::Approved,
            WorkflowState::Rejected(_) => ImageStage::Rejected,
            WorkflowState::Overridden(_) => ImageStage::Overridden,
            WorkflowState::Allocated(_) => ImageStage::Allocated,
        }
    }

    /// Rebuild the typed state from stored rows, checking that they agree.
    pub fn restore(snapshot: WorkflowSnapshot) -> Result<Self, CoreError> {
        let image_id = snapshot.image_id;
        let inconsistent = |what: &str| {
            CoreError::Internal(format!(
                "Image {image_id} in stage '{}' is inconsistent: {what}",
                snapshot.stage
            ))
        };

        match snapshot.stage {
            ImageStage::Captured => Ok(WorkflowState::Captured(CapturedImage {
                image_id,
                error_note: snapshot.error_note,
            })),
            ImageStage::Clarified => Ok(WorkflowState::Clarified(ClarifiedImage { image_id })),
            stage => {
                let result = snapshot
                    .result
                    .ok_or_else(|| inconsistent("no detection result"))?;
                let expected = match stage {
                    ImageStage::Allocated => None,
                    other => Some(other),
                };
                if let Some(expected) = expected {
                    if ImageStage::for_decision(result.decision) != expected {
                        return Err(inconsistent("decision does not match stage"));
                    }
                }

                let detections: Arc<[Detection]> = result.detections.into();
                if result.decision == ReviewDecision::Pending {
                    return Ok(WorkflowState::Organized(PendingReview {
                        result_id: result.result_id,
                        image_id,
                        detections,
                        deferred_at: result.deferred_at,
                    }));
                }

                let review = ReviewStamp {
                    reviewer_id: result
                        .reviewer_id
                        .ok_or_else(|| inconsistent("decided result without reviewer"))?,
                    reviewed_at: result
                        .reviewed_at
                        .ok_or_else(|| inconsistent("decided result without timestamp"))?,
                    notes: result.notes,
                };

                if stage == ImageStage::Allocated {
                    if !result.decision.is_allocatable() {
                        return Err(inconsistent("allocated result was never approved"));
                    }
                    let allocation = snapshot
                        .allocation
                        .ok_or_else(|| inconsistent("no allocation record"))?;
                    return Ok(WorkflowState::Allocated(AllocatedResult {
                        result_id: result.result_id,
                        image_id,
                        decision: result.decision,
                        observation_id: allocation.observation_id,
                        allocated_by: allocation.allocated_by,
                        allocated_at: allocation.allocated_at,
                    }));
                }

                Ok(match result.decision {
                    ReviewDecision::Approved => WorkflowState::Approved(ApprovedResult {
                        result_id: result.result_id,
                        image_id,
                        detections,
                        review,
                    }),
                    ReviewDecision::Rejected => WorkflowState::Rejected(RejectedResult {
                        result_id: result.result_id,
                        image_id,
                        detections,
                        review,
                    }),
                    ReviewDecision::Overridden => WorkflowState::Overridden(OverriddenResult {
                        result_id: result.result_id,
                        image_id,
                        detections,
                        review,
                        replacement: snapshot
                            .replacement
                            .ok_or_else(|| inconsistent("overridden result without override"))?,
                    }),
                    ReviewDecision::Pending => return Err(inconsistent("pending result")),
                })
            }
        }
    }

    pub fn into_captured(self) -> Result<CapturedImage, CoreError> {
        match self {
            WorkflowState::Captured(image) => Ok(image),
            other => Err(precondition(&other, "processed", "it has already been processed")),
        }
    }

    pub fn into_pending_review(self) -> Result<PendingReview, CoreError> {
        match self {
            WorkflowState::Organized(pending) => Ok(pending),
            other @ (WorkflowState::Captured(_) | WorkflowState::Clarified(_)) => Err(
                precondition(&other, "reviewed", "detection has not completed"),
            ),
            other => Err(precondition(&other, "reviewed", "it has already been decided")),
        }
    }

    pub fn into_allocatable(self) -> Result<Box<dyn Allocatable + Send + Sync>, CoreError> {
        match self {
            WorkflowState::Approved(result) => Ok(Box::new(result)),
            WorkflowState::Overridden(result) => Ok(Box::new(result)),
            other @ WorkflowState::Allocated(_) => Err(precondition(
                &other,
                "allocated",
                "it is already allocated",
            )),
            other @ WorkflowState::Rejected(_) => {
                Err(precondition(&other, "allocated", "it was rejected"))
            }
            other => Err(precondition(&other, "allocated", "it has not been approved")),
        }
    }
}

fn precondition(state: &WorkflowState, action: &str, why: &str) -> CoreError {
    CoreError::PreconditionViolation(format!(
        "Image in stage '{}' cannot be {action}: {why}",
        state.stage()
    ))
}

/* --------------------------------------------------------------------------
Tests
-------------------------------------------------------------------------- */

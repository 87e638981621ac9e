//! Workflow actions over stored images and detection results.
//!
//! Every action loads the persisted rows, restores the typed
//! [`WorkflowState`], asks it whether the action is allowed, and then writes
//! with conditional updates. A conditional update that touches no row means
//! a concurrent request won; the action then fails with
//! `PreconditionViolation` and its transaction is rolled back.

use std::sync::Arc;
use std::time::Duration;

use avicast_core::detection::{filter_detections, Detection, DetectionSummary};
use avicast_core::error::CoreError;
use avicast_core::review::{OverrideInput, ReviewDecision};
use avicast_core::roles;
use avicast_core::types::DbId;
use avicast_core::workflow::{
    ActionContext, AllocationSnapshot, ClarifiedImage, ImageStage, ResultSnapshot,
    WorkflowSnapshot, WorkflowState,
};
use avicast_db::models::census::{CensusAllocation, CensusObservation, CreateCensusAllocation};
use avicast_db::models::detection::{
    AllocationCandidate, CreateDetectionOverride, CreateDetectionResult, DetectionOverride,
    DetectionResult, RecordDecision, ReviewQueueItem,
};
use avicast_db::models::image::{CreateUploadedImage, ImageListFilter, UploadedImage};
use avicast_db::repositories::{
    CensusAllocationRepo, CensusObservationRepo, DetectionOverrideRepo, DetectionResultRepo,
    ImageRepo,
};
use avicast_db::DbPool;
use avicast_detection::{Detector, DetectorOutput};
use serde::Serialize;
use validator::Validate;

use crate::storage::ImageStore;
use crate::PipelineResult;

/// Default upper bound on a single detector call.
pub const DEFAULT_DETECTION_TIMEOUT: Duration = Duration::from_secs(60);

/// A file received from a field worker.
#[derive(Debug)]
pub struct NewUpload {
    pub bytes: Vec<u8>,
    pub original_filename: String,
    pub site_hint: Option<String>,
}

/// Result of a successful `process` call.
#[derive(Debug, Serialize)]
pub struct ProcessOutcome {
    pub image: UploadedImage,
    pub result: DetectionResult,
    /// Raw detections dropped by the confidence filter.
    pub discarded: usize,
}

/// Result of a review action.
#[derive(Debug, Serialize)]
pub struct ReviewOutcome {
    pub result: DetectionResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#override: Option<DetectionOverride>,
}

/// An image with everything recorded about it.
#[derive(Debug, Serialize)]
pub struct ImageDetail {
    pub image: UploadedImage,
    pub result: Option<DetectionResult>,
    pub summary: Option<DetectionSummary>,
    pub r#override: Option<DetectionOverride>,
    pub allocation: Option<CensusAllocation>,
}

/// The review workflow service.
#[derive(Clone)]
pub struct ReviewWorkflow {
    pool: DbPool,
    detector: Arc<dyn Detector>,
    store: ImageStore,
    confidence_threshold: f64,
    detection_timeout: Duration,
}

impl ReviewWorkflow {
    pub fn new(
        pool: DbPool,
        detector: Arc<dyn Detector>,
        store: ImageStore,
        confidence_threshold: f64,
    ) -> Self {
        Self {
            pool,
            detector,
            store,
            confidence_threshold,
            detection_timeout: DEFAULT_DETECTION_TIMEOUT,
        }
    }

    /// Upper bound on a single detector call, including retries inside the adapter.
    pub fn with_detection_timeout(mut self, timeout: Duration) -> Self {
        self.detection_timeout = timeout;
        self
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    /* ----------------------------------------------------------------------
    Capture
    ---------------------------------------------------------------------- */

    /// Store an uploaded file and create its record in `captured`.
    pub async fn upload(
        &self,
        ctx: &ActionContext,
        upload: NewUpload,
    ) -> PipelineResult<UploadedImage> {
        let original_filename = upload.original_filename.trim();
        if original_filename.is_empty() {
            return Err(CoreError::Validation("File name must not be empty".into()).into());
        }
        let site_hint = upload
            .site_hint
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let stored = self.store.save(&upload.bytes).await?;

        let input = CreateUploadedImage {
            file_path: stored.path.clone(),
            original_filename: original_filename.to_string(),
            content_type: stored.content_type,
            file_size_bytes: stored.size_bytes,
            width: stored.width,
            height: stored.height,
            uploaded_by: ctx.actor.user_id,
            site_hint,
        };

        let image = match ImageRepo::create(&self.pool, &input, ctx.at).await {
            Ok(image) => image,
            Err(e) => {
                self.store.remove(&stored.path).await;
                return Err(e.into());
            }
        };

        tracing::info!(
            image_id = image.id,
            user_id = ctx.actor.user_id,
            size_bytes = image.file_size_bytes,
            "Image uploaded",
        );
        Ok(image)
    }

    /// Run detection on a `captured` image.
    ///
    /// The image is claimed with a conditional `captured -> clarified`
    /// update before the detector is called, so concurrent requests cannot
    /// both run it. A detector failure puts the image back in `captured`
    /// with an error note and surfaces `DetectionUnavailable`.
    ///
    /// Everything after the claim runs on its own task. Dropping the caller
    /// (client disconnect, request timeout) does not cancel it, so the image
    /// always ends in `organized` or back in `captured`.
    pub async fn process(&self, ctx: &ActionContext, image_id: DbId) -> PipelineResult<ProcessOutcome> {
        let image = self.visible_image(ctx, image_id).await?;
        let captured = self.load_state(&image).await?.into_captured()?;

        let clarified = captured.begin_processing();
        let claimed = ImageRepo::transition(
            &self.pool,
            image_id,
            ImageStage::Captured,
            ImageStage::Clarified,
            ctx.at,
        )
        .await?;
        if !claimed {
            return Err(CoreError::PreconditionViolation(format!(
                "Image {image_id} is already being processed"
            ))
            .into());
        }

        let this = self.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move { this.run_detection(&ctx, clarified, &image.file_path).await })
            .await
            .map_err(|e| {
                CoreError::Internal(format!("Detection task for image {image_id} failed: {e}"))
            })?
    }

    /// Detect, filter and persist for a claimed image.
    async fn run_detection(
        &self,
        ctx: &ActionContext,
        clarified: ClarifiedImage,
        file_path: &str,
    ) -> PipelineResult<ProcessOutcome> {
        let image_id = clarified.image_id;
        let output = match self.store.read(file_path).await {
            Ok(bytes) => self.detect_bounded(&bytes).await,
            Err(e) => Err(CoreError::DetectionUnavailable(format!(
                "Stored image could not be read: {e}"
            ))),
        };

        let output = match output {
            Ok(output) => output,
            Err(err) => {
                let note = err.to_string();
                let returned = clarified.fail(note.clone());
                self.release_claim(returned.image_id, &note, ctx).await?;
                tracing::warn!(image_id, error = %note, "Detection failed, image returned to captured");
                return Err(err.into());
            }
        };

        let raw_count = output.detections.len();
        let organized = clarified.organize(filter_detections(
            output.detections,
            self.confidence_threshold,
        ));
        let discarded = raw_count - organized.detections.len();

        let stored = self
            .store_result(image_id, &organized.detections, output.model_name, ctx)
            .await;
        let result = match stored {
            Ok(result) => result,
            Err(err) => {
                self.release_claim(image_id, &err.to_string(), ctx).await?;
                return Err(err);
            }
        };

        let image = self.require_image(image_id).await?;
        tracing::info!(
            image_id,
            result_id = result.id,
            kept = result.detections.len(),
            discarded,
            "Detection result stored",
        );
        Ok(ProcessOutcome {
            image,
            result,
            discarded,
        })
    }

    /// Put a claimed image back in `captured` with `note` attached.
    async fn release_claim(
        &self,
        image_id: DbId,
        note: &str,
        ctx: &ActionContext,
    ) -> PipelineResult<()> {
        if let Err(e) = ImageRepo::fail_processing(&self.pool, image_id, note, ctx.at).await {
            tracing::error!(image_id, error = %e, "Failed to return image to captured");
            return Err(e.into());
        }
        Ok(())
    }

    /// Call the detector, treating a call that outlives the timeout as unavailable.
    async fn detect_bounded(&self, bytes: &[u8]) -> Result<DetectorOutput, CoreError> {
        match tokio::time::timeout(self.detection_timeout, self.detector.detect(bytes)).await {
            Ok(output) => output.map_err(CoreError::from),
            Err(_) => Err(CoreError::DetectionUnavailable(format!(
                "Detector did not answer within {}s",
                self.detection_timeout.as_secs_f64()
            ))),
        }
    }

    /// "Process later": stamp the deferred marker. The stage does not change.
    pub async fn process_later(
        &self,
        ctx: &ActionContext,
        image_id: DbId,
    ) -> PipelineResult<UploadedImage> {
        let image = self.visible_image(ctx, image_id).await?;
        self.load_state(&image).await?.into_captured()?;

        if !ImageRepo::mark_process_deferred(&self.pool, image_id, ctx.at).await? {
            return Err(CoreError::PreconditionViolation(format!(
                "Image {image_id} is no longer waiting to be processed"
            ))
            .into());
        }

        tracing::info!(image_id, user_id = ctx.actor.user_id, "Processing deferred");
        Ok(self.require_image(image_id).await?)
    }

    /* ----------------------------------------------------------------------
    Review
    ---------------------------------------------------------------------- */

    /// Accept the detected species and count as-is.
    pub async fn approve(
        &self,
        ctx: &ActionContext,
        result_id: DbId,
        notes: Option<&str>,
    ) -> PipelineResult<ReviewOutcome> {
        let (_, state) = self.load_by_result(result_id).await?;
        let approved = state.into_pending_review()?.approve(ctx, notes)?;

        let decision = RecordDecision {
            decision: ReviewDecision::Approved,
            reviewed_by: approved.review.reviewer_id,
            reviewed_at: approved.review.reviewed_at,
            review_notes: approved.review.notes.clone(),
        };
        let mut tx = self.pool.begin().await?;
        Self::write_decision(&mut tx, result_id, approved.image_id, &decision).await?;
        tx.commit().await?;

        self.review_outcome(ctx, result_id, ReviewDecision::Approved).await
    }

    /// Reject the result. Terminal; the record is kept for audit.
    pub async fn reject(
        &self,
        ctx: &ActionContext,
        result_id: DbId,
        notes: Option<&str>,
    ) -> PipelineResult<ReviewOutcome> {
        let (_, state) = self.load_by_result(result_id).await?;
        let rejected = state.into_pending_review()?.reject(ctx, notes)?;

        let decision = RecordDecision {
            decision: ReviewDecision::Rejected,
            reviewed_by: rejected.review.reviewer_id,
            reviewed_at: rejected.review.reviewed_at,
            review_notes: rejected.review.notes.clone(),
        };
        let mut tx = self.pool.begin().await?;
        Self::write_decision(&mut tx, result_id, rejected.image_id, &decision).await?;
        tx.commit().await?;

        self.review_outcome(ctx, result_id, ReviewDecision::Rejected).await
    }

    /// Replace species and/or count. The original detections stay untouched
    /// and the replacement lives in its own override record.
    pub async fn override_result(
        &self,
        ctx: &ActionContext,
        result_id: DbId,
        input: &OverrideInput,
    ) -> PipelineResult<ReviewOutcome> {
        input.validate().map_err(CoreError::from)?;

        let (_, state) = self.load_by_result(result_id).await?;
        let overridden = state.into_pending_review()?.override_with(ctx, input)?;

        let decision = RecordDecision {
            decision: ReviewDecision::Overridden,
            reviewed_by: overridden.review.reviewer_id,
            reviewed_at: overridden.review.reviewed_at,
            review_notes: overridden.replacement.reason.clone(),
        };
        let mut tx = self.pool.begin().await?;
        Self::write_decision(&mut tx, result_id, overridden.image_id, &decision).await?;
        DetectionOverrideRepo::create(
            &mut *tx,
            &CreateDetectionOverride {
                detection_result_id: result_id,
                species: overridden.replacement.species.clone(),
                count: overridden.replacement.count,
                reason: overridden.replacement.reason.clone(),
                overridden_by: ctx.actor.user_id,
            },
            ctx.at,
        )
        .await?;
        tx.commit().await?;

        self.review_outcome(ctx, result_id, ReviewDecision::Overridden).await
    }

    /// "Review later": stamp the deferred marker. The decision stays pending.
    pub async fn defer_review(
        &self,
        ctx: &ActionContext,
        result_id: DbId,
    ) -> PipelineResult<DetectionResult> {
        let (_, state) = self.load_by_result(result_id).await?;
        let deferred = state.into_pending_review()?.defer(ctx);

        let marked =
            DetectionResultRepo::mark_review_deferred(&self.pool, result_id, ctx.at).await?;
        if !marked {
            return Err(decided_elsewhere(result_id).into());
        }

        tracing::info!(
            result_id,
            image_id = deferred.image_id,
            user_id = ctx.actor.user_id,
            "Review deferred",
        );
        Ok(self.require_result(result_id).await?)
    }

    /* ----------------------------------------------------------------------
    Allocation
    ---------------------------------------------------------------------- */

    /// Attach an approved or overridden result to a census observation.
    pub async fn allocate(
        &self,
        ctx: &ActionContext,
        result_id: DbId,
        observation_id: DbId,
    ) -> PipelineResult<CensusAllocation> {
        let (_, state) = self.load_by_result(result_id).await?;
        let candidate = state.into_allocatable()?;

        self.get_observation(observation_id).await?;

        let allocated = candidate.allocate(observation_id, ctx);
        let (species, count) = candidate.census_entry();
        let from = ImageStage::for_decision(allocated.decision);

        let mut tx = self.pool.begin().await?;
        let moved = ImageRepo::transition(
            &mut *tx,
            allocated.image_id,
            from,
            ImageStage::Allocated,
            ctx.at,
        )
        .await?;
        if !moved {
            return Err(CoreError::PreconditionViolation(format!(
                "Result {result_id} cannot be allocated: it is already allocated"
            ))
            .into());
        }
        let allocation = CensusAllocationRepo::create(
            &mut *tx,
            &CreateCensusAllocation {
                detection_result_id: allocated.result_id,
                observation_id: allocated.observation_id,
                species,
                count,
                allocated_by: allocated.allocated_by,
                allocated_at: allocated.allocated_at,
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            result_id,
            image_id = allocated.image_id,
            observation_id,
            decision = %allocated.decision,
            user_id = ctx.actor.user_id,
            "Result allocated to census observation",
        );
        Ok(allocation)
    }

    /* ----------------------------------------------------------------------
    Reads
    ---------------------------------------------------------------------- */

    /// Images visible to the caller. Field workers only see their own uploads.
    pub async fn list_images(
        &self,
        ctx: &ActionContext,
        mut filter: ImageListFilter,
    ) -> PipelineResult<Vec<UploadedImage>> {
        if !roles::sees_all_images(&ctx.actor.role) {
            filter.uploaded_by = Some(ctx.actor.user_id);
        }
        Ok(ImageRepo::list(&self.pool, &filter).await?)
    }

    /// One image with its result, override and allocation.
    pub async fn image_detail(&self, ctx: &ActionContext, image_id: DbId) -> PipelineResult<ImageDetail> {
        let image = self.visible_image(ctx, image_id).await?;
        let result = DetectionResultRepo::find_by_image(&self.pool, image_id).await?;

        let (r#override, allocation) = match &result {
            Some(result) => (
                DetectionOverrideRepo::find_by_result(&self.pool, result.id).await?,
                CensusAllocationRepo::find_by_result(&self.pool, result.id).await?,
            ),
            None => (None, None),
        };

        Ok(ImageDetail {
            summary: result.as_ref().map(DetectionResult::summary),
            image,
            result,
            r#override,
            allocation,
        })
    }

    /// Pending results, oldest first. Deferred results sort last.
    pub async fn review_queue(
        &self,
        include_deferred: bool,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> PipelineResult<Vec<ReviewQueueItem>> {
        Ok(DetectionResultRepo::review_queue(&self.pool, include_deferred, limit, offset).await?)
    }

    /// Approved or overridden results that are not yet allocated.
    pub async fn allocation_candidates(
        &self,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> PipelineResult<Vec<AllocationCandidate>> {
        Ok(DetectionResultRepo::allocation_candidates(&self.pool, limit, offset).await?)
    }

    pub async fn get_observation(&self, observation_id: DbId) -> PipelineResult<CensusObservation> {
        CensusObservationRepo::find_by_id(&self.pool, observation_id)
            .await?
            .ok_or_else(|| {
                CoreError::NotFound {
                    entity: "CensusObservation",
                    id: observation_id,
                }
                .into()
            })
    }

    /* ----------------------------------------------------------------------
    Helpers
    ---------------------------------------------------------------------- */

    /// Insert the pending result and move the image to `organized` in one transaction.
    async fn store_result(
        &self,
        image_id: DbId,
        detections: &[Detection],
        model_name: Option<String>,
        ctx: &ActionContext,
    ) -> PipelineResult<DetectionResult> {
        let mut tx = self.pool.begin().await?;
        let result = DetectionResultRepo::create(
            &mut *tx,
            &CreateDetectionResult {
                image_id,
                detections: detections.to_vec(),
                model_name,
            },
            ctx.at,
        )
        .await?;
        let moved = ImageRepo::transition(
            &mut *tx,
            image_id,
            ImageStage::Clarified,
            ImageStage::Organized,
            ctx.at,
        )
        .await?;
        if !moved {
            return Err(CoreError::PreconditionViolation(format!(
                "Image {image_id} left the clarified stage during detection"
            ))
            .into());
        }
        tx.commit().await?;
        Ok(result)
    }

    /// Conditionally record a decision and move the image to the matching stage.
    async fn write_decision(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        result_id: DbId,
        image_id: DbId,
        decision: &RecordDecision,
    ) -> PipelineResult<()> {
        if !DetectionResultRepo::record_decision(&mut **tx, result_id, decision).await? {
            return Err(decided_elsewhere(result_id).into());
        }
        let moved = ImageRepo::transition(
            &mut **tx,
            image_id,
            ImageStage::Organized,
            ImageStage::for_decision(decision.decision),
            decision.reviewed_at,
        )
        .await?;
        if !moved {
            return Err(decided_elsewhere(result_id).into());
        }
        Ok(())
    }

    async fn review_outcome(
        &self,
        ctx: &ActionContext,
        result_id: DbId,
        decision: ReviewDecision,
    ) -> PipelineResult<ReviewOutcome> {
        let result = self.require_result(result_id).await?;
        let r#override = DetectionOverrideRepo::find_by_result(&self.pool, result_id).await?;

        tracing::info!(
            result_id,
            image_id = result.image_id,
            decision = %decision,
            user_id = ctx.actor.user_id,
            "Review decision recorded",
        );
        Ok(ReviewOutcome { result, r#override })
    }

    /// Load an image, hiding other users' uploads from field workers.
    async fn visible_image(&self, ctx: &ActionContext, image_id: DbId) -> PipelineResult<UploadedImage> {
        let image = self.require_image(image_id).await?;
        if !roles::sees_all_images(&ctx.actor.role) && image.uploaded_by != ctx.actor.user_id {
            return Err(CoreError::NotFound {
                entity: "UploadedImage",
                id: image_id,
            }
            .into());
        }
        Ok(image)
    }

    async fn require_image(&self, image_id: DbId) -> PipelineResult<UploadedImage> {
        ImageRepo::find_by_id(&self.pool, image_id)
            .await?
            .ok_or_else(|| {
                CoreError::NotFound {
                    entity: "UploadedImage",
                    id: image_id,
                }
                .into()
            })
    }

    async fn require_result(&self, result_id: DbId) -> PipelineResult<DetectionResult> {
        DetectionResultRepo::find_by_id(&self.pool, result_id)
            .await?
            .ok_or_else(|| {
                CoreError::NotFound {
                    entity: "DetectionResult",
                    id: result_id,
                }
                .into()
            })
    }

    async fn load_by_result(&self, result_id: DbId) -> PipelineResult<(UploadedImage, WorkflowState)> {
        let result = self.require_result(result_id).await?;
        let image = self.require_image(result.image_id).await?;
        let state = self.load_state(&image).await?;
        Ok((image, state))
    }

    /// Restore the typed state of an image from its rows.
    async fn load_state(&self, image: &UploadedImage) -> PipelineResult<WorkflowState> {
        let result = DetectionResultRepo::find_by_image(&self.pool, image.id).await?;

        let mut replacement = None;
        let mut allocation = None;
        let result = match result {
            Some(row) => {
                replacement = DetectionOverrideRepo::find_by_result(&self.pool, row.id)
                    .await?
                    .map(|o| o.resolved());
                allocation = CensusAllocationRepo::find_by_result(&self.pool, row.id)
                    .await?
                    .map(|a| AllocationSnapshot {
                        observation_id: a.observation_id,
                        allocated_by: a.allocated_by,
                        allocated_at: a.allocated_at,
                    });
                Some(ResultSnapshot {
                    result_id: row.id,
                    decision: row.decision()?,
                    detections: row.detections.0,
                    reviewer_id: row.reviewed_by,
                    reviewed_at: row.reviewed_at,
                    notes: row.review_notes,
                    deferred_at: row.review_deferred_at,
                })
            }
            None => None,
        };

        Ok(WorkflowState::restore(WorkflowSnapshot {
            image_id: image.id,
            stage: image.stage()?,
            error_note: image.error_note.clone(),
            result,
            replacement,
            allocation,
        })?)
    }
}

fn decided_elsewhere(result_id: DbId) -> CoreError {
    CoreError::PreconditionViolation(format!(
        "Result {result_id} was decided by another request"
    ))
}

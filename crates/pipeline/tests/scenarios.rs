//! End-to-end workflow scenarios against SQLite, in memory unless a test
//! needs real concurrent connections.

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use avicast_core::error::CoreError;
use avicast_core::review::OverrideInput;
use avicast_core::workflow::ImageStage;
use avicast_db::models::image::ImageListFilter;
use avicast_detection::ScriptedDetector;
use avicast_pipeline::PipelineError;
use common::*;
use tokio::task::JoinSet;

fn precondition<T: std::fmt::Debug>(result: Result<T, PipelineError>) -> String {
    match result {
        Err(PipelineError::Core(CoreError::PreconditionViolation(msg))) => msg,
        other => panic!("expected PreconditionViolation, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Capture and detection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn low_confidence_detections_are_dropped_then_approved_and_allocated_once() {
    let h = harness(ScriptedDetector::always(output(vec![egret(0.83), egret(0.60)]))).await;
    let image = upload(&h, &field_worker(0), "IMG_0001.png").await;
    assert_eq!(image.stage, "captured");
    assert_eq!(image.width, Some(16));

    let processed = h.workflow.process(&field_worker(1), image.id).await.unwrap();
    assert_eq!(processed.image.stage, "organized");
    assert_eq!(processed.discarded, 1);
    assert_eq!(processed.result.detections.len(), 1);
    assert_eq!(processed.result.detections[0].confidence, 0.83);
    assert_eq!(processed.result.decision, "pending");

    let result_id = processed.result.id;
    let approved = h
        .workflow
        .approve(&reviewer(2), result_id, Some("one adult"))
        .await
        .unwrap();
    assert_eq!(approved.result.decision, "approved");
    assert_eq!(approved.result.reviewed_by, Some(REVIEWER_ID));
    assert_eq!(approved.result.review_notes.as_deref(), Some("one adult"));
    assert!(approved.r#override.is_none());

    let x = observation(&h.pool, "Lake Lanao").await;
    let y = observation(&h.pool, "Agusan Marsh").await;

    let allocation = h.workflow.allocate(&reviewer(3), result_id, x.id).await.unwrap();
    assert_eq!(allocation.observation_id, x.id);
    assert_eq!(allocation.species.as_deref(), Some("great egret"));
    assert_eq!(allocation.count, 1);

    let again = precondition(h.workflow.allocate(&reviewer(4), result_id, x.id).await);
    assert!(again.contains("already allocated"), "{again}");
    precondition(h.workflow.allocate(&reviewer(4), result_id, y.id).await);

    let detail = h.workflow.image_detail(&admin(5), image.id).await.unwrap();
    assert_eq!(detail.image.stage, "allocated");
    assert_eq!(detail.result.unwrap().decision, "approved");
    assert_eq!(detail.allocation.unwrap().observation_id, x.id);
    assert_eq!(h.detector.calls(), 1);
}

#[tokio::test]
async fn failed_detection_leaves_image_retryable() {
    let detector = ScriptedDetector::new(
        vec![Err("inference service timed out".to_string())],
        Ok(output(vec![egret(0.91)])),
    );
    let h = harness(detector).await;
    let image = upload(&h, &field_worker(0), "IMG_0002.png").await;

    assert_matches!(
        h.workflow.process(&field_worker(1), image.id).await,
        Err(PipelineError::Core(CoreError::DetectionUnavailable(msg))) if msg.contains("timed out")
    );

    let detail = h.workflow.image_detail(&field_worker(2), image.id).await.unwrap();
    assert_eq!(detail.image.stage, "captured");
    assert!(detail.image.error_note.unwrap().contains("timed out"));
    assert!(detail.result.is_none());

    let processed = h.workflow.process(&field_worker(3), image.id).await.unwrap();
    assert_eq!(processed.image.stage, "organized");
    assert!(processed.image.error_note.is_none());
    assert_eq!(h.detector.calls(), 2);
}

#[tokio::test]
async fn abandoned_process_call_still_returns_image_to_captured() {
    let h = harness(ScriptedDetector::always(output(vec![egret(0.88)])).stalling(1)).await;
    let workflow = h
        .workflow
        .clone()
        .with_detection_timeout(Duration::from_millis(200));
    let image = upload(&h, &field_worker(0), "IMG_0003.png").await;

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        workflow.process(&field_worker(1), image.id),
    )
    .await;
    assert!(abandoned.is_err(), "caller gives up before the detector answers");

    let image = wait_for_stage(&h.pool, image.id, "captured").await;
    assert!(image.error_note.as_deref().unwrap().contains("did not answer"));

    let processed = workflow.process(&field_worker(2), image.id).await.unwrap();
    assert_eq!(processed.image.stage, "organized");
    assert_eq!(processed.result.detections.len(), 1);
    assert_eq!(h.detector.calls(), 2);
}

#[tokio::test]
async fn processing_twice_is_a_precondition_violation() {
    let h = harness(ScriptedDetector::always(output(vec![egret(0.9)]))).await;
    let image = upload(&h, &field_worker(0), "a.png").await;

    h.workflow.process(&field_worker(1), image.id).await.unwrap();
    let msg = precondition(h.workflow.process(&field_worker(2), image.id).await);
    assert!(msg.contains("already been processed"), "{msg}");
    assert_eq!(h.detector.calls(), 1);
}

#[tokio::test]
async fn empty_detection_still_produces_a_reviewable_result() {
    let h = harness(ScriptedDetector::always(output(vec![egret(0.4)]))).await;
    let image = upload(&h, &field_worker(0), "empty.png").await;

    let processed = h.workflow.process(&field_worker(1), image.id).await.unwrap();
    assert!(processed.result.detections.is_empty());
    assert_eq!(processed.discarded, 1);

    let queue = h.workflow.review_queue(true, None, None).await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].image_id, image.id);
}

#[tokio::test]
async fn process_later_only_stamps_a_marker() {
    let h = harness(ScriptedDetector::always(output(vec![egret(0.9)]))).await;
    let image = upload(&h, &field_worker(0), "later.png").await;

    let deferred = h.workflow.process_later(&field_worker(1), image.id).await.unwrap();
    assert_eq!(deferred.stage, "captured");
    assert_eq!(deferred.process_deferred_at, Some(at(1)));
    assert_eq!(h.detector.calls(), 0);

    let processed = h.workflow.process(&field_worker(2), image.id).await.unwrap();
    assert_eq!(processed.image.stage, "organized");
    precondition(h.workflow.process_later(&field_worker(3), image.id).await);
}

#[tokio::test]
async fn field_workers_only_see_their_own_uploads() {
    let h = harness(ScriptedDetector::always(output(vec![egret(0.9)]))).await;
    let mine = upload(&h, &field_worker(0), "mine.png").await;
    let theirs = upload(&h, &other_field_worker(0), "theirs.png").await;

    let listed = h
        .workflow
        .list_images(&field_worker(1), ImageListFilter::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, mine.id);

    assert_matches!(
        h.workflow.process(&field_worker(1), theirs.id).await,
        Err(PipelineError::Core(CoreError::NotFound { .. }))
    );

    let all = h
        .workflow
        .list_images(&reviewer(1), ImageListFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let captured_only = h
        .workflow
        .list_images(
            &admin(1),
            ImageListFilter {
                stage: Some(ImageStage::Organized),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(captured_only.is_empty());
}

#[tokio::test]
async fn upload_rejects_non_images() {
    let h = harness(ScriptedDetector::always(output(vec![]))).await;
    let err = h
        .workflow
        .upload(
            &field_worker(0),
            avicast_pipeline::NewUpload {
                bytes: b"%PDF-1.4".to_vec(),
                original_filename: "report.pdf".to_string(),
                site_hint: None,
            },
        )
        .await;
    assert_matches!(err, Err(PipelineError::Core(CoreError::Validation(_))));
}

// ---------------------------------------------------------------------------
// Review
// ---------------------------------------------------------------------------

async fn pending_result(h: &Harness, name: &str) -> i64 {
    let image = upload(h, &field_worker(0), name).await;
    h.workflow
        .process(&field_worker(1), image.id)
        .await
        .expect("processing succeeds")
        .result
        .id
}

#[tokio::test]
async fn concurrent_approvals_have_exactly_one_winner() {
    let h = file_harness(ScriptedDetector::always(output(vec![egret(0.9)]))).await;

    for round in 0..5 {
        let result_id = pending_result(&h, &format!("race-{round}.png")).await;

        let mut approvals = JoinSet::new();
        for reviewer_id in 20..28 {
            let workflow = h.workflow.clone();
            approvals.spawn(async move {
                workflow
                    .approve(&reviewer_as(reviewer_id, 5), result_id, None)
                    .await
            });
        }

        let mut winners = 0;
        while let Some(joined) = approvals.join_next().await {
            match joined.expect("approval task") {
                Ok(outcome) => {
                    assert_eq!(outcome.result.decision, "approved");
                    winners += 1;
                }
                Err(err) => {
                    assert_matches!(err, PipelineError::Core(CoreError::PreconditionViolation(_)))
                }
            }
        }
        assert_eq!(winners, 1, "round {round}");
    }
}

#[tokio::test]
async fn decisions_are_mutually_exclusive() {
    let h = harness(ScriptedDetector::always(output(vec![egret(0.9)]))).await;
    let result_id = pending_result(&h, "once.png").await;

    let rejected = h
        .workflow
        .reject(&reviewer(2), result_id, Some("cattle egret, not great egret"))
        .await
        .unwrap();
    assert_eq!(rejected.result.decision, "rejected");

    let msg = precondition(h.workflow.approve(&other_reviewer(3), result_id, None).await);
    assert!(msg.contains("already been decided"), "{msg}");
    precondition(
        h.workflow
            .override_result(
                &other_reviewer(3),
                result_id,
                &OverrideInput {
                    count: Some(3),
                    ..Default::default()
                },
            )
            .await,
    );
    precondition(h.workflow.defer_review(&other_reviewer(3), result_id).await);

    let detail = h.workflow.image_detail(&admin(4), rejected.result.image_id).await.unwrap();
    let stored = detail.result.unwrap();
    assert_eq!(stored.decision, "rejected");
    assert_eq!(stored.reviewed_by, Some(REVIEWER_ID));
    assert_eq!(detail.image.stage, "rejected");
}

#[tokio::test]
async fn rejected_results_are_never_allocated() {
    let h = harness(ScriptedDetector::always(output(vec![egret(0.9)]))).await;
    let result_id = pending_result(&h, "rejected.png").await;
    let obs = observation(&h.pool, "Lake Lanao").await;

    let msg = precondition(h.workflow.allocate(&reviewer(2), result_id, obs.id).await);
    assert!(msg.contains("has not been approved"), "{msg}");

    h.workflow.reject(&reviewer(3), result_id, None).await.unwrap();
    let msg = precondition(h.workflow.allocate(&reviewer(4), result_id, obs.id).await);
    assert!(msg.contains("rejected"), "{msg}");

    assert!(h.workflow.allocation_candidates(None, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn override_keeps_original_detections_and_allocates_replacement() {
    let h = harness(ScriptedDetector::always(output(vec![egret(0.9), egret(0.8)]))).await;
    let result_id = pending_result(&h, "flock.png").await;

    let overridden = h
        .workflow
        .override_result(
            &reviewer(2),
            result_id,
            &OverrideInput {
                species: Some("intermediate egret".to_string()),
                count: Some(5),
                reason: Some("three more behind the reeds".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(overridden.result.decision, "overridden");
    assert_eq!(overridden.result.detections.len(), 2);
    let replacement = overridden.r#override.unwrap();
    assert_eq!(replacement.species, "intermediate egret");
    assert_eq!(replacement.count, 5);

    let detail = h.workflow.image_detail(&admin(3), overridden.result.image_id).await.unwrap();
    let summary = detail.summary.unwrap();
    assert_eq!(summary.primary_species.as_deref(), Some("great egret"));
    assert_eq!(summary.total_count, 2);

    let candidates = h.workflow.allocation_candidates(None, None).await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].override_count, Some(5));

    let obs = observation(&h.pool, "Lake Lanao").await;
    let allocation = h.workflow.allocate(&reviewer(4), result_id, obs.id).await.unwrap();
    assert_eq!(allocation.species.as_deref(), Some("intermediate egret"));
    assert_eq!(allocation.count, 5);
}

#[tokio::test]
async fn override_without_values_is_rejected_before_any_write() {
    let h = harness(ScriptedDetector::always(output(vec![egret(0.9)]))).await;
    let result_id = pending_result(&h, "noop.png").await;

    assert_matches!(
        h.workflow
            .override_result(&reviewer(2), result_id, &OverrideInput::default())
            .await,
        Err(PipelineError::Core(CoreError::Validation(_)))
    );

    let approved = h.workflow.approve(&reviewer(3), result_id, None).await.unwrap();
    assert_eq!(approved.result.decision, "approved");
}

#[tokio::test]
async fn deferred_review_stays_pending_and_sorts_last() {
    let h = harness(ScriptedDetector::always(output(vec![egret(0.9)]))).await;
    let first = pending_result(&h, "first.png").await;
    let second = pending_result(&h, "second.png").await;

    let deferred = h.workflow.defer_review(&reviewer(2), first).await.unwrap();
    assert_eq!(deferred.decision, "pending");
    assert_eq!(deferred.review_deferred_at, Some(at(2)));

    let queue = h.workflow.review_queue(true, None, None).await.unwrap();
    let order: Vec<i64> = queue.iter().map(|item| item.result_id).collect();
    assert_eq!(order, vec![second, first]);

    let fresh_only = h.workflow.review_queue(false, None, None).await.unwrap();
    assert_eq!(fresh_only.len(), 1);
    assert_eq!(fresh_only[0].result_id, second);

    h.workflow.approve(&reviewer(3), first, None).await.unwrap();
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn allocation_to_missing_observation_is_not_found() {
    let h = harness(ScriptedDetector::always(output(vec![egret(0.9)]))).await;
    let result_id = pending_result(&h, "lost.png").await;
    h.workflow.approve(&reviewer(2), result_id, None).await.unwrap();

    assert_matches!(
        h.workflow.allocate(&reviewer(3), result_id, 9_999).await,
        Err(PipelineError::Core(CoreError::NotFound { entity: "CensusObservation", .. }))
    );

    let candidates = h.workflow.allocation_candidates(None, None).await.unwrap();
    assert_eq!(candidates.len(), 1);
}

#[tokio::test]
async fn unknown_result_is_not_found() {
    let h = harness(ScriptedDetector::always(output(vec![]))).await;
    assert_matches!(
        h.workflow.approve(&reviewer(0), 404, None).await,
        Err(PipelineError::Core(CoreError::NotFound { entity: "DetectionResult", id: 404 }))
    );
}

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use avicast_core::detection::{BoundingBox, Detection};
use avicast_core::roles::{ROLE_ADMIN, ROLE_FIELD_WORKER, ROLE_REVIEWER};
use avicast_core::workflow::{ActionContext, Actor};
use avicast_db::models::census::{CensusObservation, CreateCensusObservation};
use avicast_db::models::image::UploadedImage;
use avicast_db::repositories::{CensusObservationRepo, ImageRepo};
use avicast_db::DbPool;
use avicast_detection::{DetectorOutput, ScriptedDetector};
use avicast_pipeline::storage::DEFAULT_MAX_UPLOAD_BYTES;
use avicast_pipeline::{ImageStore, NewUpload, ReviewWorkflow};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use image::{DynamicImage, ImageFormat, RgbImage};
use tempfile::TempDir;

pub const FIELD_WORKER_ID: i64 = 10;
pub const OTHER_FIELD_WORKER_ID: i64 = 11;
pub const REVIEWER_ID: i64 = 20;
pub const OTHER_REVIEWER_ID: i64 = 21;
pub const ADMIN_ID: i64 = 1;

/// A workflow over a fresh in-memory database and a temporary upload dir.
pub struct Harness {
    pub workflow: ReviewWorkflow,
    pub detector: Arc<ScriptedDetector>,
    pub pool: DbPool,
    _uploads: TempDir,
    _database: Option<TempDir>,
}

pub async fn harness(detector: ScriptedDetector) -> Harness {
    let pool = avicast_db::create_pool("sqlite::memory:")
        .await
        .expect("in-memory pool");
    build_harness(pool, None, detector).await
}

/// Like [`harness`], but over a database file with a multi-connection pool,
/// so concurrent actions really race inside SQLite.
pub async fn file_harness(detector: ScriptedDetector) -> Harness {
    let dir = tempfile::tempdir().expect("temp database dir");
    let url = format!("sqlite://{}", dir.path().join("avicast.db").display());
    let pool = avicast_db::create_pool(&url).await.expect("file pool");
    build_harness(pool, Some(dir), detector).await
}

async fn build_harness(
    pool: DbPool,
    database: Option<TempDir>,
    detector: ScriptedDetector,
) -> Harness {
    avicast_db::run_migrations(&pool)
        .await
        .expect("migrations apply");

    let uploads = tempfile::tempdir().expect("temp upload dir");
    let detector = Arc::new(detector);
    let workflow = ReviewWorkflow::new(
        pool.clone(),
        detector.clone(),
        ImageStore::new(uploads.path(), DEFAULT_MAX_UPLOAD_BYTES),
        0.75,
    );

    Harness {
        workflow,
        detector,
        pool,
        _uploads: uploads,
        _database: database,
    }
}

pub fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, minute, 0).unwrap()
}

fn ctx(user_id: i64, role: &str, minute: u32) -> ActionContext {
    ActionContext::new(
        Actor {
            user_id,
            role: role.to_string(),
        },
        at(minute),
    )
}

pub fn field_worker(minute: u32) -> ActionContext {
    ctx(FIELD_WORKER_ID, ROLE_FIELD_WORKER, minute)
}

pub fn other_field_worker(minute: u32) -> ActionContext {
    ctx(OTHER_FIELD_WORKER_ID, ROLE_FIELD_WORKER, minute)
}

pub fn reviewer(minute: u32) -> ActionContext {
    ctx(REVIEWER_ID, ROLE_REVIEWER, minute)
}

pub fn reviewer_as(user_id: i64, minute: u32) -> ActionContext {
    ctx(user_id, ROLE_REVIEWER, minute)
}

pub fn other_reviewer(minute: u32) -> ActionContext {
    ctx(OTHER_REVIEWER_ID, ROLE_REVIEWER, minute)
}

pub fn admin(minute: u32) -> ActionContext {
    ctx(ADMIN_ID, ROLE_ADMIN, minute)
}

pub fn egret(confidence: f64) -> Detection {
    Detection {
        species: "great egret".to_string(),
        confidence,
        bbox: BoundingBox {
            x: 12.0,
            y: 40.0,
            width: 96.0,
            height: 140.0,
        },
    }
}

pub fn output(detections: Vec<Detection>) -> DetectorOutput {
    DetectorOutput {
        model_name: Some("yolov8n-egret".to_string()),
        detections,
    }
}

/// Poll until the image reaches `stage`; detection may still be finishing
/// on its own task after the caller gave up.
pub async fn wait_for_stage(pool: &DbPool, image_id: i64, stage: &str) -> UploadedImage {
    for _ in 0..200 {
        let image = ImageRepo::find_by_id(pool, image_id)
            .await
            .expect("image query")
            .expect("image exists");
        if image.stage == stage {
            return image;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("image {image_id} never reached {stage}");
}

pub fn png_bytes() -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::new(16, 12))
        .write_to(&mut out, ImageFormat::Png)
        .expect("png encodes");
    out.into_inner()
}

pub async fn upload(h: &Harness, ctx: &ActionContext, name: &str) -> UploadedImage {
    h.workflow
        .upload(
            ctx,
            NewUpload {
                bytes: png_bytes(),
                original_filename: name.to_string(),
                site_hint: Some("Lake Lanao".to_string()),
            },
        )
        .await
        .expect("upload succeeds")
}

pub async fn observation(pool: &DbPool, site: &str) -> CensusObservation {
    CensusObservationRepo::create(
        pool,
        &CreateCensusObservation {
            site_name: site.to_string(),
            census_date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            species_name: "great egret".to_string(),
            count: 42,
        },
        at(0),
    )
    .await
    .expect("observation insert")
}

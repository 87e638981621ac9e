#![allow(dead_code)]

use avicast_core::detection::{BoundingBox, Detection};
use avicast_db::models::image::{CreateUploadedImage, UploadedImage};
use avicast_db::repositories::ImageRepo;
use avicast_db::DbPool;
use chrono::{DateTime, TimeZone, Utc};

/// Fresh in-memory database with all migrations applied.
pub async fn test_pool() -> DbPool {
    let pool = avicast_db::create_pool("sqlite::memory:")
        .await
        .expect("in-memory pool");
    avicast_db::run_migrations(&pool)
        .await
        .expect("migrations apply");
    pool
}

pub fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 8, minute, 0).unwrap()
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

pub async fn insert_image(pool: &DbPool, uploaded_by: i64, name: &str) -> UploadedImage {
    ImageRepo::create(
        pool,
        &CreateUploadedImage {
            file_path: format!("uploads/{name}"),
            original_filename: name.to_string(),
            content_type: "image/jpeg".to_string(),
            file_size_bytes: 2048,
            width: Some(640),
            height: Some(480),
            uploaded_by,
            site_hint: Some("Lake Lanao".to_string()),
        },
        at(0),
    )
    .await
    .expect("image insert")
}

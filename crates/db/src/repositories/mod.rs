//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that accept
//! any SQLite executor (`&SqlitePool` or `&mut *tx`) as the first argument,
//! so multi-step workflow writes can share one transaction.
//!
//! State-changing updates are conditional on the expected current state and
//! report whether a row was affected; `false` means another request got there
//! first.

pub mod census_repo;
pub mod detection_result_repo;
pub mod image_repo;

pub use census_repo::{CensusAllocationRepo, CensusObservationRepo};
pub use detection_result_repo::{DetectionOverrideRepo, DetectionResultRepo};
pub use image_repo::ImageRepo;

/// Default page size when no limit is given.
pub const DEFAULT_LIMIT: i64 = 50;

/// Largest page size a caller may request.
pub const MAX_LIMIT: i64 = 200;

/// Clamp a requested page size to `1..=MAX_LIMIT`.
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Clamp a requested offset to be non-negative.
pub fn clamp_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}

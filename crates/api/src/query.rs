//! Shared query parameter types for API handlers.

use serde::Deserialize;

/// Generic pagination parameters (`?limit=&offset=`).
///
/// Values are clamped in the repository layer via `clamp_limit` /
/// `clamp_offset`.
#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Query parameters for the image list (`?stage=&limit=&offset=`).
#[derive(Debug, Deserialize)]
pub struct ImageListParams {
    pub stage: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Query parameters for the review queue (`?include_deferred=&limit=&offset=`).
///
/// Deferred results are included by default and sort after fresh ones.
#[derive(Debug, Deserialize)]
pub struct ReviewQueueParams {
    #[serde(default = "default_true")]
    pub include_deferred: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn default_true() -> bool {
    true
}

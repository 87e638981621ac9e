//! Review workflow service.
//!
//! [`ReviewWorkflow`] runs every workflow action (upload, process, review,
//! allocate) against the database and the detection adapter. Each action is
//! one synchronous call with an explicit
//! [`ActionContext`](avicast_core::workflow::ActionContext).

pub mod storage;
pub mod workflow;

use avicast_core::error::CoreError;

pub use storage::{ImageStore, StoredImage};
pub use workflow::{
    ImageDetail, NewUpload, ProcessOutcome, ReviewOutcome, ReviewWorkflow,
    DEFAULT_DETECTION_TIMEOUT,
};

/// Errors from workflow actions.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A domain-level error (precondition, validation, detection, ...).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

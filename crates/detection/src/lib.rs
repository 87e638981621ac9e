//! Object-detection adapters.
//!
//! The review workflow talks to the detection model only through the
//! [`Detector`] trait. [`http::HttpDetector`] calls a YOLO inference
//! service over HTTP; [`scripted::ScriptedDetector`] replays canned
//! responses for tests and offline demos.

pub mod http;
pub mod scripted;

use avicast_core::detection::Detection;
use avicast_core::error::CoreError;

pub use http::{DetectorConfig, HttpDetector};
pub use scripted::ScriptedDetector;

/// Raw detector output, before confidence filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorOutput {
    /// Model identifier reported by the service, if any.
    pub model_name: Option<String>,
    pub detections: Vec<Detection>,
}

/// Why a detection call could not produce output.
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    /// The request failed before a response arrived (network, DNS, timeout).
    #[error("Detection request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with a non-2xx status code.
    #[error("Detection service error ({status}): {body}")]
    Service { status: u16, body: String },

    /// The service answered with a body that could not be understood.
    #[error("Malformed detection response: {0}")]
    Malformed(String),

    /// The adapter is not available at all.
    #[error("Detector unavailable: {0}")]
    Unavailable(String),
}

impl From<DetectionError> for CoreError {
    fn from(err: DetectionError) -> Self {
        CoreError::DetectionUnavailable(err.to_string())
    }
}

/// An object-detection model that can be asked about one image.
///
/// Implementations must be safe to share across request handlers.
#[async_trait::async_trait]
pub trait Detector: Send + Sync {
    /// Run detection on encoded image bytes (JPEG, PNG or WebP).
    async fn detect(&self, image: &[u8]) -> Result<DetectorOutput, DetectionError>;
}

//! HTTP client for a YOLO inference service.
//!
//! The service accepts `POST {base_url}/detect` with a multipart `image`
//! field and answers:
//!
//! ```text
//! { "model": "yolov8n-egret",
//!   "detections": [ { "label": "great egret", "confidence": 0.91,
//!                     "bbox": [x, y, width, height] } ] }
//! ```
//!
//! Boxes are top-left origin and size, in source-image pixels.

use std::time::Duration;

use avicast_core::detection::{BoundingBox, Detection};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::{DetectionError, Detector, DetectorOutput};

/// Default request timeout for a single detection call.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for the inference service.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Base HTTP URL, e.g. `http://localhost:8000`.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl DetectorConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                  | Default                 |
    /// |--------------------------|-------------------------|
    /// | `DETECTION_URL`          | `http://localhost:8000` |
    /// | `DETECTION_TIMEOUT_SECS` | `30`                    |
    pub fn from_env() -> Self {
        let base_url = std::env::var("DETECTION_URL")
            .unwrap_or_else(|_| "http://localhost:8000".into())
            .trim_end_matches('/')
            .to_string();

        let timeout_secs: u64 = std::env::var("DETECTION_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_TIMEOUT_SECS.to_string())
            .parse()
            .expect("DETECTION_TIMEOUT_SECS must be a valid u64");

        Self {
            base_url,
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

/// Wire format of one detection in the service response.
#[derive(Debug, Deserialize)]
struct WireDetection {
    label: String,
    confidence: f64,
    bbox: [f64; 4],
}

/// Wire format of the service response.
#[derive(Debug, Deserialize)]
struct WireResponse {
    model: Option<String>,
    detections: Vec<WireDetection>,
}

/// Detector backed by a remote inference service.
pub struct HttpDetector {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDetector {
    /// Build a client for the configured service.
    pub fn new(config: &DetectorConfig) -> Result<Self, DetectionError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    /// Ensure the response has a success status code.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, DetectionError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {e}>"));
            return Err(DetectionError::Service {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl Detector for HttpDetector {
    async fn detect(&self, image: &[u8]) -> Result<DetectorOutput, DetectionError> {
        let form = Form::new().part("image", Part::bytes(image.to_vec()).file_name("upload"));

        let response = self
            .client
            .post(format!("{}/detect", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let body = Self::ensure_success(response).await?.bytes().await?;
        let output = parse_response(&body)?;

        tracing::debug!(
            model = ?output.model_name,
            detections = output.detections.len(),
            "Detection service responded"
        );
        Ok(output)
    }
}

/// Decode a service response body.
pub fn parse_response(body: &[u8]) -> Result<DetectorOutput, DetectionError> {
    let wire: WireResponse =
        serde_json::from_slice(body).map_err(|e| DetectionError::Malformed(e.to_string()))?;

    Ok(DetectorOutput {
        model_name: wire.model,
        detections: wire
            .detections
            .into_iter()
            .map(|d| Detection {
                species: d.label,
                confidence: d.confidence,
                bbox: BoundingBox {
                    x: d.bbox[0],
                    y: d.bbox[1],
                    width: d.bbox[2],
                    height: d.bbox[3],
                },
            })
            .collect(),
    })
}

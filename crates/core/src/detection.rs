//! Detection value types and the confidence filter applied before persistence.
//!
//! A detector returns raw detections; only those that pass
//! [`filter_detections`] are ever stored on a detection result.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Confidence cutoff used by the CENRO deployment.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.75;

/// Axis-aligned bounding box in pixel coordinates of the source image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// A box is usable when its origin is finite and non-negative and it has area.
    pub fn is_valid(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.x >= 0.0
            && self.y >= 0.0
            && self.width > 0.0
            && self.height > 0.0
    }
}

/// A single detection as stored on a detection result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub species: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
}

/// Detected species and how many times it appears in one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeciesCount {
    pub species: String,
    pub count: i64,
}

/// Condensed view of a detection list: what was seen and how many.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionSummary {
    /// Most frequent species, ties broken by the highest single confidence.
    pub primary_species: Option<String>,
    /// Total number of kept detections.
    pub total_count: i64,
    /// Per-species counts ordered by species label.
    pub by_species: Vec<SpeciesCount>,
}

/// Keep only detections at or above `threshold`, preserving detector order.
///
/// Detections with a confidence outside `[0, 1]`, a blank label, or a
/// degenerate bounding box are adapter faults and are dropped as well.
pub fn filter_detections(raw: Vec<Detection>, threshold: f64) -> Vec<Detection> {
    raw.into_iter()
        .filter(|d| (0.0..=1.0).contains(&d.confidence))
        .filter(|d| d.confidence >= threshold)
        .filter(|d| !d.species.trim().is_empty())
        .filter(|d| d.bbox.is_valid())
        .map(|mut d| {
            d.species = d.species.trim().to_string();
            d
        })
        .collect()
}

/// Validate a configured confidence threshold.
pub fn validate_threshold(threshold: f64) -> Result<(), String> {
    if threshold.is_finite() && (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(format!(
            "Confidence threshold must be within [0, 1], got {threshold}"
        ))
    }
}

/// Summarise a kept detection list.
pub fn summarize(detections: &[Detection]) -> DetectionSummary {
    let mut counts: BTreeMap<&str, (i64, f64)> = BTreeMap::new();
    for d in detections {
        let entry = counts.entry(d.species.as_str()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 = entry.1.max(d.confidence);
    }

    let primary_species = counts
        .iter()
        .max_by(|a, b| {
            a.1 .0
                .cmp(&b.1 .0)
                .then(a.1 .1.total_cmp(&b.1 .1))
                // Prefer the alphabetically first label on a full tie.
                .then(b.0.cmp(a.0))
        })
        .map(|(species, _)| (*species).to_string());

    DetectionSummary {
        primary_species,
        total_count: detections.len() as i64,
        by_species: counts
            .into_iter()
            .map(|(species, (count, _))| SpeciesCount {
                species: species.to_string(),
                count,
            })
            .collect(),
    }
}

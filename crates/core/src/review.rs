//! Review decisions and override validation.
//!
//! Decisions are stored as lowercase strings; [`ReviewDecision`] is the typed
//! view used by the workflow.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::detection::DetectionSummary;
use crate::error::CoreError;

/* --------------------------------------------------------------------------
Constants
-------------------------------------------------------------------------- */

pub const DECISION_PENDING: &str = "pending";
pub const DECISION_APPROVED: &str = "approved";
pub const DECISION_REJECTED: &str = "rejected";
pub const DECISION_OVERRIDDEN: &str = "overridden";

/// All valid decision values.
pub const VALID_DECISIONS: &[&str] = &[
    DECISION_PENDING,
    DECISION_APPROVED,
    DECISION_REJECTED,
    DECISION_OVERRIDDEN,
];

/// Maximum length for review notes and override reasons.
pub const MAX_NOTES_LENGTH: usize = 2_000;

/// Maximum length for a species label.
pub const MAX_SPECIES_LENGTH: usize = 100;

/// Largest bird count accepted in an override.
pub const MAX_OVERRIDE_COUNT: i64 = 10_000;

/* --------------------------------------------------------------------------
Decision
-------------------------------------------------------------------------- */

/// Human review decision on a detection result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Pending,
    Approved,
    Rejected,
    Overridden,
}

impl ReviewDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewDecision::Pending => DECISION_PENDING,
            ReviewDecision::Approved => DECISION_APPROVED,
            ReviewDecision::Rejected => DECISION_REJECTED,
            ReviewDecision::Overridden => DECISION_OVERRIDDEN,
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            DECISION_PENDING => Ok(ReviewDecision::Pending),
            DECISION_APPROVED => Ok(ReviewDecision::Approved),
            DECISION_REJECTED => Ok(ReviewDecision::Rejected),
            DECISION_OVERRIDDEN => Ok(ReviewDecision::Overridden),
            other => Err(CoreError::Validation(format!(
                "Invalid decision '{other}'. Must be one of: {}",
                VALID_DECISIONS.join(", ")
            ))),
        }
    }

    /// Whether a result with this decision may be allocated to a census.
    pub fn is_allocatable(self) -> bool {
        matches!(self, ReviewDecision::Approved | ReviewDecision::Overridden)
    }
}

impl std::fmt::Display for ReviewDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/* --------------------------------------------------------------------------
Override input
-------------------------------------------------------------------------- */

/// Reviewer-supplied replacement values.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct OverrideInput {
    #[validate(length(max = 100))]
    pub species: Option<String>,
    #[validate(range(min = 1, max = 10_000))]
    pub count: Option<i64>,
    #[validate(length(max = 2000))]
    pub reason: Option<String>,
}

/// Fully resolved override values ready to persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedOverride {
    pub species: String,
    pub count: i64,
    pub reason: Option<String>,
}

impl OverrideInput {
    /// Validate the input and fill missing values from the original detections.
    ///
    /// At least one of species or count must be supplied. A missing species
    /// falls back to the detected primary species; if nothing was detected
    /// the species is required. A missing count falls back to the detected
    /// total, which must itself be at least one.
    pub fn resolve(&self, original: &DetectionSummary) -> Result<ResolvedOverride, CoreError> {
        self.validate()?;

        let species = self
            .species
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        if self.species.is_some() && species.is_none() {
            return Err(CoreError::Validation(
                "Override species must not be blank".to_string(),
            ));
        }
        if species.is_none() && self.count.is_none() {
            return Err(CoreError::Validation(
                "An override needs a replacement species, a count, or both".to_string(),
            ));
        }

        let species = match species {
            Some(s) => s.to_string(),
            None => original.primary_species.clone().ok_or_else(|| {
                CoreError::Validation(
                    "Override species is required when nothing was detected".to_string(),
                )
            })?,
        };

        let count = match self.count {
            Some(c) => c,
            None if original.total_count >= 1 => original.total_count,
            None => {
                return Err(CoreError::Validation(
                    "Override count is required when nothing was detected".to_string(),
                ))
            }
        };

        Ok(ResolvedOverride {
            species,
            count,
            reason: normalize_notes(self.reason.as_deref())?,
        })
    }
}

/// Trim free-text notes, mapping blank input to `None` and enforcing the length cap.
pub fn normalize_notes(notes: Option<&str>) -> Result<Option<String>, CoreError> {
    let Some(trimmed) = notes.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    if trimmed.chars().count() > MAX_NOTES_LENGTH {
        return Err(CoreError::Validation(format!(
            "Notes exceed maximum length of {MAX_NOTES_LENGTH} characters"
        )));
    }
    Ok(Some(trimmed.to_string()))
}

/* --------------------------------------------------------------------------
Tests
-------------------------------------------------------------------------- */

//! Census observation and allocation models.

use avicast_core::types::{DbId, Timestamp};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `census_observations` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CensusObservation {
    pub id: DbId,
    pub site_name: String,
    pub census_date: NaiveDate,
    pub species_name: String,
    pub count: i64,
    pub created_at: Timestamp,
}

/// DTO for creating a census observation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCensusObservation {
    pub site_name: String,
    pub census_date: NaiveDate,
    pub species_name: String,
    pub count: i64,
}

/// A row from the `census_allocations` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CensusAllocation {
    pub id: DbId,
    pub detection_result_id: DbId,
    pub observation_id: DbId,
    pub species: Option<String>,
    pub count: i64,
    pub allocated_by: DbId,
    pub allocated_at: Timestamp,
}

/// DTO for creating an allocation.
#[derive(Debug, Clone)]
pub struct CreateCensusAllocation {
    pub detection_result_id: DbId,
    pub observation_id: DbId,
    pub species: Option<String>,
    pub count: i64,
    pub allocated_by: DbId,
    pub allocated_at: Timestamp,
}

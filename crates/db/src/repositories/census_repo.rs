//! Repository for the `census_observations` and `census_allocations` tables.

use avicast_core::types::{DbId, Timestamp};
use sqlx::SqliteExecutor;

use crate::models::census::{
    CensusAllocation, CensusObservation, CreateCensusAllocation, CreateCensusObservation,
};

/// Column list for census_observations queries.
const OBSERVATION_COLUMNS: &str = "id, site_name, census_date, species_name, count, created_at";

/// Column list for census_allocations queries.
const ALLOCATION_COLUMNS: &str =
    "id, detection_result_id, observation_id, species, count, allocated_by, allocated_at";

/// Read access to census observations, plus inserts for seeding.
pub struct CensusObservationRepo;

impl CensusObservationRepo {
    /// Insert a census observation, returning the created row.
    pub async fn create<'e, E: SqliteExecutor<'e>>(
        executor: E,
        input: &CreateCensusObservation,
        at: Timestamp,
    ) -> Result<CensusObservation, sqlx::Error> {
        let query = format!(
            "INSERT INTO census_observations
                (site_name, census_date, species_name, count, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {OBSERVATION_COLUMNS}"
        );
        sqlx::query_as::<_, CensusObservation>(&query)
            .bind(&input.site_name)
            .bind(input.census_date)
            .bind(&input.species_name)
            .bind(input.count)
            .bind(at)
            .fetch_one(executor)
            .await
    }

    /// Find an observation by its ID.
    pub async fn find_by_id<'e, E: SqliteExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<Option<CensusObservation>, sqlx::Error> {
        let query =
            format!("SELECT {OBSERVATION_COLUMNS} FROM census_observations WHERE id = $1");
        sqlx::query_as::<_, CensusObservation>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }
}

/// Persistence for census allocations.
pub struct CensusAllocationRepo;

impl CensusAllocationRepo {
    /// Insert an allocation, returning the created row.
    ///
    /// The `uq_census_allocations_result_id` constraint rejects a second
    /// allocation of the same result.
    pub async fn create<'e, E: SqliteExecutor<'e>>(
        executor: E,
        input: &CreateCensusAllocation,
    ) -> Result<CensusAllocation, sqlx::Error> {
        let query = format!(
            "INSERT INTO census_allocations
                (detection_result_id, observation_id, species, count, allocated_by, allocated_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {ALLOCATION_COLUMNS}"
        );
        sqlx::query_as::<_, CensusAllocation>(&query)
            .bind(input.detection_result_id)
            .bind(input.observation_id)
            .bind(&input.species)
            .bind(input.count)
            .bind(input.allocated_by)
            .bind(input.allocated_at)
            .fetch_one(executor)
            .await
    }

    /// Find the allocation of a result, if any.
    pub async fn find_by_result<'e, E: SqliteExecutor<'e>>(
        executor: E,
        detection_result_id: DbId,
    ) -> Result<Option<CensusAllocation>, sqlx::Error> {
        let query = format!(
            "SELECT {ALLOCATION_COLUMNS} FROM census_allocations WHERE detection_result_id = $1"
        );
        sqlx::query_as::<_, CensusAllocation>(&query)
            .bind(detection_result_id)
            .fetch_optional(executor)
            .await
    }

    /// All allocations made to one observation, oldest first.
    pub async fn list_for_observation<'e, E: SqliteExecutor<'e>>(
        executor: E,
        observation_id: DbId,
    ) -> Result<Vec<CensusAllocation>, sqlx::Error> {
        let query = format!(
            "SELECT {ALLOCATION_COLUMNS} FROM census_allocations
             WHERE observation_id = $1
             ORDER BY allocated_at ASC, id ASC"
        );
        sqlx::query_as::<_, CensusAllocation>(&query)
            .bind(observation_id)
            .fetch_all(executor)
            .await
    }
}

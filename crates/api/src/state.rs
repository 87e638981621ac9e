use std::sync::Arc;

use avicast_pipeline::ReviewWorkflow;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; inner data is behind `Arc` or already `Clone`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: avicast_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Review workflow service (storage, detection, state transitions).
    pub workflow: Arc<ReviewWorkflow>,
}

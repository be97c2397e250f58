//! Transport-agnostic shared state.
//!
//! `CoreState` is the single state shared between the polling scheduler and
//! the axum webhook surface. Wrapped in `Arc` at startup so both see the
//! same configuration and gateway handle. Database access opens a fresh
//! connection per use; consistency across the concurrent writers comes from
//! the repository's compare-and-swap updates, not from a shared connection.

use std::sync::Arc;

use rusqlite::Connection;

use crate::config::EngineConfig;
use crate::db::{self, DatabaseError};
use crate::gateway::ConfirmationGateway;

pub struct CoreState {
    pub config: EngineConfig,
    gateway: Arc<dyn ConfirmationGateway>,
}

impl CoreState {
    pub fn new(config: EngineConfig, gateway: Arc<dyn ConfirmationGateway>) -> Self {
        Self { config, gateway }
    }

    /// Open a connection to the engine database, running migrations if the
    /// schema is behind.
    pub fn open_db(&self) -> Result<Connection, DatabaseError> {
        db::open_database(&self.config.db_path)
    }

    pub fn gateway(&self) -> &dyn ConfirmationGateway {
        self.gateway.as_ref()
    }
}

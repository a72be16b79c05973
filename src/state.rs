//! Application state for Teleharvest.
//!
//! Contains the shared state that is passed to all handlers.

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::db::{self, DbPool};
use crate::services::{AnalyticsStore, PgAnalyticsStore};
use crate::Result;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Read access to the analytics views.
    pub analytics: Arc<dyn AnalyticsStore>,
    /// Connection pool, when backed by Postgres. Closed on shutdown.
    pub db: Option<DbPool>,
}

impl AppState {
    /// Connect to Postgres and build the state.
    ///
    /// Fails when any Postgres variable is missing or the database is
    /// unreachable.
    pub async fn new(config: &Config) -> Result<Self> {
        let options = config.database.connect_options()?;
        let pool = db::init_pool(&config.database, options).await?;
        let store = PgAnalyticsStore::new(pool.clone(), config.analytics.schema.clone());

        info!(schema = %config.analytics.schema, "Analytics store ready");

        Ok(Self {
            analytics: Arc::new(store),
            db: Some(pool),
        })
    }

    /// State over an arbitrary store (used by tests).
    pub fn with_store(store: Arc<dyn AnalyticsStore>) -> Self {
        Self {
            analytics: store,
            db: None,
        }
    }

    /// Release database connections.
    pub async fn close(&self) {
        if let Some(pool) = &self.db {
            pool.close().await;
            info!("Database pool closed");
        }
    }
}

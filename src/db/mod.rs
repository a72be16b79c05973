//! Database layer for Teleharvest.
//!
//! Provides Postgres connection pooling, the raw landing schema, and query
//! modules for the raw tables and the analytics views.

mod analytics;
mod raw;
mod transform;

pub use analytics::*;
pub use raw::*;
pub use transform::*;

use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::Result;

/// Type alias for the Postgres connection pool.
pub type DbPool = sqlx::PgPool;

const RAW_SCHEMA_SQL: &str = include_str!("../../sql/raw_schema.sql");

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(30))
}

/// Connect a pool, failing if the database cannot be reached.
pub async fn init_pool(config: &DatabaseConfig, options: PgConnectOptions) -> Result<DbPool> {
    let pool = pool_options(config).connect_with(options).await?;

    info!(
        host = config.host.as_deref().unwrap_or("localhost"),
        port = config.port,
        max_connections = config.max_connections,
        "Database pool initialized"
    );

    Ok(pool)
}

/// Build a pool that connects on first use.
pub fn init_pool_lazy(config: &DatabaseConfig, options: PgConnectOptions) -> DbPool {
    pool_options(config).connect_lazy_with(options)
}

/// Create the `raw` schema and its landing tables.
///
/// Uses IF NOT EXISTS clauses so it's safe to run multiple times.
pub async fn initialize_schema(pool: &DbPool) -> Result<()> {
    info!("Initializing raw schema");
    execute_script(pool, RAW_SCHEMA_SQL).await?;
    info!("Raw schema initialized successfully");
    Ok(())
}

/// Run a multi-statement script in a single transaction.
pub(crate) async fn execute_script(pool: &DbPool, script: &str) -> Result<()> {
    let mut tx = pool.begin().await?;
    for statement in split_statements(script) {
        sqlx::query(&statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Split a SQL script on `;`, dropping comment lines and empty statements.
pub(crate) fn split_statements(script: &str) -> Vec<String> {
    script
        .split(';')
        .map(|statement| {
            statement
                .lines()
                .filter(|line| !line.trim().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string()
        })
        .filter(|statement| !statement.is_empty())
        .collect()
}

/// Cheap connectivity check used by readiness probes.
pub async fn ping(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_statements_strips_comments() {
        let script = "-- header\nCREATE SCHEMA x;\n\n-- note\nCREATE TABLE x.t (a INT);\n";
        assert_eq!(
            split_statements(script),
            vec!["CREATE SCHEMA x", "CREATE TABLE x.t (a INT)"]
        );
    }

    #[test]
    fn test_raw_schema_statements() {
        let statements = split_statements(RAW_SCHEMA_SQL);
        assert_eq!(statements.len(), 5);
        assert!(statements[0].starts_with("CREATE SCHEMA IF NOT EXISTS raw"));
        assert!(statements
            .iter()
            .any(|s| s.contains("ON raw.telegram_messages(channel, message_id)")));
        assert!(statements
            .iter()
            .any(|s| s.contains("ON raw.image_detections(channel, message_id, image_path)")));
    }
}

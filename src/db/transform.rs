//! Analytics modelling: rebuilds the views the API reads from the raw tables.

use tracing::info;

use super::{execute_script, initialize_schema, DbPool};
use crate::config::is_sql_identifier;
use crate::{Error, Result};

const ANALYTICS_SQL: &str = include_str!("../../sql/analytics.sql");

/// Views created by [`run_transform`], in dependency order.
pub const ANALYTICS_VIEWS: [&str; 4] = [
    "stg_telegram_messages",
    "fct_messages",
    "fct_image_detections",
    "messages_with_objects",
];

/// The analytics script with `{schema}` filled in.
pub fn analytics_script(schema: &str) -> Result<String> {
    if !is_sql_identifier(schema) {
        return Err(Error::InvalidInput(format!(
            "Invalid analytics schema name: {:?}",
            schema
        )));
    }
    Ok(ANALYTICS_SQL.replace("{schema}", schema))
}

/// Create (or replace) the analytics views in `schema`.
///
/// The raw tables are created first so the views can always be built,
/// even before the first load.
pub async fn run_transform(pool: &DbPool, schema: &str) -> Result<()> {
    let script = analytics_script(schema)?;

    initialize_schema(pool).await?;

    info!(schema, "Building analytics views");
    execute_script(pool, &script).await?;
    info!(schema, views = ?ANALYTICS_VIEWS, "Analytics views built");

    Ok(())
}

//! Run object detection over downloaded images.

use std::sync::Arc;

use anyhow::{Context, Result};
use teleharvest::services::{Enricher, HttpDetector};
use teleharvest::{config, db, logging};
use teleharvest_storage::DataLake;
use tracing::info;

const LOG_FILTER: &str = "enrich_images=info,teleharvest=info";

#[tokio::main]
async fn main() -> Result<()> {
    logging::init(LOG_FILTER);
    let config = config::init()?;

    let detector = HttpDetector::from_config(&config.enrichment)?
        .context("DETECTOR_URL is not set")?;

    let pool = db::init_pool(
        &config.database,
        config.database.connect_options_with_defaults(),
    )
    .await?;

    let enricher = Enricher::new(DataLake::new(&config.scraper.data_dir), Arc::new(detector))
        .with_min_image_bytes(config.enrichment.min_image_bytes);
    let summary = enricher.run(&pool).await?;
    info!(
        records = summary.records,
        inserted = summary.inserted,
        "Inserted detections"
    );

    pool.close().await;
    Ok(())
}

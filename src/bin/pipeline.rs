//! Full pipeline: scrape, load, transform, enrich.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Parser;
use teleharvest::services::pipeline::{EnrichStage, LoadStage, ScrapeStage, TransformStage};
use teleharvest::services::{Enricher, HttpDetector, Pipeline, ScrapeOptions, ScraperService};
use teleharvest::{config, db, logging};
use teleharvest_storage::DataLake;
use teleharvest_telegram::{TelegramClient, TelegramClientConfig};
use tracing::info;

const LOG_FILTER: &str = "pipeline=info,teleharvest=info";

#[derive(Parser)]
#[command(name = "pipeline")]
#[command(about = "Run the scrape, load, transform and enrich stages in order")]
struct Cli {
    /// File with channels (one per line)
    #[arg(long, default_value = "channels.txt")]
    channels_file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init()?;
    let _guard = logging::init_with_file(
        LOG_FILTER,
        &config.scraper.log_dir,
        "pipeline.log",
    )?;

    let lake = DataLake::new(&config.scraper.data_dir);
    let pool = db::init_pool_lazy(
        &config.database,
        config.database.connect_options_with_defaults(),
    );

    let client = TelegramClient::new(&TelegramClientConfig {
        base_url: config.scraper.telegram_web_url.clone(),
        requests_per_second: config.scraper.requests_per_second,
        ..Default::default()
    })?;
    let scraper = ScraperService::new(
        Arc::new(client),
        lake.clone(),
        ScrapeOptions {
            incremental: true,
            ..Default::default()
        },
    );

    let enricher = HttpDetector::from_config(&config.enrichment)?.map(|detector| {
        Enricher::new(lake.clone(), Arc::new(detector))
            .with_min_image_bytes(config.enrichment.min_image_bytes)
    });

    let pipeline = Pipeline::new()
        .stage(ScrapeStage {
            scraper,
            channels_file: cli.channels_file,
        })
        .stage(LoadStage {
            pool: pool.clone(),
            source: lake.messages_dir(),
        })
        .stage(TransformStage {
            pool: pool.clone(),
            schema: config.analytics.schema.clone(),
        })
        .stage(EnrichStage {
            pool: pool.clone(),
            enricher,
        });

    let report = pipeline.run().await;
    pool.close().await;

    for stage in &report.stages {
        info!(
            stage = %stage.name,
            ok = stage.succeeded(),
            elapsed_ms = stage.elapsed.as_millis() as u64,
            "Stage result"
        );
    }
    if !report.succeeded() {
        bail!("Stages failed: {}", report.failed_stages().join(", "));
    }
    Ok(())
}

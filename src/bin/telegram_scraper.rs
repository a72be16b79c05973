//! Telegram channel scraper.
//!
//! ```text
//! telegram-scraper --channels-file channels.txt --since 2025-05-01 --until 2025-06-01 --limit 500 --incremental
//! telegram-scraper --channels CheMed123 --limit 1000 --incremental
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use teleharvest::services::{parse_date, read_channels, ScrapeOptions, ScraperService};
use teleharvest::{config, logging};
use teleharvest_storage::DataLake;
use teleharvest_telegram::{RetryPolicy, TelegramClient, TelegramClientConfig};
use tracing::{error, info};

const LOG_FILTER: &str = "telegram_scraper=info,teleharvest=info";

#[derive(Parser)]
#[command(name = "telegram-scraper")]
#[command(about = "Scrape public Telegram channels into the raw data lake")]
struct Cli {
    /// File with channels (one per line)
    #[arg(long, default_value = "channels.txt")]
    channels_file: PathBuf,

    /// Channels on the command line
    #[arg(long, num_args = 1..)]
    channels: Vec<String>,

    /// Max messages per channel
    #[arg(long)]
    limit: Option<usize>,

    /// Skip already-saved messages
    #[arg(long)]
    incremental: bool,

    /// Start date inclusive (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    since: Option<NaiveDate>,

    /// End date exclusive (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    until: Option<NaiveDate>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init()?;

    let _guard = logging::init_with_file(
        LOG_FILTER,
        &config.scraper.log_dir,
        "scraper.log",
    )?;

    let channels = read_channels(Some(&cli.channels_file), &cli.channels).await?;
    if channels.is_empty() {
        error!("No channels provided");
        bail!("No channels provided");
    }

    let client = TelegramClient::new(&TelegramClientConfig {
        base_url: config.scraper.telegram_web_url.clone(),
        requests_per_second: config.scraper.requests_per_second,
        ..Default::default()
    })
    .context("Failed to create Telegram client")?;
    info!(base_url = %config.scraper.telegram_web_url, "Telegram client ready");

    let scraper = ScraperService::new(
        Arc::new(client),
        DataLake::new(&config.scraper.data_dir),
        ScrapeOptions {
            limit: cli.limit,
            incremental: cli.incremental,
            since: cli.since,
            until: cli.until,
            retry: RetryPolicy::default(),
        },
    );

    let manifest = scraper.run(&channels).await?;
    info!(
        run_id = %manifest.run_id,
        channels = manifest.results.len(),
        processed = manifest.total_processed(),
        "Scrape finished"
    );

    Ok(())
}

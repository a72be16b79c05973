//! Load the raw message files into Postgres.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use teleharvest::services::load_dir;
use teleharvest::{config, db, logging};
use tracing::info;

const LOG_FILTER: &str = "load_raw=info,teleharvest=info";

#[derive(Parser)]
#[command(name = "load-raw")]
#[command(about = "Load scraped message files into raw.telegram_messages")]
struct Cli {
    /// Directory holding the <day>/<channel>.json files
    #[arg(long, default_value = "data/raw/telegram_messages")]
    source: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(LOG_FILTER);
    let config = config::init()?;

    let pool = db::init_pool(
        &config.database,
        config.database.connect_options_with_defaults(),
    )
    .await?;
    info!("Db connect successful");

    let summary = load_dir(&pool, &cli.source).await?;
    info!(
        files = summary.files,
        inserted = summary.inserted,
        "Load finished"
    );

    pool.close().await;
    Ok(())
}

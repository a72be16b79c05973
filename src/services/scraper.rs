//! Channel scraper.
//!
//! Walks each channel's history newest first, appends every new message to
//! the day file in the data lake, downloads images, and records the outcome
//! of the run in a manifest.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use teleharvest_models::{ChannelOutcome, ChannelStatus, MediaInfo, RunManifest};
use teleharvest_storage::DataLake;
use teleharvest_telegram::{
    channel_slug, download_with_retries, ChannelPost, ChannelSource, MessageIter, RetryPolicy,
};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{Error, Result};

/// Saved messages between two pauses.
const PAUSE_EVERY: usize = 50;

/// Pause taken every [`PAUSE_EVERY`] saved messages.
const PAUSE: Duration = Duration::from_millis(300);

/// Options shared by every channel of a run.
#[derive(Debug, Clone, Default)]
pub struct ScrapeOptions {
    /// Maximum messages read per channel.
    pub limit: Option<usize>,
    /// Skip messages already present in the data lake.
    pub incremental: bool,
    /// Oldest day to keep (inclusive). Reaching an older message ends the channel.
    pub since: Option<NaiveDate>,
    /// First day to exclude.
    pub until: Option<NaiveDate>,
    pub retry: RetryPolicy,
}

/// Parse a `YYYY-MM-DD` command line date.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| Error::InvalidInput(format!("Invalid date {:?} (expected YYYY-MM-DD): {}", s, e)))
}

/// Channels from `file` (when it exists) followed by `extra`.
///
/// Blank lines and `#` comments are ignored; duplicates keep their first
/// position.
pub async fn read_channels(file: Option<&Path>, extra: &[String]) -> Result<Vec<String>> {
    let mut channels: Vec<String> = Vec::new();

    if let Some(path) = file {
        if tokio::fs::try_exists(path).await? {
            let content = tokio::fs::read_to_string(path).await?;
            channels.extend(
                content
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(String::from),
            );
        } else {
            warn!(path = %path.display(), "Channels file not found");
        }
    }
    channels.extend(
        extra
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()),
    );

    let mut unique = Vec::with_capacity(channels.len());
    for channel in channels {
        if !unique.contains(&channel) {
            unique.push(channel);
        }
    }
    Ok(unique)
}

/// File extension for a downloaded image, including the dot.
pub fn image_extension(media: Option<&MediaInfo>) -> String {
    media
        .and_then(MediaInfo::file_name)
        .and_then(|name| Path::new(name).extension())
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_else(|| ".jpg".to_string())
}

/// Scrapes channels into a [`DataLake`].
#[derive(Clone)]
pub struct ScraperService {
    source: Arc<dyn ChannelSource>,
    lake: DataLake,
    options: ScrapeOptions,
}

impl ScraperService {
    pub fn new(source: Arc<dyn ChannelSource>, lake: DataLake, options: ScrapeOptions) -> Self {
        Self {
            source,
            lake,
            options,
        }
    }

    pub fn options(&self) -> &ScrapeOptions {
        &self.options
    }

    /// Scrape one channel, returning the number of messages saved.
    pub async fn scrape_channel(&self, channel: &str) -> Result<usize> {
        let name = channel_slug(channel);
        let seen = if self.options.incremental {
            self.lake.load_seen_ids(name).await?
        } else {
            Default::default()
        };

        let mut messages = MessageIter::new(self.source.as_ref(), channel, self.options.limit);
        let mut count = 0;

        while let Some(post) = messages.next().await? {
            if seen.contains(&post.id) {
                continue;
            }

            let day = post
                .date
                .map(|d| d.date_naive())
                .unwrap_or_else(|| Utc::now().date_naive());
            if self.options.since.is_some_and(|since| day < since) {
                break;
            }
            if self.options.until.is_some_and(|until| day >= until) {
                continue;
            }

            self.lake
                .append_message(day, name, &post.clone().into_raw_message())
                .await?;

            if post.is_image() {
                self.save_image(name, day, &post).await?;
            }

            count += 1;
            if count % PAUSE_EVERY == 0 {
                sleep(PAUSE).await;
            }
        }

        info!(channel, saved = count, "Finished channel");
        Ok(count)
    }

    async fn save_image(&self, name: &str, day: NaiveDate, post: &ChannelPost) -> Result<()> {
        let ext = image_extension(post.media.as_ref());
        let dest = self.lake.unique_image_path(name, post.id, day, &ext).await?;

        match download_with_retries(self.source.as_ref(), post, &dest, &self.options.retry).await {
            Some(path) => info!(path = %path.display(), "Downloaded image"),
            None => warn!(id = post.id, "Failed to download image"),
        }
        Ok(())
    }

    /// Scrape every channel in order and write the run manifest.
    ///
    /// A flood wait sleeps and retries the channel once; any other failure
    /// is recorded in the manifest and the run moves on.
    pub async fn run(&self, channels: &[String]) -> Result<RunManifest> {
        let started_at = Utc::now();
        let mut manifest = RunManifest {
            run_id: RunManifest::run_id_for(started_at),
            channels: channels.to_vec(),
            limit: self.options.limit,
            incremental: self.options.incremental,
            since: self.options.since.map(|d| d.format("%Y-%m-%d").to_string()),
            until: self.options.until.map(|d| d.format("%Y-%m-%d").to_string()),
            started_at,
            results: BTreeMap::new(),
            finished_at: None,
        };

        self.lake.ensure_layout().await?;

        for channel in channels {
            let outcome = self.scrape_with_wait(channel).await;
            manifest.results.insert(channel.clone(), outcome);
        }

        manifest.finished_at = Some(Utc::now());
        let path = self.lake.write_manifest(&manifest).await?;
        info!(
            path = %path.display(),
            processed = manifest.total_processed(),
            failed = manifest.failed_channels().len(),
            "Run complete"
        );

        Ok(manifest)
    }

    async fn scrape_with_wait(&self, channel: &str) -> ChannelOutcome {
        let first = self.scrape_channel(channel).await;
        let (result, status) = match first {
            Err(e) if e.flood_wait_seconds().is_some() => {
                let seconds = e.flood_wait_seconds().unwrap_or_default();
                let wait = self.options.retry.flood_wait(seconds);
                warn!(channel, seconds, "FloodWait: sleeping before retrying channel");
                sleep(wait).await;
                (self.scrape_channel(channel).await, ChannelStatus::OkAfterWait)
            }
            other => (other, ChannelStatus::Ok),
        };

        match result {
            Ok(processed) => ChannelOutcome { processed, status },
            Err(e) => {
                error!(channel, error = %e, "Error scraping channel");
                ChannelOutcome {
                    processed: 0,
                    status: ChannelStatus::Error(e.to_string()),
                }
            }
        }
    }
}

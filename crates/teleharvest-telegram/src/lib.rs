//! Telegram channel access through the public web preview.
//!
//! Public channels expose their history at `https://t.me/s/<channel>`,
//! one page at a time, newest page first, with `?before=<id>` paging
//! backwards. [`TelegramClient`] fetches and parses those pages and
//! downloads attached photos; [`MessageIter`] walks a channel's history
//! from the newest message down.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use teleharvest_models::{MediaInfo, RawMessage};
use tracing::debug;

mod client;
mod error;
mod parse;
mod retry;

pub use client::{TelegramClient, TelegramClientConfig};
pub use error::{Error, Result};
pub use parse::{guess_mime_type, parse_count, parse_page};
pub use retry::{download_with_retries, RetryPolicy};

/// A single post as shown on the channel preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelPost {
    pub id: i64,
    pub channel: String,
    pub date: Option<DateTime<Utc>>,
    pub text: Option<String>,
    pub views: Option<i64>,
    /// Not exposed by the preview; kept for record compatibility.
    pub forwards: Option<i64>,
    pub reply_to_msg_id: Option<i64>,
    pub is_forward: bool,
    /// Author signature, when the channel signs its posts.
    pub author: Option<String>,
    pub media: Option<MediaInfo>,
    /// Direct URL of the attached photo, when downloadable.
    pub media_url: Option<String>,
    pub raw_excerpt: String,
}

impl ChannelPost {
    pub fn is_image(&self) -> bool {
        self.media.as_ref().is_some_and(MediaInfo::is_image)
    }

    pub fn into_raw_message(self) -> RawMessage {
        let excerpt = self.raw_excerpt;
        RawMessage {
            id: self.id,
            peer_id: Some(self.channel),
            date: self.date,
            sender_id: self.author,
            text: self.text,
            views: self.views,
            forwards: self.forwards,
            reply_to_msg_id: self.reply_to_msg_id,
            is_forward: self.is_forward,
            media: self.media,
            raw_repr: None,
        }
        .with_raw_repr(&excerpt)
    }
}

/// Source of channel history pages and media.
#[async_trait]
pub trait ChannelSource: Send + Sync {
    /// Posts older than `before` (or the newest page when `None`).
    async fn fetch_page(&self, channel: &str, before: Option<i64>) -> Result<Vec<ChannelPost>>;

    /// Download the media of `post` to `dest`, returning the written path.
    async fn download(&self, post: &ChannelPost, dest: &Path) -> Result<PathBuf>;
}

/// Strip URL and `@` decorations from a channel reference.
///
/// ```
/// use teleharvest_telegram::channel_slug;
/// assert_eq!(channel_slug("https://t.me/CheMed123"), "CheMed123");
/// assert_eq!(channel_slug("@lobelia4cosmetics"), "lobelia4cosmetics");
/// assert_eq!(channel_slug("t.me/s/tikvahpharma/"), "tikvahpharma");
/// ```
pub fn channel_slug(channel: &str) -> &str {
    let mut slug = channel.trim();
    for prefix in ["https://", "http://"] {
        slug = slug.strip_prefix(prefix).unwrap_or(slug);
    }
    for prefix in ["t.me/s/", "t.me/", "telegram.me/", "@"] {
        slug = slug.strip_prefix(prefix).unwrap_or(slug);
    }
    slug.trim_end_matches('/')
}

/// Walks a channel's history from the newest post backwards.
pub struct MessageIter<'a> {
    source: &'a dyn ChannelSource,
    channel: String,
    limit: Option<usize>,
    before: Option<i64>,
    buffer: VecDeque<ChannelPost>,
    yielded: usize,
    exhausted: bool,
}

impl<'a> MessageIter<'a> {
    pub fn new(source: &'a dyn ChannelSource, channel: &str, limit: Option<usize>) -> Self {
        Self {
            source,
            channel: channel.to_string(),
            limit,
            before: None,
            buffer: VecDeque::new(),
            yielded: 0,
            exhausted: false,
        }
    }

    /// Next post, newest first. `Ok(None)` once the history or the limit
    /// is exhausted.
    pub async fn next(&mut self) -> Result<Option<ChannelPost>> {
        if self.limit.is_some_and(|limit| self.yielded >= limit) {
            return Ok(None);
        }

        if self.buffer.is_empty() && !self.exhausted {
            self.fill().await?;
        }

        match self.buffer.pop_front() {
            Some(post) => {
                self.yielded += 1;
                Ok(Some(post))
            }
            None => Ok(None),
        }
    }

    async fn fill(&mut self) -> Result<()> {
        let mut page = self.source.fetch_page(&self.channel, self.before).await?;
        if let Some(before) = self.before {
            page.retain(|p| p.id < before);
        }

        if page.is_empty() {
            self.exhausted = true;
            return Ok(());
        }

        page.sort_by(|a, b| b.id.cmp(&a.id));
        page.dedup_by_key(|p| p.id);
        self.before = page.last().map(|p| p.id);

        debug!(
            channel = %self.channel,
            count = page.len(),
            before = ?self.before,
            "Fetched history page"
        );
        self.buffer.extend(page);
        Ok(())
    }
}

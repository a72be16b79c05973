//! HTTP client for `t.me/s/<channel>` pages and photo downloads.

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, Response, StatusCode};
use tokio::fs;
use tracing::{debug, info};

use crate::{channel_slug, parse_page, ChannelPost, ChannelSource, Error, Result};

/// Retry-After fallback when Telegram omits the header.
const DEFAULT_FLOOD_WAIT_SECS: u64 = 60;

/// Configuration for [`TelegramClient`].
#[derive(Debug, Clone)]
pub struct TelegramClientConfig {
    /// Base URL of the web preview, normally `https://t.me`.
    pub base_url: String,
    /// Page and media requests allowed per second.
    pub requests_per_second: u32,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for TelegramClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://t.me".to_string(),
            requests_per_second: 2,
            timeout: Duration::from_secs(30),
            user_agent: concat!("teleharvest/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Web preview client. Cheap to clone; the rate limiter is shared.
#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    base_url: String,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl TelegramClient {
    pub fn new(config: &TelegramClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        info!(
            base_url = %config.base_url,
            requests_per_second = per_second.get(),
            "Telegram web client initialized"
        );

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            limiter,
        })
    }

    fn page_url(&self, slug: &str) -> String {
        format!("{}/s/{}", self.base_url, slug)
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Response> {
        self.limiter.until_ready().await;

        let response = self.client.get(url).query(query).send().await?;
        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => Err(Error::FloodWait {
                seconds: retry_after(&response),
            }),
            status if !status.is_success() => Err(Error::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }),
            _ => Ok(response),
        }
    }
}

#[async_trait]
impl ChannelSource for TelegramClient {
    async fn fetch_page(&self, channel: &str, before: Option<i64>) -> Result<Vec<ChannelPost>> {
        let slug = channel_slug(channel);
        if slug.is_empty() {
            return Err(Error::InvalidInput(format!("empty channel name: {:?}", channel)));
        }

        let url = self.page_url(slug);
        let query: Vec<(&str, String)> = before
            .map(|b| vec![("before", b.to_string())])
            .unwrap_or_default();

        let response = self.get(&url, &query).await?;

        // Channels without a public preview redirect to the plain profile page.
        if !response.url().path().starts_with("/s/") {
            return Err(Error::ChannelUnavailable(slug.to_string()));
        }

        let html = response.text().await?;
        let posts = parse_page(channel, &html);
        debug!(channel, ?before, count = posts.len(), "Parsed preview page");
        Ok(posts)
    }

    async fn download(&self, post: &ChannelPost, dest: &Path) -> Result<PathBuf> {
        let url = post.media_url.as_deref().ok_or_else(|| {
            Error::InvalidInput(format!("message {} has no downloadable media", post.id))
        })?;

        let bytes = self.get(url, &[]).await?.bytes().await?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(dest, &bytes).await?;

        debug!(id = post.id, path = %dest.display(), size = bytes.len(), "Media downloaded");
        Ok(dest.to_path_buf())
    }
}

fn retry_after(response: &Response) -> u64 {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_FLOOD_WAIT_SECS)
}

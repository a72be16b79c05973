//! Media download retries.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, warn};

use crate::{ChannelPost, ChannelSource, Error};

/// Retry schedule for media downloads.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts before giving up. Flood waits do not count.
    pub max_retries: u32,
    /// Backoff after failed attempt `n` is `backoff_base * 2^n`.
    pub backoff_base: Duration,
    /// Length of one second of a server-requested flood wait.
    pub flood_wait_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            backoff_base: Duration::from_secs(1),
            flood_wait_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Sleep duration for a flood wait of `seconds`, plus one second of slack.
    pub fn flood_wait(&self, seconds: u64) -> Duration {
        self.flood_wait_unit
            .saturating_mul(u32::try_from(seconds.saturating_add(1)).unwrap_or(u32::MAX))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Download the media of `post`, retrying transient failures.
///
/// Returns `None` when every attempt failed; the failure is logged.
pub async fn download_with_retries(
    source: &dyn ChannelSource,
    post: &ChannelPost,
    dest: &Path,
    policy: &RetryPolicy,
) -> Option<PathBuf> {
    let mut attempt = 0;

    while attempt < policy.max_retries {
        match source.download(post, dest).await {
            Ok(path) => return Some(path),
            Err(Error::FloodWait { seconds }) => {
                warn!(seconds, "FloodWait: sleeping before retrying download");
                sleep(policy.flood_wait(seconds)).await;
            }
            Err(e) => {
                attempt += 1;
                let wait = policy.backoff(attempt);
                warn!(
                    attempt,
                    max_retries = policy.max_retries,
                    error = %e,
                    retry_in_ms = wait.as_millis() as u64,
                    "Download error"
                );
                sleep(wait).await;
            }
        }
    }

    error!(id = post.id, "Download failed");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Plays back a fixed sequence of download results.
    struct Scripted {
        results: Mutex<Vec<Result<PathBuf>>>,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl ChannelSource for Scripted {
        async fn fetch_page(&self, _: &str, _: Option<i64>) -> Result<Vec<ChannelPost>> {
            Ok(vec![])
        }

        async fn download(&self, _: &ChannelPost, _: &Path) -> Result<PathBuf> {
            *self.calls.lock().unwrap() += 1;
            let mut results = self.results.lock().unwrap();
            if results.is_empty() {
                Err(Error::InvalidInput("exhausted".into()))
            } else {
                results.remove(0)
            }
        }
    }

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_retries: 4,
            backoff_base: Duration::from_millis(1),
            flood_wait_unit: Duration::from_millis(1),
        }
    }

    fn post() -> ChannelPost {
        ChannelPost {
            id: 1,
            channel: "c".into(),
            date: None,
            text: None,
            views: None,
            forwards: None,
            reply_to_msg_id: None,
            is_forward: false,
            author: None,
            media: None,
            media_url: Some("http://x/1.jpg".into()),
            raw_excerpt: String::new(),
        }
    }

    #[tokio::test]
    async fn test_flood_wait_does_not_consume_attempts() {
        let source = Scripted {
            results: Mutex::new(vec![
                Err(Error::FloodWait { seconds: 0 }),
                Err(Error::FloodWait { seconds: 0 }),
                Err(Error::InvalidInput("boom".into())),
                Err(Error::InvalidInput("boom".into())),
                Err(Error::InvalidInput("boom".into())),
                Ok(PathBuf::from("/tmp/ok.jpg")),
            ]),
            calls: Mutex::new(0),
        };

        let got = download_with_retries(&source, &post(), Path::new("/tmp/ok.jpg"), &fast()).await;
        assert_eq!(got, Some(PathBuf::from("/tmp/ok.jpg")));
        assert_eq!(*source.calls.lock().unwrap(), 6);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let source = Scripted {
            results: Mutex::new(vec![]),
            calls: Mutex::new(0),
        };

        let got = download_with_retries(&source, &post(), Path::new("/tmp/x.jpg"), &fast()).await;
        assert!(got.is_none());
        assert_eq!(*source.calls.lock().unwrap(), 4);
    }

    #[test]
    fn test_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.flood_wait(29), Duration::from_secs(30));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
    }
}

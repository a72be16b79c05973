//! Object detection over downloaded images.
//!
//! Inference runs in an external HTTP service: the image bytes are POSTed
//! to `DETECTOR_URL` with the input size and confidence threshold as query
//! parameters, and the reply is a JSON list of detections (optionally
//! wrapped as `{"detections": [...]}`).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use teleharvest_models::Detection;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::EnrichmentConfig;
use crate::{Error, Result};

/// Attempts per image before giving up
const MAX_RETRIES: u32 = 2;

/// Delay between retries (doubles each time)
const RETRY_DELAY_MS: u64 = 500;

/// Statuses worth another attempt: rate limited, or the server is busy
const RETRYABLE_STATUSES: [u16; 4] = [429, 502, 503, 504];

/// Finds objects in an image.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Detections for the image at `path`; failures yield an empty list.
    async fn detect(&self, path: &Path) -> Vec<Detection>;
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DetectorReply {
    List(Vec<Detection>),
    Wrapped { detections: Vec<Detection> },
}

impl From<DetectorReply> for Vec<Detection> {
    fn from(reply: DetectorReply) -> Self {
        match reply {
            DetectorReply::List(d) | DetectorReply::Wrapped { detections: d } => d,
        }
    }
}

/// Detector backed by an HTTP inference endpoint.
#[derive(Clone)]
pub struct HttpDetector {
    client: Client,
    url: String,
    confidence: f32,
    image_size: u32,
    retry_delay: Duration,
}

impl HttpDetector {
    pub fn new(url: impl Into<String>, confidence: f32, image_size: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| Error::Detector(format!("Failed to build HTTP client: {}", e)))?;

        let url = url.into();
        info!(%url, confidence, image_size, "Detector initialized");

        Ok(Self {
            client,
            url,
            confidence,
            image_size,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        })
    }

    /// Build from configuration; `None` when no endpoint is configured.
    pub fn from_config(config: &EnrichmentConfig) -> Result<Option<Self>> {
        config
            .detector_url
            .as_deref()
            .map(|url| Self::new(url, config.confidence, config.image_size))
            .transpose()
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    async fn request(&self, bytes: Vec<u8>) -> Result<Vec<Detection>> {
        let response = self
            .client
            .post(&self.url)
            .query(&[
                ("imgsz", self.image_size.to_string()),
                ("conf", self.confidence.to_string()),
            ])
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::DetectorStatus {
                status: status.as_u16(),
                body,
            });
        }

        let reply: DetectorReply = response.json().await?;
        Ok(reply.into())
    }

    fn is_retryable(error: &Error) -> bool {
        match error {
            Error::DetectorStatus { status, .. } => RETRYABLE_STATUSES.contains(status),
            Error::DetectorRequest(e) => e.is_timeout(),
            _ => false,
        }
    }

    async fn detect_with_retries(&self, path: &Path) -> Result<Vec<Detection>> {
        let bytes = tokio::fs::read(path).await?;
        let mut delay = self.retry_delay;

        let mut attempt = 0;
        loop {
            match self.request(bytes.clone()).await {
                Ok(detections) => return Ok(detections),
                Err(e) if Self::is_retryable(&e) && attempt + 1 < MAX_RETRIES => {
                    debug!(
                        path = %path.display(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying detection after error"
                    );
                    sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect(&self, path: &Path) -> Vec<Detection> {
        match self.detect_with_retries(path).await {
            Ok(detections) => detections,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot process image");
                Vec::new()
            }
        }
    }
}

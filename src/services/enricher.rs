//! Image enrichment: runs object detection over the downloaded images and
//! stores the results in the data lake and in `raw.image_detections`.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use teleharvest_models::ImageDetectionRecord;
use teleharvest_storage::DataLake;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use super::Detector;
use crate::db::{self, DbPool};
use crate::Result;

/// Files below this size are treated as corrupted downloads.
pub const MIN_IMAGE_BYTES: u64 = 500;

/// Raster format of an image header, if recognised.
pub fn image_format(header: &[u8]) -> Option<&'static str> {
    match header {
        [0xFF, 0xD8, 0xFF, ..] => Some("jpeg"),
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some("png"),
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some("gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("webp"),
        [b'B', b'M', ..] => Some("bmp"),
        _ => None,
    }
}

/// True only for an existing file of at least `min_bytes` that starts with
/// a known image header.
pub async fn is_valid_image(path: &Path, min_bytes: u64) -> bool {
    let Ok(metadata) = tokio::fs::metadata(path).await else {
        return false;
    };
    if !metadata.is_file() || metadata.len() < min_bytes {
        return false;
    }

    let Ok(mut file) = tokio::fs::File::open(path).await else {
        return false;
    };
    let mut header = [0u8; 12];
    let mut filled = 0;
    while filled < header.len() {
        match file.read(&mut header[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(_) => return false,
        }
    }
    image_format(&header[..filled]).is_some()
}

/// Message id encoded in an image file stem.
///
/// Stems look like `<channel>_<id>_<day>`; the digits right after the
/// channel prefix win, otherwise the first run of digits is used.
pub fn message_id_from_filename(channel: &str, stem: &str) -> Option<i64> {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    let digits = DIGITS.get_or_init(|| Regex::new(r"\d+").expect("static regex"));

    if let Some(rest) = stem.strip_prefix(&format!("{}_", channel)) {
        let id: String = rest.chars().take_while(char::is_ascii_digit).collect();
        if let Ok(id) = id.parse() {
            return Some(id);
        }
    }
    digits.find(stem).and_then(|m| m.as_str().parse().ok())
}

/// Totals of one enrichment run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichSummary {
    pub scanned: usize,
    pub skipped: usize,
    pub records: usize,
    pub inserted: u64,
}

/// Runs a [`Detector`] over the images of a [`DataLake`].
#[derive(Clone)]
pub struct Enricher {
    lake: DataLake,
    detector: Arc<dyn Detector>,
    min_image_bytes: u64,
}

impl Enricher {
    pub fn new(lake: DataLake, detector: Arc<dyn Detector>) -> Self {
        Self {
            lake,
            detector,
            min_image_bytes: MIN_IMAGE_BYTES,
        }
    }

    pub fn with_min_image_bytes(mut self, min_image_bytes: u64) -> Self {
        self.min_image_bytes = min_image_bytes;
        self
    }

    /// Detect objects in every image and write `all_detections.json`.
    ///
    /// Images without detections produce no record.
    pub async fn collect(&self) -> Result<(Vec<ImageDetectionRecord>, EnrichSummary)> {
        let mut records = Vec::new();
        let mut summary = EnrichSummary::default();
        let mut current_channel: Option<String> = None;

        for image in self.lake.image_files().await? {
            if current_channel.as_deref() != Some(image.channel.as_str()) {
                info!(channel = %image.channel, "Processing channel");
                current_channel = Some(image.channel.clone());
            }
            summary.scanned += 1;

            if !is_valid_image(&image.path, self.min_image_bytes).await {
                warn!(path = %image.path.display(), "Skipping invalid image");
                summary.skipped += 1;
                continue;
            }

            let detections = self.detector.detect(&image.path).await;
            if detections.is_empty() {
                continue;
            }

            let stem = image
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            records.push(ImageDetectionRecord {
                message_id: message_id_from_filename(&image.channel, &stem),
                channel: image.channel,
                image_path: image.path.display().to_string(),
                detection: detections,
            });
        }

        let path = self.lake.write_detections(&records).await?;
        summary.records = records.len();
        info!(path = %path.display(), records = records.len(), "Detections saved");

        Ok((records, summary))
    }

    /// Collect detections and insert them into `raw.image_detections`.
    pub async fn run(&self, pool: &DbPool) -> Result<EnrichSummary> {
        db::initialize_schema(pool).await?;

        let (records, mut summary) = self.collect().await?;
        summary.inserted = db::insert_image_detections(pool, &records).await?;

        info!(
            scanned = summary.scanned,
            skipped = summary.skipped,
            inserted = summary.inserted,
            "Enrichment complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&[0xFF, 0xD8, 0xFF, 0xE0], Some("jpeg"))]
    #[case(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A], Some("png"))]
    #[case(b"GIF89a", Some("gif"))]
    #[case(b"RIFF\x10\x00\x00\x00WEBPVP8 ", Some("webp"))]
    #[case(b"BM\x00\x00", Some("bmp"))]
    #[case(b"<html>", None)]
    #[case(&[], None)]
    fn test_image_format(#[case] header: &[u8], #[case] expected: Option<&str>) {
        assert_eq!(image_format(header), expected);
    }

    #[rstest]
    #[case("CheMed123", "CheMed123_1042_2025-05-03", Some(1042))]
    #[case("CheMed123", "CheMed123_1042_2025-05-03_1", Some(1042))]
    #[case("lobelia4cosmetics", "lobelia4cosmetics_77_2025-05-01", Some(77))]
    #[case("other", "lobelia4cosmetics_77_2025-05-01", Some(4))]
    #[case("pics", "cover", None)]
    fn test_message_id_from_filename(
        #[case] channel: &str,
        #[case] stem: &str,
        #[case] expected: Option<i64>,
    ) {
        assert_eq!(message_id_from_filename(channel, stem), expected);
    }

    #[tokio::test]
    async fn test_is_valid_image() {
        let dir = tempfile::tempdir().unwrap();

        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0];
        jpeg.resize(600, 0);
        let good = dir.path().join("good.jpg");
        tokio::fs::write(&good, &jpeg).await.unwrap();

        let small = dir.path().join("small.jpg");
        tokio::fs::write(&small, &jpeg[..100]).await.unwrap();

        let html = dir.path().join("error.jpg");
        tokio::fs::write(&html, "<html>".repeat(200)).await.unwrap();

        assert!(is_valid_image(&good, MIN_IMAGE_BYTES).await);
        assert!(!is_valid_image(&small, MIN_IMAGE_BYTES).await);
        assert!(!is_valid_image(&html, MIN_IMAGE_BYTES).await);
        assert!(!is_valid_image(&dir.path().join("missing.jpg"), MIN_IMAGE_BYTES).await);
    }
}

//! Raw data lake for scraped channel content.
//!
//! Layout under the root directory (default `data/raw`):
//!
//! ```text
//! telegram_messages/
//!   2025-05-01/
//!     CheMed123.json          one JSON message per line
//!   _manifests/
//!     20250501T120000Z.json   run manifest
//! images/
//!   CheMed123/
//!     CheMed123_4411_2025-05-01.jpg
//! yolo_outputs/
//!   all_detections.json
//! ```
//!
//! Message files are append-only. Incremental scraping rebuilds the set of
//! already saved ids from them rather than keeping a separate cursor.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde_json::Value;
use teleharvest_models::{ImageDetectionRecord, RawMessage, RunManifest};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

mod error;
mod sanitize;

pub use error::{Error, Result};
pub use sanitize::sanitize_filename;

pub const MESSAGES_DIR: &str = "telegram_messages";
pub const IMAGES_DIR: &str = "images";
pub const MANIFESTS_DIR: &str = "_manifests";
pub const DETECTIONS_DIR: &str = "yolo_outputs";
pub const DETECTIONS_FILE: &str = "all_detections.json";

/// A message file discovered in the lake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFile {
    /// Name of the day directory (`YYYY-MM-DD`).
    pub day: String,
    /// File stem, which is the sanitized channel name.
    pub channel: String,
    pub path: PathBuf,
}

/// An image discovered in the lake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    /// Name of the channel directory.
    pub channel: String,
    pub path: PathBuf,
}

/// Handle on the raw data lake directory tree.
#[derive(Debug, Clone)]
pub struct DataLake {
    root: PathBuf,
}

impl DataLake {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn messages_dir(&self) -> PathBuf {
        self.root.join(MESSAGES_DIR)
    }

    pub fn manifests_dir(&self) -> PathBuf {
        self.messages_dir().join(MANIFESTS_DIR)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    pub fn channel_images_dir(&self, channel: &str) -> PathBuf {
        self.images_dir().join(sanitize_filename(channel))
    }

    pub fn detections_dir(&self) -> PathBuf {
        self.root.join(DETECTIONS_DIR)
    }

    /// Path of the JSONL file holding `channel`'s messages for `day`.
    pub fn message_file(&self, day: NaiveDate, channel: &str) -> PathBuf {
        self.messages_dir()
            .join(day.format("%Y-%m-%d").to_string())
            .join(format!("{}.json", sanitize_filename(channel)))
    }

    /// Create every top-level directory of the layout.
    pub async fn ensure_layout(&self) -> Result<()> {
        for dir in [
            self.messages_dir(),
            self.images_dir(),
            self.manifests_dir(),
            self.detections_dir(),
        ] {
            fs::create_dir_all(&dir).await?;
        }
        Ok(())
    }

    /// Collect the ids of every message already saved for `channel`.
    ///
    /// Unreadable files and lines that do not parse are skipped.
    pub async fn load_seen_ids(&self, channel: &str) -> Result<HashSet<i64>> {
        let mut seen = HashSet::new();
        let file_name = format!("{}.json", sanitize_filename(channel));

        for day_dir in day_dirs(&self.messages_dir()).await? {
            let path = day_dir.join(&file_name);
            let Ok(content) = fs::read_to_string(&path).await else {
                continue;
            };
            seen.extend(content.lines().filter_map(line_id));
        }

        debug!(channel, count = seen.len(), "Loaded seen message ids");
        Ok(seen)
    }

    /// Append one message to the day file for `channel`.
    pub async fn append_message(
        &self,
        day: NaiveDate,
        channel: &str,
        message: &RawMessage,
    ) -> Result<PathBuf> {
        let path = self.message_file(day, channel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(message)?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        Ok(path)
    }

    /// First free path for an image of `message_id`.
    ///
    /// The base name is `<channel>_<id>_<day><ext>`; when taken, `_1`, `_2`,
    /// ... are appended to the stem until a free name is found.
    pub async fn unique_image_path(
        &self,
        channel: &str,
        message_id: i64,
        day: NaiveDate,
        ext: &str,
    ) -> Result<PathBuf> {
        let dir = self.channel_images_dir(channel);
        fs::create_dir_all(&dir).await?;

        let stem = format!(
            "{}_{}_{}",
            sanitize_filename(channel),
            message_id,
            day.format("%Y-%m-%d")
        );

        let mut candidate = dir.join(format!("{}{}", stem, ext));
        let mut i = 1;
        while fs::try_exists(&candidate).await? {
            candidate = dir.join(format!("{}_{}{}", stem, i, ext));
            i += 1;
        }
        Ok(candidate)
    }

    /// Write a run manifest as pretty JSON and return its path.
    pub async fn write_manifest(&self, manifest: &RunManifest) -> Result<PathBuf> {
        if manifest.run_id.is_empty() {
            return Err(Error::InvalidInput("manifest without run_id".to_string()));
        }

        let dir = self.manifests_dir();
        fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{}.json", manifest.run_id));
        fs::write(&path, serde_json::to_vec_pretty(manifest)?).await?;

        info!(path = %path.display(), "Run manifest saved");
        Ok(path)
    }

    /// Every `<day>/<channel>.json` file, sorted by day then channel.
    pub async fn message_files(&self) -> Result<Vec<MessageFile>> {
        list_message_files(&self.messages_dir()).await
    }

    /// Every file under `images/<channel>/`, sorted by path.
    pub async fn image_files(&self) -> Result<Vec<ImageFile>> {
        let mut images = Vec::new();
        let root = self.images_dir();
        if !fs::try_exists(&root).await? {
            return Ok(images);
        }

        let mut channels = fs::read_dir(&root).await?;
        while let Some(channel_dir) = channels.next_entry().await? {
            if !channel_dir.file_type().await?.is_dir() {
                continue;
            }
            let channel = channel_dir.file_name().to_string_lossy().into_owned();
            let mut entries = fs::read_dir(channel_dir.path()).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_file() {
                    images.push(ImageFile {
                        channel: channel.clone(),
                        path: entry.path(),
                    });
                }
            }
        }

        images.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(images)
    }

    /// Write the enrichment output to `yolo_outputs/all_detections.json`.
    pub async fn write_detections(&self, records: &[ImageDetectionRecord]) -> Result<PathBuf> {
        let dir = self.detections_dir();
        fs::create_dir_all(&dir).await?;
        let path = dir.join(DETECTIONS_FILE);
        fs::write(&path, serde_json::to_vec_pretty(records)?).await?;
        Ok(path)
    }
}

/// Every `<day>/<channel>.json` file under a messages directory, sorted by
/// day then channel.
pub async fn list_message_files(messages_dir: &Path) -> Result<Vec<MessageFile>> {
    let mut files = Vec::new();

    for day_dir in day_dirs(messages_dir).await? {
        let day = file_name_lossy(&day_dir);
        let mut entries = fs::read_dir(&day_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file()
                || path.extension().and_then(|e| e.to_str()) != Some("json")
            {
                continue;
            }
            let channel = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            files.push(MessageFile {
                day: day.clone(),
                channel,
                path,
            });
        }
    }

    files.sort_by(|a, b| (&a.day, &a.channel).cmp(&(&b.day, &b.channel)));
    Ok(files)
}

/// Day directories under a messages directory, skipping `_manifests`.
async fn day_dirs(messages_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    if !fs::try_exists(messages_dir).await? {
        return Ok(dirs);
    }

    let mut entries = fs::read_dir(messages_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with('_') {
            continue;
        }
        dirs.push(entry.path());
    }
    dirs.sort();
    Ok(dirs)
}

/// Parse every JSON line of a message file, skipping bad lines.
pub async fn read_message_lines(path: &Path) -> Result<Vec<Value>> {
    let content = fs::read_to_string(path).await?;
    Ok(content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str::<Value>(l).ok())
        .filter(Value::is_object)
        .collect())
}

fn line_id(line: &str) -> Option<i64> {
    serde_json::from_str::<Value>(line)
        .ok()?
        .get("id")?
        .as_i64()
}

fn file_name_lossy(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use teleharvest_models::{ChannelOutcome, ChannelStatus, MediaInfo};
    use tempfile::TempDir;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[tokio::test]
    async fn test_append_and_seen_ids() {
        let dir = TempDir::new().unwrap();
        let lake = DataLake::new(dir.path());
        lake.ensure_layout().await.unwrap();

        lake.append_message(day("2025-05-01"), "CheMed123", &RawMessage::new(10))
            .await
            .unwrap();
        lake.append_message(day("2025-05-02"), "CheMed123", &RawMessage::new(11))
            .await
            .unwrap();
        lake.append_message(day("2025-05-02"), "other", &RawMessage::new(99))
            .await
            .unwrap();

        let seen = lake.load_seen_ids("CheMed123").await.unwrap();
        assert_eq!(seen, HashSet::from([10, 11]));
    }

    #[tokio::test]
    async fn test_seen_ids_skip_bad_lines() {
        let dir = TempDir::new().unwrap();
        let lake = DataLake::new(dir.path());
        let path = lake.message_file(day("2025-05-01"), "chan");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{\"id\": 1}\nnot json\n{\"id\": \"2\"}\n{\"id\": 3}\n").unwrap();

        let seen = lake.load_seen_ids("chan").await.unwrap();
        assert_eq!(seen, HashSet::from([1, 3]));
    }

    #[tokio::test]
    async fn test_seen_ids_empty_lake() {
        let dir = TempDir::new().unwrap();
        let lake = DataLake::new(dir.path().join("missing"));
        assert!(lake.load_seen_ids("chan").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_appended_lines_keep_unicode() {
        let dir = TempDir::new().unwrap();
        let lake = DataLake::new(dir.path());
        let mut msg = RawMessage::new(5);
        msg.text = Some("ፓራሲታሞል በቅናሽ".to_string());
        msg.media = Some(MediaInfo::Photo);
        let path = lake
            .append_message(day("2025-05-01"), "chan", &msg)
            .await
            .unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("ፓራሲታሞል"));
        assert!(content.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_unique_image_path_increments() {
        let dir = TempDir::new().unwrap();
        let lake = DataLake::new(dir.path());

        let first = lake
            .unique_image_path("chan", 42, day("2025-05-01"), ".jpg")
            .await
            .unwrap();
        assert!(first.ends_with("images/chan/chan_42_2025-05-01.jpg"));
        std::fs::write(&first, b"x").unwrap();

        let second = lake
            .unique_image_path("chan", 42, day("2025-05-01"), ".jpg")
            .await
            .unwrap();
        assert!(second.ends_with("chan_42_2025-05-01_1.jpg"));
        std::fs::write(&second, b"x").unwrap();

        let third = lake
            .unique_image_path("chan", 42, day("2025-05-01"), ".jpg")
            .await
            .unwrap();
        assert!(third.ends_with("chan_42_2025-05-01_2.jpg"));
    }

    #[tokio::test]
    async fn test_message_files_skip_manifests() {
        let dir = TempDir::new().unwrap();
        let lake = DataLake::new(dir.path());
        lake.ensure_layout().await.unwrap();
        lake.append_message(day("2025-05-02"), "b", &RawMessage::new(1))
            .await
            .unwrap();
        lake.append_message(day("2025-05-01"), "a", &RawMessage::new(2))
            .await
            .unwrap();

        let mut manifest = RunManifest {
            run_id: "20250501T000000Z".to_string(),
            channels: vec!["a".to_string()],
            limit: None,
            incremental: false,
            since: None,
            until: None,
            started_at: Utc::now(),
            results: Default::default(),
            finished_at: None,
        };
        manifest.results.insert(
            "a".to_string(),
            ChannelOutcome {
                processed: 1,
                status: ChannelStatus::Ok,
            },
        );
        let manifest_path = lake.write_manifest(&manifest).await.unwrap();
        assert!(manifest_path.ends_with("_manifests/20250501T000000Z.json"));

        let files = lake.message_files().await.unwrap();
        let keys: Vec<(&str, &str)> = files
            .iter()
            .map(|f| (f.day.as_str(), f.channel.as_str()))
            .collect();
        assert_eq!(keys, vec![("2025-05-01", "a"), ("2025-05-02", "b")]);
    }

    #[tokio::test]
    async fn test_read_message_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c.json");
        std::fs::write(&path, "{\"id\":1}\n\n[1,2]\n{broken\n{\"id\":2}\n").unwrap();
        let values = read_message_lines(&path).await.unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[1]["id"], 2);
    }

    #[tokio::test]
    async fn test_image_files() {
        let dir = TempDir::new().unwrap();
        let lake = DataLake::new(dir.path());
        assert!(lake.image_files().await.unwrap().is_empty());

        let chan_dir = lake.channel_images_dir("chan");
        std::fs::create_dir_all(&chan_dir).unwrap();
        std::fs::write(chan_dir.join("chan_1_2025-05-01.jpg"), b"x").unwrap();
        std::fs::write(lake.images_dir().join("stray.txt"), b"x").unwrap();

        let images = lake.image_files().await.unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].channel, "chan");
    }
}

//! Loads the JSONL message files of the data lake into `raw.telegram_messages`.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::Value;
use teleharvest_storage::{list_message_files, read_message_lines};
use tracing::info;

use crate::db::{self, DbPool, RawMessageRow};
use crate::Result;

/// Totals of one load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub files: usize,
    /// Lines that parsed.
    pub rows: usize,
    /// Rows that were not already present.
    pub inserted: u64,
}

/// Build a raw row from one parsed message line.
///
/// The message id and date are lifted out of the payload when present and
/// well-formed; the payload itself is stored unchanged.
pub fn row_from_value(channel: &str, value: Value) -> RawMessageRow {
    let message_id = value
        .get("id")
        .and_then(Value::as_i64)
        .and_then(|id| i32::try_from(id).ok());
    let message_date = value
        .get("date")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc));

    RawMessageRow {
        channel: channel.to_string(),
        message_id,
        message_date,
        raw: value,
    }
}

/// Load every `<day>/<channel>.json` under `source`.
pub async fn load_dir(pool: &DbPool, source: &Path) -> Result<LoadSummary> {
    db::initialize_schema(pool).await?;

    let mut summary = LoadSummary::default();
    for file in list_message_files(source).await? {
        let rows: Vec<RawMessageRow> = read_message_lines(&file.path)
            .await?
            .into_iter()
            .map(|value| row_from_value(&file.channel, value))
            .collect();

        let inserted = if rows.is_empty() {
            0
        } else {
            db::insert_messages(pool, &rows).await?
        };
        info!(
            path = %file.path.display(),
            rows = rows.len(),
            inserted,
            "Loaded message file"
        );

        summary.files += 1;
        summary.rows += rows.len();
        summary.inserted += inserted;
    }

    info!(
        files = summary.files,
        rows = summary.rows,
        inserted = summary.inserted,
        "Total inserted"
    );
    Ok(summary)
}

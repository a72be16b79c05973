//! Inserts into the `raw` landing tables.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use teleharvest_models::ImageDetectionRecord;

use super::DbPool;
use crate::Result;

/// Rows per INSERT statement, well below the Postgres bind limit.
pub const INSERT_BATCH_SIZE: usize = 1000;

/// One row of `raw.telegram_messages`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessageRow {
    pub channel: String,
    pub message_id: Option<i32>,
    pub message_date: Option<DateTime<Utc>>,
    pub raw: Value,
}

fn insert_messages_query(rows: &[RawMessageRow]) -> QueryBuilder<'_, Postgres> {
    let mut qb = QueryBuilder::new(
        "INSERT INTO raw.telegram_messages (channel, message_id, message_date, raw) ",
    );
    qb.push_values(rows, |mut b, row| {
        b.push_bind(&row.channel)
            .push_bind(row.message_id)
            .push_bind(row.message_date)
            .push_bind(Json(&row.raw));
    });
    qb.push(" ON CONFLICT DO NOTHING");
    qb
}

/// Insert message rows, returning how many were new.
pub async fn insert_messages(pool: &DbPool, rows: &[RawMessageRow]) -> Result<u64> {
    let mut inserted = 0;
    for chunk in rows.chunks(INSERT_BATCH_SIZE) {
        let result = insert_messages_query(chunk).build().execute(pool).await?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

fn insert_detections_query(records: &[ImageDetectionRecord]) -> QueryBuilder<'_, Postgres> {
    let mut qb = QueryBuilder::new(
        "INSERT INTO raw.image_detections (channel, message_id, image_path, detection) ",
    );
    qb.push_values(records, |mut b, record| {
        b.push_bind(&record.channel)
            .push_bind(record.message_id.and_then(|id| i32::try_from(id).ok()))
            .push_bind(&record.image_path)
            .push_bind(Json(&record.detection));
    });
    qb.push(" ON CONFLICT (channel, message_id, image_path) DO NOTHING");
    qb
}

/// Insert detection records, returning how many were new.
pub async fn insert_image_detections(
    pool: &DbPool,
    records: &[ImageDetectionRecord],
) -> Result<u64> {
    let mut inserted = 0;
    for chunk in records.chunks(INSERT_BATCH_SIZE) {
        let result = insert_detections_query(chunk).build().execute(pool).await?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_messages_sql() {
        let rows = vec![
            RawMessageRow {
                channel: "CheMed123".into(),
                message_id: Some(1),
                message_date: None,
                raw: json!({"id": 1}),
            },
            RawMessageRow {
                channel: "CheMed123".into(),
                message_id: Some(2),
                message_date: None,
                raw: json!({"id": 2}),
            },
        ];
        let qb = insert_messages_query(&rows);
        assert_eq!(
            qb.sql(),
            "INSERT INTO raw.telegram_messages (channel, message_id, message_date, raw) \
             VALUES ($1, $2, $3, $4), ($5, $6, $7, $8) ON CONFLICT DO NOTHING"
        );
    }

    #[test]
    fn test_insert_detections_sql() {
        let records = vec![ImageDetectionRecord {
            channel: "lobelia4cosmetics".into(),
            message_id: Some(9),
            image_path: "data/raw/images/lobelia4cosmetics/x.jpg".into(),
            detection: vec![],
        }];
        let qb = insert_detections_query(&records);
        assert!(qb.sql().ends_with(
            "VALUES ($1, $2, $3, $4) ON CONFLICT (channel, message_id, image_path) DO NOTHING"
        ));
    }
}

//! Read queries over the analytics views.
//!
//! The schema name is interpolated into the SQL text, so it must be a
//! validated identifier (see [`crate::config::is_sql_identifier`]). Every
//! user-supplied value is bound as a parameter.

use sqlx::{Postgres, QueryBuilder};
use teleharvest_models::{
    ChannelActivityItem, DetectionRow, MessageRow, MessageWithObject, TopObjectItem,
};

use super::DbPool;
use crate::Result;

/// Filters for `fct_image_detections`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionFilter {
    pub channel: Option<String>,
    /// Case-insensitive substring of the object class name.
    pub object_name: Option<String>,
    /// Only applied when greater than zero.
    pub min_confidence: f64,
    pub limit: i64,
}

/// Filters and paging for the messages/detections join.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageObjectFilter {
    pub channel: Option<String>,
    pub object_name: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

fn like_pattern(s: &str) -> String {
    format!("%{}%", s)
}

/// Keep `where`/`and` joining in one place.
struct Where {
    first: bool,
}

impl Where {
    fn new() -> Self {
        Self { first: true }
    }

    fn next<'a>(
        &mut self,
        qb: &'a mut QueryBuilder<'static, Postgres>,
    ) -> &'a mut QueryBuilder<'static, Postgres> {
        qb.push(if self.first { " WHERE " } else { " AND " });
        self.first = false;
        qb
    }
}

pub(crate) fn search_messages_query(
    schema: &str,
    q: &str,
    limit: i64,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT channel, message_id, message_text, message_date, views, has_media \
         FROM {}.fct_messages WHERE message_text ILIKE ",
        schema
    ));
    qb.push_bind(like_pattern(q));
    qb.push(" ORDER BY message_date DESC LIMIT ");
    qb.push_bind(limit);
    qb
}

pub(crate) fn detections_query(
    schema: &str,
    filter: &DetectionFilter,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT channel, message_id, image_path, object, confidence \
         FROM {}.fct_image_detections",
        schema
    ));
    let mut clause = Where::new();

    if let Some(channel) = filter.channel.as_deref().filter(|c| !c.is_empty()) {
        clause.next(&mut qb).push("channel = ").push_bind(channel.to_string());
    }
    if let Some(object) = filter.object_name.as_deref().filter(|o| !o.is_empty()) {
        clause
            .next(&mut qb)
            .push("object ILIKE ")
            .push_bind(like_pattern(object));
    }
    if filter.min_confidence > 0.0 {
        clause
            .next(&mut qb)
            .push("confidence >= ")
            .push_bind(filter.min_confidence);
    }

    qb.push(" ORDER BY confidence DESC LIMIT ");
    qb.push_bind(filter.limit);
    qb
}

pub(crate) fn channel_activity_query(
    schema: &str,
    channel: &str,
    days: i32,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT to_char(date_trunc('day', message_date), 'YYYY-MM-DD') AS day, \
         count(*) AS messages \
         FROM {}.fct_messages WHERE channel = ",
        schema
    ));
    qb.push_bind(channel.to_string());
    qb.push(" AND message_date >= now() - make_interval(days => ");
    qb.push_bind(days);
    qb.push(") GROUP BY 1 ORDER BY 1");
    qb
}

pub(crate) fn top_objects_query(schema: &str, limit: i64) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT object, count(*) AS mentions \
         FROM {}.fct_image_detections WHERE object IS NOT NULL \
         GROUP BY object ORDER BY mentions DESC, object LIMIT ",
        schema
    ));
    qb.push_bind(limit);
    qb
}

pub(crate) fn messages_with_objects_query(
    schema: &str,
    filter: &MessageObjectFilter,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT m.channel, m.message_id, m.message_text, m.message_date, d.object, d.confidence \
         FROM {schema}.messages_with_objects m \
         LEFT JOIN {schema}.fct_image_detections d \
         ON m.channel = d.channel AND m.message_id = d.message_id"
    ));
    let mut clause = Where::new();

    if let Some(channel) = filter.channel.as_deref().filter(|c| !c.is_empty()) {
        clause.next(&mut qb).push("m.channel = ").push_bind(channel.to_string());
    }
    if let Some(object) = filter.object_name.as_deref().filter(|o| !o.is_empty()) {
        clause
            .next(&mut qb)
            .push("d.object ILIKE ")
            .push_bind(like_pattern(object));
    }

    qb.push(" ORDER BY m.message_date DESC LIMIT ");
    qb.push_bind(filter.limit);
    qb.push(" OFFSET ");
    qb.push_bind(filter.offset);
    qb
}

/// Messages whose text contains `q`, newest first.
pub async fn search_messages(
    pool: &DbPool,
    schema: &str,
    q: &str,
    limit: i64,
) -> Result<Vec<MessageRow>> {
    let rows = search_messages_query(schema, q, limit)
        .build_query_as::<MessageRow>()
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn list_detections(
    pool: &DbPool,
    schema: &str,
    filter: &DetectionFilter,
) -> Result<Vec<DetectionRow>> {
    let rows = detections_query(schema, filter)
        .build_query_as::<DetectionRow>()
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Daily message counts for `channel` over the last `days` days.
pub async fn channel_activity(
    pool: &DbPool,
    schema: &str,
    channel: &str,
    days: i32,
) -> Result<Vec<ChannelActivityItem>> {
    let rows = channel_activity_query(schema, channel, days)
        .build_query_as::<ChannelActivityItem>()
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn top_objects(pool: &DbPool, schema: &str, limit: i64) -> Result<Vec<TopObjectItem>> {
    let rows = top_objects_query(schema, limit)
        .build_query_as::<TopObjectItem>()
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn messages_with_objects(
    pool: &DbPool,
    schema: &str,
    filter: &MessageObjectFilter,
) -> Result<Vec<MessageWithObject>> {
    let rows = messages_with_objects_query(schema, filter)
        .build_query_as::<MessageWithObject>()
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

//! Rows returned by the analytical API.
//!
//! Every column is nullable on the warehouse side, so most fields are
//! optional.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct MessageRow {
    pub channel: Option<String>,
    pub message_id: Option<i32>,
    pub message_text: Option<String>,
    pub message_date: Option<DateTime<Utc>>,
    pub views: Option<i32>,
    pub has_media: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct DetectionRow {
    pub channel: Option<String>,
    pub message_id: Option<i32>,
    pub image_path: Option<String>,
    pub object: Option<String>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct MessageWithObject {
    pub channel: Option<String>,
    pub message_id: Option<i32>,
    pub message_text: Option<String>,
    pub message_date: Option<DateTime<Utc>>,
    pub object: Option<String>,
    pub confidence: Option<f64>,
}

/// Daily message count; `day` is `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct ChannelActivityItem {
    pub day: String,
    pub messages: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct TopObjectItem {
    pub object: String,
    pub mentions: i64,
}

//! Data models for Teleharvest.
//!
//! Defines the records that move through the pipeline: scraped messages
//! in the raw data lake, run manifests, image detections, and the rows
//! returned by the analytical API.
//!
//! This crate can be used with or without sqlx support:
//! - Default: No database dependencies, pure data structures
//! - With `sqlx` feature: Adds `FromRow` derive for database mapping

mod analytics;
mod detection;
mod manifest;
mod message;

pub use analytics::*;
pub use detection::*;
pub use manifest::*;
pub use message::*;

use chrono::{DateTime, Utc};

/// Current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

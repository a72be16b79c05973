//! Teleharvest - Telegram channel harvesting pipeline
//!
//! Scrapes public Telegram channels into a raw JSON data lake, loads the
//! raw messages into Postgres, models them into analytics views, enriches
//! downloaded images with object detections, and serves the results over
//! an HTTP API.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod services;
pub mod state;

pub use config::Config;
pub use error::{Error, Result};
pub use state::AppState;

//! Service layer for Teleharvest.
//!
//! Contains the pipeline stages and the analytics read service:
//! - Scraper (channel history into the raw data lake)
//! - Loader (data lake into `raw.telegram_messages`)
//! - Detector / Enricher (object detection over downloaded images)
//! - Pipeline (ordered stage runner)
//! - Analytics (read access for the HTTP API)

mod analytics;
mod detector;
mod enricher;
mod loader;
pub mod pipeline;
mod scraper;

pub use analytics::{AnalyticsStore, PgAnalyticsStore};
pub use detector::{Detector, HttpDetector};
pub use enricher::{
    image_format, is_valid_image, message_id_from_filename, EnrichSummary, Enricher,
    MIN_IMAGE_BYTES,
};
pub use loader::{load_dir, row_from_value, LoadSummary};
pub use pipeline::{Pipeline, PipelineReport, PipelineStage, StageOutcome};
pub use scraper::{image_extension, parse_date, read_channels, ScrapeOptions, ScraperService};

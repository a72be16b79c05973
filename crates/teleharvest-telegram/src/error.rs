//! Error types for teleharvest-telegram.

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Telegram asked us to back off (HTTP 429).
    #[error("Flood wait: retry after {seconds}s")]
    FloodWait { seconds: u64 },

    /// The channel has no public preview (private, renamed, or missing).
    #[error("Channel not available: {0}")]
    ChannelUnavailable(String),

    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

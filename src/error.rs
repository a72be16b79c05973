//! Error types for Teleharvest.
//!
//! Uses thiserror for ergonomic error definitions that integrate
//! with axum's response system.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Request errors
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Startup errors
    #[error("Configuration error: {0}")]
    Config(String),

    // External service errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] teleharvest_storage::Error),

    #[error("Telegram error: {0}")]
    Telegram(#[from] teleharvest_telegram::Error),

    #[error("Detector error: {0}")]
    Detector(String),

    #[error("Detector returned {status}: {body}")]
    DetectorStatus { status: u16, body: String },

    #[error("Detector request failed: {0}")]
    DetectorRequest(#[from] reqwest::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,

            // 422
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,

            // 502
            Self::Telegram(_)
            | Self::Detector(_)
            | Self::DetectorStatus { .. }
            | Self::DetectorRequest(_) => StatusCode::BAD_GATEWAY,

            // 500
            Self::Config(_)
            | Self::Database(_)
            | Self::Storage(_)
            | Self::Internal(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Telegram(_) => "TELEGRAM_ERROR",
            Self::Detector(_) | Self::DetectorStatus { .. } | Self::DetectorRequest(_) => {
                "DETECTOR_ERROR"
            }
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Other(_) => "UNKNOWN_ERROR",
        }
    }

    /// Flood wait requested by Telegram, if this is one.
    pub fn flood_wait_seconds(&self) -> Option<u64> {
        match self {
            Self::Telegram(teleharvest_telegram::Error::FloodWait { seconds }) => Some(*seconds),
            _ => None,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(code, %message, "Request failed");
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

// Convenience conversions
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

//! Scraper run manifests.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summary of one scraper run, written to `_manifests/<run_id>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub channels: Vec<String>,
    pub limit: Option<usize>,
    pub incremental: bool,
    pub since: Option<String>,
    pub until: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub results: BTreeMap<String, ChannelOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunManifest {
    /// Run id derived from the start time, e.g. `20250501T120000Z`.
    pub fn run_id_for(started_at: DateTime<Utc>) -> String {
        started_at.format("%Y%m%dT%H%M%SZ").to_string()
    }

    pub fn total_processed(&self) -> usize {
        self.results.values().map(|r| r.processed).sum()
    }

    pub fn failed_channels(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, r)| r.status.is_error())
            .map(|(c, _)| c.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOutcome {
    pub processed: usize,
    pub status: ChannelStatus,
}

/// Per-channel result: `ok`, `ok_after_wait`, or `error:<message>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChannelStatus {
    Ok,
    OkAfterWait,
    Error(String),
}

impl ChannelStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("ok"),
            Self::OkAfterWait => f.write_str("ok_after_wait"),
            Self::Error(msg) => write!(f, "error:{}", msg),
        }
    }
}

impl From<ChannelStatus> for String {
    fn from(status: ChannelStatus) -> Self {
        status.to_string()
    }
}

impl From<String> for ChannelStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "ok" => Self::Ok,
            "ok_after_wait" => Self::OkAfterWait,
            _ => Self::Error(s.strip_prefix("error:").unwrap_or(&s).to_string()),
        }
    }
}

//! Scraped message records as stored in the raw data lake.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest diagnostic excerpt kept in `_raw_repr`.
pub const RAW_REPR_MAX_CHARS: usize = 500;

/// One channel message, serialized as a single JSON line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: i64,
    pub peer_id: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub sender_id: Option<String>,
    pub text: Option<String>,
    pub views: Option<i64>,
    pub forwards: Option<i64>,
    pub reply_to_msg_id: Option<i64>,
    #[serde(default)]
    pub is_forward: bool,
    pub media: Option<MediaInfo>,
    #[serde(rename = "_raw_repr", default, skip_serializing_if = "Option::is_none")]
    pub raw_repr: Option<String>,
}

impl RawMessage {
    /// Minimal record with only an id; everything else unset.
    pub fn new(id: i64) -> Self {
        Self {
            id,
            peer_id: None,
            date: None,
            sender_id: None,
            text: None,
            views: None,
            forwards: None,
            reply_to_msg_id: None,
            is_forward: false,
            media: None,
            raw_repr: None,
        }
    }

    /// Set the diagnostic excerpt, truncated to [`RAW_REPR_MAX_CHARS`].
    pub fn with_raw_repr(mut self, repr: &str) -> Self {
        self.raw_repr = Some(repr.chars().take(RAW_REPR_MAX_CHARS).collect());
        self
    }

    pub fn has_image(&self) -> bool {
        self.media.as_ref().is_some_and(MediaInfo::is_image)
    }
}

/// Media attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "MediaRepr", into = "MediaRepr")]
pub enum MediaInfo {
    Photo,
    Document {
        mime_type: Option<String>,
        file_name: Option<String>,
    },
    /// Any other media kind (video, poll, sticker, ...), keyed by its name.
    Other(String),
}

impl MediaInfo {
    /// Photos, and documents whose MIME type is `image/*`.
    pub fn is_image(&self) -> bool {
        match self {
            Self::Photo => true,
            Self::Document { mime_type, .. } => mime_type
                .as_deref()
                .is_some_and(|m| m.starts_with("image")),
            Self::Other(_) => false,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Photo => "photo",
            Self::Document { .. } => "document",
            Self::Other(kind) => kind,
        }
    }

    /// Original file name of a document, if any.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            Self::Document { file_name, .. } => file_name.as_deref(),
            _ => None,
        }
    }
}

/// Wire shape: `{"type": "...", "mime_type": ..., "file_name": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MediaRepr {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_name: Option<String>,
}

impl From<MediaRepr> for MediaInfo {
    fn from(repr: MediaRepr) -> Self {
        match repr.kind.as_str() {
            "photo" => Self::Photo,
            "document" => Self::Document {
                mime_type: repr.mime_type,
                file_name: repr.file_name,
            },
            _ => Self::Other(repr.kind),
        }
    }
}

impl From<MediaInfo> for MediaRepr {
    fn from(media: MediaInfo) -> Self {
        match media {
            MediaInfo::Photo => Self {
                kind: "photo".to_string(),
                mime_type: None,
                file_name: None,
            },
            MediaInfo::Document {
                mime_type,
                file_name,
            } => Self {
                kind: "document".to_string(),
                mime_type,
                file_name,
            },
            MediaInfo::Other(kind) => Self {
                kind,
                mime_type: None,
                file_name: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_media_wire_shape() {
        let doc = MediaInfo::Document {
            mime_type: Some("image/png".to_string()),
            file_name: Some("scan.png".to_string()),
        };
        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            json!({"type": "document", "mime_type": "image/png", "file_name": "scan.png"})
        );
        assert_eq!(
            serde_json::to_value(MediaInfo::Photo).unwrap(),
            json!({"type": "photo"})
        );

        let other: MediaInfo = serde_json::from_value(json!({"type": "video"})).unwrap();
        assert_eq!(other, MediaInfo::Other("video".to_string()));
    }

    #[test]
    fn test_is_image() {
        assert!(MediaInfo::Photo.is_image());
        assert!(MediaInfo::Document {
            mime_type: Some("image/webp".to_string()),
            file_name: None,
        }
        .is_image());
        assert!(!MediaInfo::Document {
            mime_type: Some("application/pdf".to_string()),
            file_name: Some("leaflet.pdf".to_string()),
        }
        .is_image());
        assert!(!MediaInfo::Other("video".to_string()).is_image());
    }

    #[test]
    fn test_raw_repr_truncated() {
        let long = "x".repeat(2000);
        let msg = RawMessage::new(7).with_raw_repr(&long);
        assert_eq!(msg.raw_repr.unwrap().chars().count(), RAW_REPR_MAX_CHARS);
    }

    #[test]
    fn test_message_json_uses_raw_repr_key() {
        let msg = RawMessage::new(1).with_raw_repr("<div>");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["_raw_repr"], "<div>");
        assert_eq!(value["is_forward"], false);
        assert!(value["media"].is_null());
    }
}

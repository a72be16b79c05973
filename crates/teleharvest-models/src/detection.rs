//! Object detections produced by image enrichment.

use serde::{Deserialize, Serialize};

/// A single detected object on an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: u32,
    pub confidence: f32,
    /// Bounding box as `[x1, y1, x2, y2]` in pixels.
    pub xyxy: [f32; 4],
    pub class_name: String,
}

/// All detections for one downloaded image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDetectionRecord {
    pub channel: String,
    pub message_id: Option<i64>,
    pub image_path: String,
    pub detection: Vec<Detection>,
}

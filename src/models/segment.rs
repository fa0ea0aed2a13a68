use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::frame::Frame;

/// One frame placed on the output timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub frame: Frame,
    /// Display time in seconds.
    pub duration: f64,
    /// Seconds from the start of the composition; assigned by the composer.
    pub start_offset: f64,
    /// Image handed to the renderer: the cropped file or the original.
    pub export_path: PathBuf,
    pub was_cropped: bool,
}

impl Segment {
    /// Uncomposed segment showing the original file.
    pub fn new(frame: Frame, duration: f64) -> Self {
        let export_path = frame.file_path.clone();
        Self {
            frame,
            duration,
            start_offset: 0.0,
            export_path,
            was_cropped: false,
        }
    }

    #[must_use]
    pub fn with_cropped_path(mut self, path: PathBuf) -> Self {
        self.export_path = path;
        self.was_cropped = true;
        self
    }

    pub fn end_offset(&self) -> f64 {
        self.start_offset + self.duration
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionEntry {
    pub frame_id: String,
    pub path: PathBuf,
    pub duration: f64,
    pub start_offset: f64,
}

/// Ordered image list handed to the renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionPlan {
    pub entries: Vec<CompositionEntry>,
    pub total_duration: f64,
}

impl CompositionPlan {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

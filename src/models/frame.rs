//! Captured frame data model.
//!
//! A frame is one screenshot plus the context recorded alongside it: the
//! foreground application, window geometry and whatever the analysis pass
//! attached (summary, success flag, relevance). Frames are owned by the
//! frame store; everything in this crate works on cloned snapshots.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PipelineError, Result};

/// Relevance assumed for frames the analysis pass never scored.
pub const DEFAULT_RELEVANCE: f64 = 0.5;

/// Window geometry in logical screen points, captured with the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowBounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub screen_width: f64,
    pub screen_height: f64,
    #[serde(default)]
    pub is_fullscreen: bool,
}

impl WindowBounds {
    pub fn new(x: f64, y: f64, width: f64, height: f64, screen_width: f64, screen_height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            screen_width,
            screen_height,
            is_fullscreen: false,
        }
    }

    #[must_use]
    pub fn fullscreen(mut self) -> Self {
        self.is_fullscreen = true;
        self
    }

    fn validate(&self) -> Result<()> {
        let values = [
            self.x,
            self.y,
            self.width,
            self.height,
            self.screen_width,
            self.screen_height,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::Data(
                "window bounds contain a non-finite value".into(),
            ));
        }
        if self.screen_width <= 0.0 || self.screen_height <= 0.0 {
            return Err(PipelineError::Data(format!(
                "screen size {}x{} is not positive",
                self.screen_width, self.screen_height
            )));
        }
        if self.width < 0.0 || self.height < 0.0 {
            return Err(PipelineError::Data(format!(
                "window size {}x{} is negative",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Tri-state outcome the analysis pass attached to a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuccessState {
    Success,
    Failure,
    #[default]
    Unknown,
}

impl SuccessState {
    pub fn from_option(value: Option<bool>) -> Self {
        match value {
            Some(true) => SuccessState::Success,
            Some(false) => SuccessState::Failure,
            None => SuccessState::Unknown,
        }
    }

    pub fn as_option(&self) -> Option<bool> {
        match self {
            SuccessState::Success => Some(true),
            SuccessState::Failure => Some(false),
            SuccessState::Unknown => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SuccessState::Success => "success",
            SuccessState::Failure => "failure",
            SuccessState::Unknown => "unknown",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SuccessState::Success)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub id: String,
    pub session_id: String,
    pub frame_number: u64,
    pub timestamp: DateTime<Utc>,
    pub app_name: String,
    pub window_title: String,
    pub file_path: PathBuf,
    pub window_bounds: Option<WindowBounds>,
    pub ocr_text: Option<String>,
    pub ai_summary: Option<String>,
    #[serde(default)]
    pub is_success: SuccessState,
    pub relevance_score: Option<f64>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub analyzed: bool,
}

impl Frame {
    /// Unanalyzed frame with a fresh id; the `with_*` methods fill the rest.
    pub fn new(
        session_id: impl Into<String>,
        frame_number: u64,
        timestamp: DateTime<Utc>,
        app_name: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            frame_number,
            timestamp,
            app_name: app_name.into(),
            window_title: String::new(),
            file_path: PathBuf::new(),
            window_bounds: None,
            ocr_text: None,
            ai_summary: None,
            is_success: SuccessState::Unknown,
            relevance_score: None,
            tags: BTreeSet::new(),
            analyzed: false,
        }
    }

    #[must_use]
    pub fn with_window_title(mut self, title: impl Into<String>) -> Self {
        self.window_title = title.into();
        self
    }

    #[must_use]
    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = path.into();
        self
    }

    #[must_use]
    pub fn with_bounds(mut self, bounds: WindowBounds) -> Self {
        self.window_bounds = Some(bounds);
        self
    }

    #[must_use]
    pub fn with_ocr_text(mut self, text: impl Into<String>) -> Self {
        self.ocr_text = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.ai_summary = Some(summary.into());
        self
    }

    #[must_use]
    pub fn with_success(mut self, success: Option<bool>) -> Self {
        self.is_success = SuccessState::from_option(success);
        self
    }

    /// Sets the relevance score and marks the frame as analyzed.
    #[must_use]
    pub fn with_relevance(mut self, relevance: f64) -> Self {
        self.relevance_score = Some(relevance);
        self.analyzed = true;
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    #[must_use]
    pub fn with_analyzed(mut self, analyzed: bool) -> Self {
        self.analyzed = analyzed;
        self
    }

    /// Relevance every consumer should use: the stored score clamped into
    /// [0, 1], or [`DEFAULT_RELEVANCE`] when absent or NaN.
    pub fn effective_relevance(&self) -> f64 {
        match self.relevance_score {
            Some(score) if score.is_finite() => score.clamp(0.0, 1.0),
            _ => DEFAULT_RELEVANCE,
        }
    }

    /// Summary text worth showing as a caption, if any.
    pub fn caption_text(&self) -> Option<&str> {
        self.ai_summary
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(score) = self.relevance_score {
            if !score.is_finite() || !(0.0..=1.0).contains(&score) {
                return Err(PipelineError::Data(format!(
                    "frame {} has relevance {score} outside [0, 1]",
                    self.id
                )));
            }
        }
        if let Some(bounds) = &self.window_bounds {
            bounds
                .validate()
                .map_err(|err| PipelineError::Data(format!("frame {}: {err}", self.id)))?;
        }
        Ok(())
    }
}

/// Validates every frame in a snapshot.
pub fn validate_frames(frames: &[Frame]) -> Result<()> {
    frames.iter().try_for_each(Frame::validate)
}

/// Fails when any frame is earlier than the one before it.
pub fn ensure_sorted(frames: &[Frame]) -> Result<()> {
    match frames
        .windows(2)
        .position(|pair| pair[1].timestamp < pair[0].timestamp)
    {
        Some(index) => Err(PipelineError::Data(format!(
            "frames are not sorted by timestamp: frame {} ({}) precedes frame {} ({})",
            frames[index].id,
            frames[index].timestamp.to_rfc3339(),
            frames[index + 1].id,
            frames[index + 1].timestamp.to_rfc3339(),
        ))),
        None => Ok(()),
    }
}

/// Returns a copy of `frames` ordered by timestamp, ties by frame number.
pub fn sorted_by_time(frames: &[Frame]) -> Vec<Frame> {
    let mut sorted = frames.to_vec();
    sorted.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then(a.frame_number.cmp(&b.frame_number))
    });
    sorted
}

use std::fmt::Write;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::models::{OverlayKind, OverlayPosition, OverlayRecord, Segment};

/// Which overlays to emit and how to render their text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub captions: bool,
    pub timestamps: bool,
    pub success_indicator: bool,
    pub progress_bar: bool,
    /// Relevance a successful frame needs before it earns the indicator.
    /// Kept separate from the hero selection threshold.
    pub success_min_relevance: f64,
    /// `chrono` format string for timestamp overlays
    pub timestamp_format: String,
    /// Zone timestamp overlays are shown in
    pub timestamp_zone: TimestampZone,
    pub success_text: String,
}

/// Wall clock used for timestamp overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "minutes")]
pub enum TimestampZone {
    #[default]
    Utc,
    /// The machine's local time zone at render time
    Local,
    /// Minutes east of UTC, e.g. `-300` for New York in winter
    FixedOffset(i32),
}

impl TimestampZone {
    fn fixed_offset(minutes: i32) -> Option<FixedOffset> {
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            captions: true,
            timestamps: true,
            success_indicator: true,
            progress_bar: true,
            success_min_relevance: 0.8,
            timestamp_format: "%Y-%m-%d %H:%M:%S".to_string(),
            timestamp_zone: TimestampZone::Utc,
            success_text: "✓".to_string(),
        }
    }
}

impl OverlayConfig {
    pub fn validate(&self) -> Result<()> {
        let gate = self.success_min_relevance;
        if !gate.is_finite() || !(0.0..=1.0).contains(&gate) {
            return Err(PipelineError::InvalidConfig(format!(
                "success_min_relevance must be within [0, 1], got {gate}"
            )));
        }
        if self.timestamps {
            if self.timestamp_format.trim().is_empty() {
                return Err(PipelineError::InvalidConfig(
                    "timestamp_format must not be empty when timestamps are enabled".into(),
                ));
            }
            if StrftimeItems::new(&self.timestamp_format).any(|item| matches!(item, Item::Error)) {
                return Err(PipelineError::InvalidConfig(format!(
                    "timestamp_format '{}' is not a valid strftime pattern",
                    self.timestamp_format
                )));
            }
            if let TimestampZone::FixedOffset(minutes) = self.timestamp_zone {
                if TimestampZone::fixed_offset(minutes).is_none() {
                    return Err(PipelineError::InvalidConfig(format!(
                        "timestamp offset of {minutes} minutes is outside a day"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Formats in the configured zone and pattern, falling back to RFC 3339.
fn format_timestamp(timestamp: &DateTime<Utc>, config: &OverlayConfig) -> String {
    let pattern = config.timestamp_format.as_str();
    let mut out = String::new();
    let written = match config.timestamp_zone {
        TimestampZone::Utc => write!(out, "{}", timestamp.format(pattern)),
        TimestampZone::Local => write!(out, "{}", timestamp.with_timezone(&Local).format(pattern)),
        TimestampZone::FixedOffset(minutes) => match TimestampZone::fixed_offset(minutes) {
            Some(offset) => write!(out, "{}", timestamp.with_timezone(&offset).format(pattern)),
            None => write!(out, "{}", timestamp.format(pattern)),
        },
    };
    if written.is_err() {
        return timestamp.to_rfc3339();
    }
    out
}

/// Builds the overlay records for composed segments.
///
/// Per-segment overlays share their segment's window exactly. The progress
/// bar spans `[0, total_duration]` and is emitted once, only when there is
/// something to show.
pub fn schedule(segments: &[Segment], total_duration: f64, config: &OverlayConfig) -> Vec<OverlayRecord> {
    let mut overlays = Vec::new();

    for (index, segment) in segments.iter().enumerate() {
        let frame = &segment.frame;
        let record = |kind, text: Option<String>, position| OverlayRecord {
            kind,
            text,
            start_time: segment.start_offset,
            duration: segment.duration,
            position,
            segment_index: Some(index),
        };

        if config.captions {
            if let Some(caption) = frame.caption_text() {
                overlays.push(record(
                    OverlayKind::Caption,
                    Some(caption.to_string()),
                    OverlayPosition::Bottom,
                ));
            }
        }

        if config.timestamps {
            let formatted = format_timestamp(&frame.timestamp, config);
            overlays.push(record(
                OverlayKind::Timestamp,
                Some(formatted),
                OverlayPosition::TopLeft,
            ));
        }

        if config.success_indicator
            && frame.is_success.is_success()
            && frame.effective_relevance() >= config.success_min_relevance
        {
            overlays.push(record(
                OverlayKind::SuccessIndicator,
                Some(config.success_text.clone()),
                OverlayPosition::TopRight,
            ));
        }
    }

    if config.progress_bar && !segments.is_empty() {
        overlays.push(OverlayRecord {
            kind: OverlayKind::ProgressBar,
            text: None,
            start_time: 0.0,
            duration: total_duration,
            position: OverlayPosition::BottomEdge,
            segment_index: None,
        });
    }

    overlays
}

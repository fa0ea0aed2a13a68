use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::models::{Frame, DEFAULT_RELEVANCE};

/// Maps relevance to on-screen time: important frames stay up longer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub min_duration_secs: f64,
    pub max_duration_secs: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_duration_secs: 1.0,
            max_duration_secs: 3.0,
        }
    }
}

impl PacingConfig {
    pub fn validate(&self) -> Result<()> {
        let (min, max) = (self.min_duration_secs, self.max_duration_secs);
        if !min.is_finite() || !max.is_finite() || min <= 0.0 || max < min {
            return Err(PipelineError::InvalidConfig(format!(
                "pacing needs 0 < min_duration_secs <= max_duration_secs, got {min} and {max}"
            )));
        }
        Ok(())
    }

    /// Display duration in seconds for a relevance score.
    ///
    /// Linear in the clamped relevance, so monotonic non-decreasing; absent
    /// or NaN relevance counts as [`DEFAULT_RELEVANCE`].
    pub fn duration_for(&self, relevance: Option<f64>) -> f64 {
        let relevance = relevance
            .filter(|r| !r.is_nan())
            .unwrap_or(DEFAULT_RELEVANCE)
            .clamp(0.0, 1.0);
        let span = self.max_duration_secs - self.min_duration_secs;
        (self.min_duration_secs + span * relevance)
            .clamp(self.min_duration_secs, self.max_duration_secs)
    }

    pub fn frame_duration(&self, frame: &Frame) -> f64 {
        self.duration_for(frame.relevance_score)
    }
}

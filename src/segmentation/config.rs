use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Tunables for whole-session task segmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// A gap longer than this always starts a new cluster
    pub time_gap_threshold_secs: f64,

    /// An app switch starts a new cluster once the gap exceeds
    /// `time_gap_threshold_secs * app_switch_weight`
    pub app_switch_weight: f64,

    /// Clusters smaller than this are dropped by the AI refinement pass
    pub min_cluster_frames: usize,

    /// Frames sampled per cluster for the coherence judgment
    pub max_sample_frames: usize,

    /// Per-attempt timeout for the coherence judgment
    pub judge_timeout_secs: u64,

    /// Attempts per cluster before the default judgment is applied
    pub judge_max_attempts: u32,

    /// Delay before the first retry; doubles on each further attempt
    pub judge_backoff_ms: u64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            time_gap_threshold_secs: 300.0,
            app_switch_weight: 0.5,
            min_cluster_frames: 3,
            max_sample_frames: 5,
            judge_timeout_secs: 30,
            judge_max_attempts: 2,
            judge_backoff_ms: 500,
        }
    }
}

impl SegmentationConfig {
    /// Gap above which an app switch splits the cluster.
    pub fn app_switch_gap_secs(&self) -> f64 {
        self.time_gap_threshold_secs * self.app_switch_weight
    }

    pub fn validate(&self) -> Result<()> {
        if !self.time_gap_threshold_secs.is_finite() || self.time_gap_threshold_secs < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "time_gap_threshold_secs must be a non-negative number, got {}",
                self.time_gap_threshold_secs
            )));
        }
        if !self.app_switch_weight.is_finite() || self.app_switch_weight < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "app_switch_weight must be a non-negative number, got {}",
                self.app_switch_weight
            )));
        }
        if self.max_sample_frames == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_sample_frames must be at least 1".into(),
            ));
        }
        if self.judge_timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "judge_timeout_secs must be at least 1".into(),
            ));
        }
        if self.judge_max_attempts == 0 {
            return Err(PipelineError::InvalidConfig(
                "judge_max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Tunables for grouping ad-hoc query results for display.
///
/// Kept separate from [`SegmentationConfig`]: the two thresholds are tuned
/// for different uses and neither is derived from the other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximityConfig {
    pub gap_threshold_secs: f64,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            gap_threshold_secs: 600.0,
        }
    }
}

impl ProximityConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.gap_threshold_secs.is_finite() || self.gap_threshold_secs < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "gap_threshold_secs must be a non-negative number, got {}",
                self.gap_threshold_secs
            )));
        }
        Ok(())
    }
}

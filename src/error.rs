//! Error taxonomy for the segmentation and assembly pipeline.
//!
//! Fatal conditions are [`PipelineError`] variants and halt the invocation.
//! Per-cluster and per-frame problems are recorded as values
//! ([`ClusterDrop`], [`CropFailure`]) so one bad item never aborts a batch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Input frames are malformed, unsorted, or none are eligible.
    #[error("invalid frame data: {0}")]
    Data(String),

    /// The selection mode matched no frame. Nothing can be rendered.
    #[error("selection '{mode}' (threshold {threshold:.2}) matched none of {eligible} analyzed frames")]
    EmptySelection {
        mode: String,
        threshold: f64,
        eligible: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("operation cancelled")]
    Cancelled,

    /// Failure inside a collaborator (frame store, settings file).
    #[error(transparent)]
    External(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn is_empty_selection(&self) -> bool {
        matches!(self, PipelineError::EmptySelection { .. })
    }
}

/// Why a coherence judgment could not be obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "detail")]
pub enum JudgeFailure {
    /// The collaborator returned an error on every attempt.
    Transport(String),
    /// No reply within the configured timeout.
    Timeout,
    /// A reply arrived but could not be read as a judgment.
    Parse(String),
}

impl std::fmt::Display for JudgeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JudgeFailure::Transport(msg) => write!(f, "judge call failed: {msg}"),
            JudgeFailure::Timeout => write!(f, "judge call timed out"),
            JudgeFailure::Parse(msg) => write!(f, "unparseable judge reply: {msg}"),
        }
    }
}

/// The AI pass could not confirm a cluster as one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "detail")]
pub enum SegmentationAmbiguity {
    /// The judge answered and said the frames are not one task.
    Incoherent,
    /// No usable answer; the default failure judgment was applied.
    JudgeUnavailable(JudgeFailure),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "detail")]
pub enum DropReason {
    /// Fewer frames than the refinement minimum.
    TooSmall,
    Ambiguous(SegmentationAmbiguity),
}

impl DropReason {
    pub fn is_judge_failure(&self) -> bool {
        matches!(
            self,
            DropReason::Ambiguous(SegmentationAmbiguity::JudgeUnavailable(_))
        )
    }
}

/// A raw cluster the refinement pass excluded from its output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDrop {
    pub cluster_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub frame_count: usize,
    pub reason: DropReason,
}

/// A frame whose pixel crop failed and fell back to the original file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropFailure {
    pub frame_id: String,
    pub message: String,
}

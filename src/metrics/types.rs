use serde::{Deserialize, Serialize};

use crate::error::ClusterDrop;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinementCounters {
    pub clusters_judged: u64,
    pub clusters_kept: u64,
    pub dropped_too_small: u64,
    pub dropped_incoherent: u64,
    /// Clusters excluded because no usable judgment arrived. A high value
    /// here looks like data loss to users and deserves attention.
    pub dropped_judge_failure: u64,
    pub judge_retries: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblyCounters {
    pub assemblies_completed: u64,
    pub assemblies_empty: u64,
    pub frames_composed: u64,
    pub crops_succeeded: u64,
    pub crop_fallbacks: u64,
    pub crops_skipped: u64,
}

/// Outcome of one frame in the crop stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropOutcome {
    Cropped,
    /// Execution failed; the original file was used
    FellBack,
    /// The planner chose not to crop
    Skipped,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub refinement: RefinementCounters,
    pub assembly: AssemblyCounters,
    pub recent_drops: Vec<ClusterDrop>,
}

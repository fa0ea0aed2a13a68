use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::frame::{Frame, SuccessState};

/// A contiguous run of frames treated as one user task.
///
/// Clusters are derived values: they own cloned frames and have no identity
/// beyond the run that produced them unless the caller persists them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCluster {
    pub id: String,
    pub session_id: String,
    pub frames: Vec<Frame>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// True only once a coherence judgment confirmed the grouping.
    pub is_coherent: bool,
    pub name: String,
    pub description: String,
    pub success_state: SuccessState,
    pub relevance: f64,
}

impl TaskCluster {
    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frame_ids(&self) -> Vec<String> {
        self.frames.iter().map(|frame| frame.id.clone()).collect()
    }
}

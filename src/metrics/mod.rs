mod types;

pub use types::{AssemblyCounters, CropOutcome, MetricsSnapshot, RefinementCounters};

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{ClusterDrop, DropReason};

const MAX_RECENT_DROPS: usize = 20;

/// Counters for the pipeline's non-fatal outcomes.
///
/// Cheap to clone; clones share the same state.
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

#[derive(Default)]
struct MetricsState {
    refinement: RefinementCounters,
    assembly: AssemblyCounters,
    recent_drops: Vec<ClusterDrop>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsState {
                recent_drops: Vec::with_capacity(MAX_RECENT_DROPS),
                ..MetricsState::default()
            })),
        }
    }

    pub async fn record_judged(&self) {
        self.inner.lock().await.refinement.clusters_judged += 1;
    }

    pub async fn record_judge_retry(&self) {
        self.inner.lock().await.refinement.judge_retries += 1;
    }

    pub async fn record_cluster_kept(&self) {
        self.inner.lock().await.refinement.clusters_kept += 1;
    }

    pub async fn record_cluster_drop(&self, drop: &ClusterDrop) {
        let mut state = self.inner.lock().await;

        match &drop.reason {
            DropReason::TooSmall => state.refinement.dropped_too_small += 1,
            reason if reason.is_judge_failure() => state.refinement.dropped_judge_failure += 1,
            DropReason::Ambiguous(_) => state.refinement.dropped_incoherent += 1,
        }

        state.recent_drops.push(drop.clone());
        if state.recent_drops.len() > MAX_RECENT_DROPS {
            state.recent_drops.remove(0);
        }
    }

    pub async fn record_crop(&self, outcome: CropOutcome) {
        let mut state = self.inner.lock().await;
        match outcome {
            CropOutcome::Cropped => state.assembly.crops_succeeded += 1,
            CropOutcome::FellBack => state.assembly.crop_fallbacks += 1,
            CropOutcome::Skipped => state.assembly.crops_skipped += 1,
        }
    }

    pub async fn record_assembly(&self, frames_composed: usize) {
        let mut state = self.inner.lock().await;
        state.assembly.assemblies_completed += 1;
        state.assembly.frames_composed += frames_composed as u64;
    }

    pub async fn record_empty_selection(&self) {
        self.inner.lock().await.assembly.assemblies_empty += 1;
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let state = self.inner.lock().await;
        MetricsSnapshot {
            refinement: state.refinement.clone(),
            assembly: state.assembly.clone(),
            recent_drops: state.recent_drops.clone(),
        }
    }

    pub async fn reset(&self) {
        let mut state = self.inner.lock().await;
        state.refinement = RefinementCounters::default();
        state.assembly = AssemblyCounters::default();
        state.recent_drops.clear();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MetricsCollector {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{JudgeFailure, SegmentationAmbiguity};
    use chrono::Utc;

    fn drop_with(reason: DropReason) -> ClusterDrop {
        ClusterDrop {
            cluster_id: "c".into(),
            start_time: Utc::now(),
            end_time: Utc::now(),
            frame_count: 4,
            reason,
        }
    }

    #[tokio::test]
    async fn drops_are_counted_by_reason() {
        let metrics = MetricsCollector::new();
        metrics.record_cluster_drop(&drop_with(DropReason::TooSmall)).await;
        metrics
            .record_cluster_drop(&drop_with(DropReason::Ambiguous(
                SegmentationAmbiguity::Incoherent,
            )))
            .await;
        metrics
            .record_cluster_drop(&drop_with(DropReason::Ambiguous(
                SegmentationAmbiguity::JudgeUnavailable(JudgeFailure::Timeout),
            )))
            .await;

        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.refinement.dropped_too_small, 1);
        assert_eq!(snapshot.refinement.dropped_incoherent, 1);
        assert_eq!(snapshot.refinement.dropped_judge_failure, 1);
        assert_eq!(snapshot.recent_drops.len(), 3);
    }

    #[tokio::test]
    async fn recent_drops_are_bounded_and_reset_clears() {
        let metrics = MetricsCollector::new();
        for _ in 0..(MAX_RECENT_DROPS + 5) {
            metrics.record_cluster_drop(&drop_with(DropReason::TooSmall)).await;
        }
        let clone = metrics.clone();
        clone.record_crop(CropOutcome::FellBack).await;

        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.recent_drops.len(), MAX_RECENT_DROPS);
        assert_eq!(snapshot.assembly.crop_fallbacks, 1);

        metrics.reset().await;
        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.refinement, RefinementCounters::default());
        assert!(snapshot.recent_drops.is_empty());
    }
}

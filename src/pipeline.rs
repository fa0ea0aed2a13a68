//! End-to-end orchestration.
//!
//! [`DemoPipeline`] owns a frozen copy of the settings plus the two AI and
//! pixel collaborators. It exposes the three entry points callers need:
//! whole-session segmentation, display grouping for query results, and
//! demo assembly.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::cropping::{execute_crops, plan_crop, CropExecutor, CropJob, CropReason};
use crate::db::FrameStore;
use crate::error::{CropFailure, PipelineError, Result};
use crate::judge::ClusterJudge;
use crate::metrics::{CropOutcome, MetricsCollector};
use crate::models::{validate_frames, CompositionPlan, Frame, OverlayRecord, Segment, TaskCluster};
use crate::segmentation::{group_by_proximity, segment_session, RefinementOutcome};
use crate::selection::{select_frames, SelectionMode};
use crate::settings::PipelineSettings;
use crate::timeline::{compose, schedule};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// What to assemble.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblyRequest {
    pub mode: SelectionMode,
    /// Required when `mode` is [`SelectionMode::Custom`]
    pub custom_threshold: Option<f64>,
}

impl AssemblyRequest {
    pub fn new(mode: SelectionMode) -> Self {
        Self {
            mode,
            custom_threshold: None,
        }
    }

    pub fn custom(threshold: f64) -> Self {
        Self {
            mode: SelectionMode::Custom,
            custom_threshold: Some(threshold),
        }
    }
}

/// How the assembly went, for callers and logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblyReport {
    pub mode: SelectionMode,
    pub threshold: f64,
    pub frames_considered: usize,
    pub frames_selected: usize,
    pub frames_cropped: usize,
    /// Frames shown uncropped by decision, keyed by why
    pub passthrough: BTreeMap<CropReason, usize>,
    /// Frames whose crop was attempted and failed
    pub crop_failures: Vec<CropFailure>,
}

/// Everything the renderer needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblyOutput {
    pub plan: CompositionPlan,
    pub overlays: Vec<OverlayRecord>,
    pub segments: Vec<Segment>,
    pub report: AssemblyReport,
}

impl AssemblyOutput {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

pub struct DemoPipeline {
    settings: PipelineSettings,
    metrics: MetricsCollector,
    judge: Arc<dyn ClusterJudge>,
    cropper: Arc<dyn CropExecutor>,
}

impl DemoPipeline {
    pub fn new(
        settings: PipelineSettings,
        judge: Arc<dyn ClusterJudge>,
        cropper: Arc<dyn CropExecutor>,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            metrics: MetricsCollector::new(),
            judge,
            cropper,
        })
    }

    /// Shares an existing collector instead of a fresh one.
    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Loads a session from `store` and segments it into coherent tasks.
    pub async fn auto_segment(
        &self,
        store: &dyn FrameStore,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> Result<RefinementOutcome> {
        let frames = store
            .frames_for_session(session_id)
            .await
            .with_context(|| format!("failed to load frames for session {session_id}"))?;
        log_debug!("loaded {} frames for session {session_id}", frames.len());
        self.segment(&frames, cancel).await
    }

    /// Segments a frame snapshot: deterministic split, then AI refinement.
    pub async fn segment(&self, frames: &[Frame], cancel: &CancellationToken) -> Result<RefinementOutcome> {
        validate_frames(frames)?;
        segment_session(
            frames,
            self.judge.as_ref(),
            &self.settings.segmentation,
            &self.metrics,
            cancel,
        )
        .await
    }

    /// Groups query results by time proximity for display. Never calls the judge.
    pub fn group_for_display(&self, frames: &[Frame]) -> Result<Vec<TaskCluster>> {
        group_by_proximity(frames, &self.settings.proximity)
    }

    /// Selects, paces, crops and lays out frames for a demo video.
    ///
    /// Fails with [`PipelineError::Data`] when no frame is analyzed and with
    /// [`PipelineError::EmptySelection`] when analyzed frames exist but none
    /// meet the mode's threshold. Crop failures only degrade their frame.
    pub async fn assemble(
        &self,
        frames: &[Frame],
        request: &AssemblyRequest,
        cancel: &CancellationToken,
    ) -> Result<AssemblyOutput> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        validate_frames(frames)?;

        let analyzed = frames.iter().filter(|frame| frame.analyzed).count();
        if analyzed == 0 {
            return Err(PipelineError::Data(format!(
                "none of {} frames has been analyzed",
                frames.len()
            )));
        }

        let settings = &self.settings;
        let threshold = settings
            .selection
            .threshold_for(request.mode, request.custom_threshold)?;
        let selected = select_frames(frames, threshold);
        if selected.is_empty() {
            log_warn!(
                "selection '{}' at {threshold:.2} matched none of {analyzed} analyzed frames",
                request.mode
            );
            self.metrics.record_empty_selection().await;
            return Err(PipelineError::EmptySelection {
                mode: request.mode.to_string(),
                threshold,
                eligible: analyzed,
            });
        }

        let mut segments: Vec<Segment> = selected
            .into_iter()
            .map(|frame| {
                let duration = settings.pacing.frame_duration(&frame);
                Segment::new(frame, duration)
            })
            .collect();

        let mut report = AssemblyReport {
            mode: request.mode,
            threshold,
            frames_considered: frames.len(),
            frames_selected: segments.len(),
            ..AssemblyReport::default()
        };

        let mut jobs = Vec::new();
        for (index, segment) in segments.iter().enumerate() {
            let plan = plan_crop(&segment.frame, &settings.crop);
            match plan.rect {
                Some(rect) => jobs.push(CropJob {
                    index,
                    frame_id: segment.frame.id.clone(),
                    input_path: segment.frame.file_path.clone(),
                    rect,
                }),
                None => {
                    *report.passthrough.entry(plan.reason).or_insert(0) += 1;
                    self.metrics.record_crop(CropOutcome::Skipped).await;
                }
            }
        }

        let results = execute_crops(
            jobs,
            Arc::clone(&self.cropper),
            settings.crop.max_concurrency,
            cancel,
        )
        .await?;

        for result in results {
            match result.outcome {
                Ok(path) => {
                    if let Some(segment) = segments.get_mut(result.index) {
                        segment.export_path = path;
                        segment.was_cropped = true;
                        report.frames_cropped += 1;
                    }
                    self.metrics.record_crop(CropOutcome::Cropped).await;
                }
                Err(failure) => {
                    self.metrics.record_crop(CropOutcome::FellBack).await;
                    report.crop_failures.push(failure);
                }
            }
        }

        let plan = compose(&mut segments);
        let overlays = schedule(&segments, plan.total_duration, &settings.overlay);
        self.metrics.record_assembly(segments.len()).await;

        log_info!(
            "assembled {} frames ({} cropped, {} crop failures) into {:.1}s with {} overlays",
            segments.len(),
            report.frames_cropped,
            report.crop_failures.len(),
            plan.total_duration,
            overlays.len()
        );

        Ok(AssemblyOutput {
            plan,
            overlays,
            segments,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cropping::CropRect;
    use crate::models::WindowBounds;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use std::path::{Path, PathBuf};

    struct NeverJudge;

    #[async_trait]
    impl ClusterJudge for NeverJudge {
        async fn judge_cluster(&self, _prompt: &str, _samples: &[Frame]) -> anyhow::Result<String> {
            anyhow::bail!("judge should not be called")
        }
    }

    struct RenamingCropper;

    impl CropExecutor for RenamingCropper {
        fn crop_to_window(&self, _frame_id: &str, input_path: &Path, _rect: &CropRect) -> anyhow::Result<PathBuf> {
            Ok(input_path.with_extension("cropped.png"))
        }
    }

    fn pipeline() -> DemoPipeline {
        DemoPipeline::new(
            PipelineSettings::default(),
            Arc::new(NeverJudge),
            Arc::new(RenamingCropper),
        )
        .unwrap()
    }

    fn frame(n: u64, relevance: f64) -> Frame {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        Frame::new("s", n, base + Duration::seconds(n as i64 * 30), "Terminal")
            .with_file_path(format!("/captures/{n}.png"))
            .with_relevance(relevance)
    }

    #[tokio::test]
    async fn assemble_crops_windowed_frames_and_passes_fullscreen_through() {
        let frames = vec![
            frame(1, 0.9).with_bounds(WindowBounds::new(100.0, 100.0, 800.0, 600.0, 1920.0, 1080.0)),
            frame(2, 0.8).with_bounds(
                WindowBounds::new(0.0, 0.0, 1920.0, 1080.0, 1920.0, 1080.0).fullscreen(),
            ),
            frame(3, 0.2),
        ];
        let output = pipeline()
            .assemble(&frames, &AssemblyRequest::new(SelectionMode::Hero), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output.segments.len(), 2);
        assert!(output.segments[0].was_cropped);
        assert_eq!(output.plan.entries[0].path, PathBuf::from("/captures/1.cropped.png"));
        assert!(!output.segments[1].was_cropped);
        assert_eq!(output.report.passthrough.get(&CropReason::Fullscreen), Some(&1));
        assert_eq!(output.report.frames_cropped, 1);
        assert!((output.plan.total_duration - (2.8 + 2.6)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unanalyzed_input_is_a_data_error() {
        let frames = vec![Frame::new("s", 1, Utc::now(), "Terminal")];
        let err = pipeline()
            .assemble(&frames, &AssemblyRequest::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Data(_)));
    }

    #[tokio::test]
    async fn custom_mode_without_threshold_is_rejected() {
        let frames = vec![frame(1, 0.9)];
        let request = AssemblyRequest {
            mode: SelectionMode::Custom,
            custom_threshold: None,
        };
        let err = pipeline()
            .assemble(&frames, &request, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn display_grouping_uses_the_proximity_threshold() {
        let frames = vec![frame(0, 0.5), frame(10, 0.5), frame(40, 0.5)];
        // 300s then 900s apart; only the second gap exceeds 600s.
        let groups = pipeline().group_for_display(&frames).unwrap();
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn invalid_settings_are_rejected_up_front() {
        let mut settings = PipelineSettings::default();
        settings.crop.max_concurrency = 0;
        let result = DemoPipeline::new(settings, Arc::new(NeverJudge), Arc::new(RenamingCropper));
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }
}

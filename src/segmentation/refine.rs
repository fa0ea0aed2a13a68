//! AI coherence refinement for whole-session segmentation.
//!
//! Raw clusters from the split pass are judged one at a time. Only clusters
//! the judge confirms as a single task survive; everything else is recorded
//! as a [`ClusterDrop`] and counted in the metrics.

use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{
    ClusterDrop, DropReason, JudgeFailure, PipelineError, Result, SegmentationAmbiguity,
};
use crate::judge::{build_prompt, parse_judgment, ClusterJudge, ClusterJudgment, JudgeReply};
use crate::metrics::MetricsCollector;
use crate::models::{Frame, SuccessState, TaskCluster};
use crate::segmentation::algorithm::segment_frames;
use crate::segmentation::config::SegmentationConfig;
use crate::segmentation::sampling::sample_evenly;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Clusters that survived refinement plus the ones that did not.
#[derive(Debug, Clone, Default)]
pub struct RefinementOutcome {
    pub clusters: Vec<TaskCluster>,
    pub dropped: Vec<ClusterDrop>,
}

impl RefinementOutcome {
    /// Clusters excluded because the judge was unavailable or unreadable.
    pub fn dropped_for_judge_failure(&self) -> usize {
        self.dropped
            .iter()
            .filter(|drop| drop.reason.is_judge_failure())
            .count()
    }
}

/// Splits a session's frames and keeps the clusters the judge confirms.
pub async fn segment_session(
    frames: &[Frame],
    judge: &dyn ClusterJudge,
    config: &SegmentationConfig,
    metrics: &MetricsCollector,
    cancel: &CancellationToken,
) -> Result<RefinementOutcome> {
    let raw = segment_frames(frames, config)?;
    refine_clusters(raw, judge, config, metrics, cancel).await
}

/// Judges each raw cluster sequentially.
///
/// A failed, timed-out or unparseable judgment excludes only that cluster.
/// Cancellation is checked between clusters.
pub async fn refine_clusters(
    raw: Vec<TaskCluster>,
    judge: &dyn ClusterJudge,
    config: &SegmentationConfig,
    metrics: &MetricsCollector,
    cancel: &CancellationToken,
) -> Result<RefinementOutcome> {
    config.validate()?;

    let total = raw.len();
    let mut outcome = RefinementOutcome::default();

    for cluster in raw {
        if cancel.is_cancelled() {
            log_info!("refinement cancelled after {} of {} clusters", outcome.clusters.len() + outcome.dropped.len(), total);
            return Err(PipelineError::Cancelled);
        }

        if cluster.frame_count() < config.min_cluster_frames {
            let drop = drop_record(&cluster, DropReason::TooSmall);
            metrics.record_cluster_drop(&drop).await;
            outcome.dropped.push(drop);
            continue;
        }

        let samples: Vec<Frame> = sample_evenly(&cluster.frames, config.max_sample_frames)
            .into_iter()
            .cloned()
            .collect();
        let sample_refs: Vec<&Frame> = samples.iter().collect();
        let prompt = build_prompt(&sample_refs);

        metrics.record_judged().await;
        match request_judgment(judge, &prompt, &samples, config, metrics, cancel).await {
            JudgeAttempt::Cancelled => {
                log_info!(
                    "refinement cancelled while judging cluster {} of {}",
                    outcome.clusters.len() + outcome.dropped.len() + 1,
                    total
                );
                return Err(PipelineError::Cancelled);
            }
            JudgeAttempt::Judged(judgment) if judgment.is_coherent_task => {
                metrics.record_cluster_kept().await;
                outcome.clusters.push(apply_judgment(cluster, judgment));
            }
            JudgeAttempt::Judged(_) => {
                let drop = drop_record(
                    &cluster,
                    DropReason::Ambiguous(SegmentationAmbiguity::Incoherent),
                );
                metrics.record_cluster_drop(&drop).await;
                outcome.dropped.push(drop);
            }
            JudgeAttempt::Failed(failure) => {
                log_warn!(
                    "cluster {} ({} frames) excluded, default judgment applied: {failure}",
                    cluster.id,
                    cluster.frame_count()
                );
                let drop = drop_record(
                    &cluster,
                    DropReason::Ambiguous(SegmentationAmbiguity::JudgeUnavailable(failure)),
                );
                metrics.record_cluster_drop(&drop).await;
                outcome.dropped.push(drop);
            }
        }
    }

    log_info!(
        "refinement kept {} of {} clusters ({} dropped for judge failure)",
        outcome.clusters.len(),
        total,
        outcome.dropped_for_judge_failure()
    );

    Ok(outcome)
}

enum JudgeAttempt {
    Judged(ClusterJudgment),
    Failed(JudgeFailure),
    /// The token fired before a usable answer arrived
    Cancelled,
}

/// Calls the judge with a timeout, retrying transport failures and timeouts
/// with doubling backoff. Parse failures are returned immediately.
async fn request_judgment(
    judge: &dyn ClusterJudge,
    prompt: &str,
    samples: &[Frame],
    config: &SegmentationConfig,
    metrics: &MetricsCollector,
    cancel: &CancellationToken,
) -> JudgeAttempt {
    let timeout = Duration::from_secs(config.judge_timeout_secs);
    let mut backoff = Duration::from_millis(config.judge_backoff_ms);
    let mut last_failure = JudgeFailure::Timeout;

    for attempt in 1..=config.judge_max_attempts {
        if attempt > 1 {
            if cancel.is_cancelled() {
                return JudgeAttempt::Cancelled;
            }
            metrics.record_judge_retry().await;
            tokio::select! {
                _ = cancel.cancelled() => return JudgeAttempt::Cancelled,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff *= 2;
        }

        match tokio::time::timeout(timeout, judge.judge_cluster(prompt, samples)).await {
            Ok(Ok(reply)) => {
                return match parse_judgment(&reply) {
                    JudgeReply::Parsed(judgment) => JudgeAttempt::Judged(judgment),
                    JudgeReply::ParseError(message) => JudgeAttempt::Failed(JudgeFailure::Parse(message)),
                };
            }
            Ok(Err(err)) => {
                log_warn!("judge attempt {attempt}/{} failed: {err:#}", config.judge_max_attempts);
                last_failure = JudgeFailure::Transport(format!("{err:#}"));
            }
            Err(_) => {
                log_warn!(
                    "judge attempt {attempt}/{} timed out (> {}s)",
                    config.judge_max_attempts,
                    config.judge_timeout_secs
                );
                last_failure = JudgeFailure::Timeout;
            }
        }
    }

    JudgeAttempt::Failed(last_failure)
}

fn apply_judgment(mut cluster: TaskCluster, judgment: ClusterJudgment) -> TaskCluster {
    cluster.is_coherent = true;
    if !judgment.task_name.is_empty() {
        cluster.name = judgment.task_name;
    }
    if !judgment.description.is_empty() {
        cluster.description = judgment.description;
    }
    cluster.success_state = SuccessState::from_option(judgment.success);
    cluster.relevance = judgment.relevance;
    cluster
}

fn drop_record(cluster: &TaskCluster, reason: DropReason) -> ClusterDrop {
    ClusterDrop {
        cluster_id: cluster.id.clone(),
        start_time: cluster.start_time,
        end_time: cluster.end_time,
        frame_count: cluster.frame_count(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + ChronoDuration::seconds(secs)
    }

    /// Replays canned replies in order and records the sample sizes it saw.
    struct ScriptedJudge {
        replies: Mutex<Vec<anyhow::Result<String>>>,
        sample_sizes: Mutex<Vec<usize>>,
        calls: AtomicUsize,
    }

    impl ScriptedJudge {
        fn new(replies: Vec<anyhow::Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().rev().collect()),
                sample_sizes: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ClusterJudge for ScriptedJudge {
        async fn judge_cluster(&self, _prompt: &str, samples: &[Frame]) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.sample_sizes.lock().unwrap().push(samples.len());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(anyhow::anyhow!("no scripted reply left")))
        }
    }

    struct SlowJudge;

    #[async_trait]
    impl ClusterJudge for SlowJudge {
        async fn judge_cluster(&self, _prompt: &str, _samples: &[Frame]) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(r#"{"isCoherentTask": true}"#.into())
        }
    }

    fn coherent(name: &str) -> anyhow::Result<String> {
        Ok(format!(
            r#"{{"isCoherentTask": true, "taskName": "{name}", "description": "did {name}", "success": true, "relevance": 0.9}}"#
        ))
    }

    /// Three clusters: 6 frames, 2 frames, 4 frames, separated by long gaps.
    fn session_frames() -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut n = 0;
        for (start, count) in [(0, 6), (1000, 2), (2000, 4)] {
            for i in 0..count {
                n += 1;
                frames.push(Frame::new("s", n, at(start + i * 20), "Code").with_relevance(0.6));
            }
        }
        frames
    }

    fn fast_config() -> SegmentationConfig {
        SegmentationConfig {
            judge_backoff_ms: 1,
            ..SegmentationConfig::default()
        }
    }

    #[tokio::test]
    async fn keeps_only_coherent_clusters_and_drops_small_ones() {
        let judge = ScriptedJudge::new(vec![
            coherent("Refactor parser"),
            Ok(r#"{"isCoherentTask": false, "relevance": 0.2}"#.into()),
        ]);
        let metrics = MetricsCollector::new();

        let outcome = segment_session(
            &session_frames(),
            &judge,
            &fast_config(),
            &metrics,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.clusters.len(), 1);
        let kept = &outcome.clusters[0];
        assert!(kept.is_coherent);
        assert_eq!(kept.name, "Refactor parser");
        assert_eq!(kept.success_state, SuccessState::Success);
        assert_eq!(kept.relevance, 0.9);
        assert_eq!(kept.frame_count(), 6);

        assert_eq!(outcome.dropped.len(), 2);
        assert_eq!(outcome.dropped[0].reason, DropReason::TooSmall);
        assert_eq!(
            outcome.dropped[1].reason,
            DropReason::Ambiguous(SegmentationAmbiguity::Incoherent)
        );

        // The 2-frame cluster is never sent; the 6-frame one is sampled to 5.
        assert_eq!(*judge.sample_sizes.lock().unwrap(), vec![5, 4]);
    }

    #[tokio::test]
    async fn unparseable_reply_applies_default_judgment() {
        let judge = ScriptedJudge::new(vec![
            Ok("The frames look related, I think.".into()),
            coherent("Write docs"),
        ]);
        let metrics = MetricsCollector::new();

        let outcome = segment_session(
            &session_frames(),
            &judge,
            &fast_config(),
            &metrics,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.clusters.len(), 1);
        assert_eq!(outcome.clusters[0].name, "Write docs");
        assert_eq!(outcome.dropped_for_judge_failure(), 1);
        // Parse failures are not retried.
        assert_eq!(judge.calls.load(Ordering::SeqCst), 2);

        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.refinement.dropped_judge_failure, 1);
        assert_eq!(snapshot.refinement.clusters_kept, 1);
        assert_eq!(snapshot.refinement.dropped_too_small, 1);
    }

    #[tokio::test]
    async fn transport_failure_is_retried_then_succeeds() {
        let judge = ScriptedJudge::new(vec![
            Err(anyhow::anyhow!("connection reset")),
            coherent("Review PR"),
            coherent("Ship release"),
        ]);
        let metrics = MetricsCollector::new();

        let outcome = segment_session(
            &session_frames(),
            &judge,
            &fast_config(),
            &metrics,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.clusters.len(), 2);
        assert_eq!(judge.calls.load(Ordering::SeqCst), 3);
        assert_eq!(metrics.snapshot().await.refinement.judge_retries, 1);
    }

    #[tokio::test]
    async fn exhausted_retries_drop_cluster_without_failing_batch() {
        let judge = ScriptedJudge::new(vec![
            Err(anyhow::anyhow!("503")),
            Err(anyhow::anyhow!("503")),
            coherent("Ship release"),
        ]);
        let metrics = MetricsCollector::new();

        let outcome = segment_session(
            &session_frames(),
            &judge,
            &fast_config(),
            &metrics,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.clusters.len(), 1);
        assert_eq!(outcome.clusters[0].name, "Ship release");
        assert!(matches!(
            outcome.dropped[0].reason,
            DropReason::Ambiguous(SegmentationAmbiguity::JudgeUnavailable(
                JudgeFailure::Transport(_)
            ))
        ));
    }

    #[tokio::test]
    async fn timeout_is_treated_like_a_failed_judgment() {
        let config = SegmentationConfig {
            judge_timeout_secs: 1,
            judge_max_attempts: 1,
            ..fast_config()
        };
        let frames: Vec<Frame> = (0..3)
            .map(|i| Frame::new("s", i, at(i as i64 * 10), "Code"))
            .collect();

        let outcome = segment_session(
            &frames,
            &SlowJudge,
            &config,
            &MetricsCollector::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(outcome.clusters.is_empty());
        assert_eq!(
            outcome.dropped[0].reason,
            DropReason::Ambiguous(SegmentationAmbiguity::JudgeUnavailable(JudgeFailure::Timeout))
        );
    }

    /// Fails its first call and cancels the run while doing so.
    struct CancellingJudge {
        cancel: CancellationToken,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ClusterJudge for CancellingJudge {
        async fn judge_cluster(&self, _prompt: &str, _samples: &[Frame]) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.cancel.cancel();
            Err(anyhow::anyhow!("connection reset"))
        }
    }

    #[tokio::test]
    async fn cancellation_between_retries_is_not_a_judge_failure() {
        let cancel = CancellationToken::new();
        let judge = CancellingJudge {
            cancel: cancel.clone(),
            calls: AtomicUsize::new(0),
        };
        let metrics = MetricsCollector::new();
        let frames: Vec<Frame> = (0..3)
            .map(|i| Frame::new("s", i, at(i as i64 * 10), "Code"))
            .collect();

        let result = segment_session(&frames, &judge, &fast_config(), &metrics, &cancel).await;

        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert_eq!(judge.calls.load(Ordering::SeqCst), 1);
        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.refinement.dropped_judge_failure, 0);
        assert_eq!(snapshot.refinement.judge_retries, 0);
        assert!(snapshot.recent_drops.is_empty());
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_next_cluster() {
        let judge = ScriptedJudge::new(vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = segment_session(
            &session_frames(),
            &judge,
            &fast_config(),
            &MetricsCollector::new(),
            &cancel,
        )
        .await;

        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert_eq!(judge.calls.load(Ordering::SeqCst), 0);
    }
}

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{ensure_sorted, sorted_by_time, validate_frames, Frame, SuccessState, TaskCluster};
use crate::segmentation::config::{ProximityConfig, SegmentationConfig};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// A run of consecutive frames that belong together.
#[derive(Debug, Clone)]
struct FrameGroup {
    frames: Vec<Frame>,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

impl FrameGroup {
    fn start(frame: Frame) -> Self {
        Self {
            start_time: frame.timestamp,
            end_time: frame.timestamp,
            frames: vec![frame],
        }
    }

    fn push(&mut self, frame: Frame) {
        self.end_time = frame.timestamp;
        self.frames.push(frame);
    }
}

/// Seconds between two frames, with millisecond precision.
pub fn gap_seconds(prev: &Frame, next: &Frame) -> f64 {
    (next.timestamp - prev.timestamp).num_milliseconds() as f64 / 1000.0
}

/// Whether `next` opens a new cluster after `prev`.
pub fn is_cluster_boundary(prev: &Frame, next: &Frame, config: &SegmentationConfig) -> bool {
    let gap = gap_seconds(prev, next);
    let app_changed = prev.app_name != next.app_name;

    gap > config.time_gap_threshold_secs
        || (app_changed && gap > config.app_switch_gap_secs())
}

/// Splits a timestamp-ordered frame list into task clusters.
///
/// Single pass over adjacent pairs. Unsorted input is a caller error and
/// reported as [`crate::PipelineError::Data`].
pub fn segment_frames(frames: &[Frame], config: &SegmentationConfig) -> Result<Vec<TaskCluster>> {
    config.validate()?;
    validate_frames(frames)?;
    ensure_sorted(frames)?;

    let groups = split_frames(frames, |prev, next| is_cluster_boundary(prev, next, config));
    log_debug!(
        "segmented {} frames into {} clusters (gap {}s, app switch {}s)",
        frames.len(),
        groups.len(),
        config.time_gap_threshold_secs,
        config.app_switch_gap_secs()
    );

    Ok(groups.into_iter().map(build_cluster).collect())
}

/// Groups ad-hoc results (e.g. search hits) by time proximity alone.
///
/// Input order is not trusted; a sorted copy is grouped. Every input frame
/// appears in exactly one group: this never filters.
pub fn group_by_proximity(frames: &[Frame], config: &ProximityConfig) -> Result<Vec<TaskCluster>> {
    config.validate()?;

    let sorted = sorted_by_time(frames);
    let groups = split_frames(&sorted, |prev, next| {
        gap_seconds(prev, next) > config.gap_threshold_secs
    });

    Ok(groups.into_iter().map(build_cluster).collect())
}

fn split_frames<F>(frames: &[Frame], is_boundary: F) -> Vec<FrameGroup>
where
    F: Fn(&Frame, &Frame) -> bool,
{
    let mut groups = Vec::new();
    let mut current: Option<FrameGroup> = None;

    for frame in frames {
        match &mut current {
            Some(group)
                if !group
                    .frames
                    .last()
                    .is_some_and(|prev| is_boundary(prev, frame)) =>
            {
                group.push(frame.clone());
            }
            _ => {
                if let Some(group) = current.take() {
                    groups.push(group);
                }
                current = Some(FrameGroup::start(frame.clone()));
            }
        }
    }

    if let Some(group) = current {
        groups.push(group);
    }

    groups
}

fn build_cluster(group: FrameGroup) -> TaskCluster {
    let session_id = group
        .frames
        .first()
        .map(|frame| frame.session_id.clone())
        .unwrap_or_default();
    let name = most_common(group.frames.iter().map(|f| f.app_name.as_str()))
        .unwrap_or_default();
    let description = most_common(
        group
            .frames
            .iter()
            .map(|f| f.window_title.as_str())
            .filter(|title| !title.is_empty()),
    )
    .unwrap_or_default();
    let relevance = mean_relevance(&group.frames);

    TaskCluster {
        id: Uuid::new_v4().to_string(),
        session_id,
        start_time: group.start_time,
        end_time: group.end_time,
        is_coherent: false,
        name,
        description,
        success_state: SuccessState::Unknown,
        relevance,
        frames: group.frames,
    }
}

fn mean_relevance(frames: &[Frame]) -> f64 {
    if frames.is_empty() {
        return 0.0;
    }
    frames.iter().map(Frame::effective_relevance).sum::<f64>() / frames.len() as f64
}

/// Most frequent value; ties go to the value seen first.
fn most_common<'a>(values: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, value) in values.enumerate() {
        counts.entry(value).or_insert((0, position)).0 += 1;
    }

    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(value, _)| value.to_string())
}

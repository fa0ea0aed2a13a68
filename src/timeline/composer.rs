use crate::models::{CompositionEntry, CompositionPlan, Segment};

/// Lays segments end to end and assigns their start offsets.
///
/// Segment order is kept as given. The plan's total duration equals the
/// end of the last segment.
pub fn compose(segments: &mut [Segment]) -> CompositionPlan {
    let mut offset = 0.0;
    let mut entries = Vec::with_capacity(segments.len());

    for segment in segments.iter_mut() {
        segment.start_offset = offset;
        entries.push(CompositionEntry {
            frame_id: segment.frame.id.clone(),
            path: segment.export_path.clone(),
            duration: segment.duration,
            start_offset: offset,
        });
        offset += segment.duration;
    }

    CompositionPlan {
        entries,
        total_duration: offset,
    }
}

use crate::models::Frame;

/// Picks up to `max_samples` frames spread evenly across `frames`,
/// always including the first and last when more than one is taken.
pub fn sample_evenly(frames: &[Frame], max_samples: usize) -> Vec<&Frame> {
    let count = max_samples.min(frames.len());
    match count {
        0 => Vec::new(),
        1 => vec![&frames[0]],
        _ => {
            let last = frames.len() - 1;
            (0..count)
                .map(|i| &frames[i * last / (count - 1)])
                .collect()
        }
    }
}

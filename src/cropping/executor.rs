//! Pixel crop execution.
//!
//! The planner only decides rectangles; an implementation of
//! [`CropExecutor`] turns them into image files. [`execute_crops`] runs a
//! batch with bounded concurrency and isolates every failure to its frame.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::planner::CropRect;
use crate::error::{CropFailure, PipelineError, Result};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Crops an image file to a rectangle and returns the new file's path.
///
/// The returned path must belong to `frame_id` alone: two frames never share
/// an output file, even when their inputs have the same name.
pub trait CropExecutor: Send + Sync {
    fn crop_to_window(&self, frame_id: &str, input_path: &Path, rect: &CropRect) -> anyhow::Result<PathBuf>;
}

/// Crops with the `image` crate and writes PNGs named
/// `<stem>_<frame id>_cropped.png` into `output_dir`.
///
/// Rectangles are in screen points; when the capture has a different pixel
/// size (e.g. a 2x Retina screenshot) the rectangle is scaled to match.
#[derive(Debug, Clone)]
pub struct ImageCropper {
    output_dir: PathBuf,
}

impl ImageCropper {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn output_path_for(&self, frame_id: &str, input_path: &Path) -> PathBuf {
        let stem = input_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "frame".to_string());
        self.output_dir
            .join(format!("{stem}_{}_cropped.png", file_safe(frame_id)))
    }
}

impl CropExecutor for ImageCropper {
    fn crop_to_window(&self, frame_id: &str, input_path: &Path, rect: &CropRect) -> anyhow::Result<PathBuf> {
        let image = image::open(input_path)
            .with_context(|| format!("failed to open {}", input_path.display()))?;

        let (x, y, width, height) = scale_to_image(rect, image.width(), image.height())?;
        let cropped = image.crop_imm(x, y, width, height);

        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("failed to create crop directory {}", self.output_dir.display())
        })?;
        let output_path = self.output_path_for(frame_id, input_path);
        cropped
            .save(&output_path)
            .with_context(|| format!("failed to write {}", output_path.display()))?;

        Ok(output_path)
    }
}

/// Frame ids come from the store; keep only characters safe in file names.
fn file_safe(frame_id: &str) -> String {
    frame_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Maps a screen-point rectangle onto an image of the given pixel size.
fn scale_to_image(rect: &CropRect, image_width: u32, image_height: u32) -> anyhow::Result<(u32, u32, u32, u32)> {
    if rect.screen_width == 0 || rect.screen_height == 0 {
        bail!("crop rectangle has an empty screen");
    }
    let sx = f64::from(image_width) / f64::from(rect.screen_width);
    let sy = f64::from(image_height) / f64::from(rect.screen_height);

    let x = ((f64::from(rect.x) * sx).round() as u32).min(image_width);
    let y = ((f64::from(rect.y) * sy).round() as u32).min(image_height);
    let width = ((f64::from(rect.width) * sx).round() as u32).min(image_width - x);
    let height = ((f64::from(rect.height) * sy).round() as u32).min(image_height - y);

    if width == 0 || height == 0 {
        return Err(anyhow!(
            "crop {rect:?} is empty on a {image_width}x{image_height} image"
        ));
    }
    Ok((x, y, width, height))
}

/// One frame's crop request.
#[derive(Debug, Clone)]
pub struct CropJob {
    /// Position of the frame in the batch
    pub index: usize,
    pub frame_id: String,
    pub input_path: PathBuf,
    pub rect: CropRect,
}

#[derive(Debug, Clone)]
pub struct CropResult {
    pub index: usize,
    pub outcome: std::result::Result<PathBuf, CropFailure>,
}

/// Runs crop jobs with at most `max_concurrency` in flight.
///
/// Results come back ordered by job index. A failed or panicking job is a
/// [`CropFailure`] for that frame only and is never retried. Cancellation is
/// checked before each job starts.
pub async fn execute_crops(
    jobs: Vec<CropJob>,
    executor: Arc<dyn CropExecutor>,
    max_concurrency: usize,
    cancel: &CancellationToken,
) -> Result<Vec<CropResult>> {
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for job in jobs {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tasks.abort_all();
                return Err(PipelineError::Cancelled);
            }
            permit = Arc::clone(&semaphore).acquire_owned() => permit
                .map_err(|err| PipelineError::External(anyhow!("crop semaphore closed: {err}")))?,
        };

        let executor = Arc::clone(&executor);
        tasks.spawn(async move {
            let CropJob {
                index,
                frame_id,
                input_path,
                rect,
            } = job;
            let worker_frame_id = frame_id.clone();
            let joined = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                executor.crop_to_window(&worker_frame_id, &input_path, &rect)
            })
            .await;

            let outcome = match joined {
                Ok(Ok(path)) => Ok(path),
                Ok(Err(err)) => Err(format!("{err:#}")),
                Err(join_err) => Err(format!("crop worker panicked: {join_err}")),
            };
            CropResult {
                index,
                outcome: outcome.map_err(|message| CropFailure { frame_id, message }),
            }
        });
    }

    let mut results = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => {
                match &result.outcome {
                    Ok(path) => log_debug!("cropped frame {} -> {}", result.index, path.display()),
                    Err(failure) => log_warn!(
                        "crop failed for frame {}, using original: {}",
                        failure.frame_id,
                        failure.message
                    ),
                }
                results.push(result);
            }
            Err(join_err) => log_warn!("crop task failed to join: {join_err}"),
        }
    }

    results.sort_by_key(|result| result.index);
    Ok(results)
}

//! Task segmentation and demo-video planning for captured screen sessions.
//!
//! Frames come from a [`db::FrameStore`]. [`pipeline::DemoPipeline`] splits a
//! session into coherent tasks with help from a [`judge::ClusterJudge`], and
//! turns analyzed frames into a timed, cropped and annotated
//! [`models::CompositionPlan`] for an external renderer.

pub mod cropping;
pub mod db;
pub mod error;
pub mod judge;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod segmentation;
pub mod selection;
pub mod settings;
pub mod timeline;
pub mod utils;

pub use cropping::{CropConfig, CropExecutor, ImageCropper};
pub use db::{Database, FrameStore};
pub use error::{PipelineError, Result};
pub use judge::{ClusterJudge, ClusterJudgment, JudgeReply};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use models::{CompositionPlan, Frame, OverlayRecord, Segment, TaskCluster, WindowBounds};
pub use pipeline::{AssemblyOutput, AssemblyReport, AssemblyRequest, DemoPipeline};
pub use selection::SelectionMode;
pub use settings::{PipelineSettings, SettingsStore};

/// Installs `env_logger` as the `log` backend.
///
/// `RUST_LOG` wins when set; otherwise info and above are shown. Calling
/// this more than once is harmless.
pub fn init_logging() {
    let mut builder = env_logger::Builder::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        builder.filter_level(log::LevelFilter::Info);
    }
    if builder.try_init().is_ok() {
        log::info!("demoreel logging initialized");
    }
}

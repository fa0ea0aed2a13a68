pub mod algorithm;
pub mod config;
pub mod refine;
pub mod sampling;

pub use algorithm::{group_by_proximity, is_cluster_boundary, segment_frames};
pub use config::{ProximityConfig, SegmentationConfig};
pub use refine::{refine_clusters, segment_session, RefinementOutcome};

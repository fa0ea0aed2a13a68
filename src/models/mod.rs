pub mod cluster;
pub mod frame;
pub mod overlay;
pub mod segment;

pub use cluster::TaskCluster;
pub use frame::{
    ensure_sorted, sorted_by_time, validate_frames, Frame, SuccessState, WindowBounds,
    DEFAULT_RELEVANCE,
};
pub use overlay::{OverlayKind, OverlayPosition, OverlayRecord};
pub use segment::{CompositionEntry, CompositionPlan, Segment};

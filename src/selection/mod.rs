pub mod pacing;
pub mod selector;

pub use pacing::PacingConfig;
pub use selector::{select, select_frames, SelectionConfig, SelectionMode};

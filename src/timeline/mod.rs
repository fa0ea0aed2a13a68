//! Composition timeline and the overlays drawn on top of it.

pub mod composer;
pub mod overlay;

pub use composer::compose;
pub use overlay::{schedule, OverlayConfig, TimestampZone};

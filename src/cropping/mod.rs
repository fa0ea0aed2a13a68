//! Window-focused cropping: rectangle planning and pixel execution.

pub mod executor;
pub mod planner;

pub use executor::{execute_crops, CropExecutor, CropJob, CropResult, ImageCropper};
pub use planner::{clamp_to_screen, plan_crop, CropConfig, CropPlan, CropReason, CropRect};

pub mod clusters;
pub mod frames;

mod downsample;
pub mod overlay;

pub use downsample::downsample;
pub use overlay::{draw_crop_marker, mark_boundaries, paint_segment};

pub mod config;
pub mod errors;
pub mod export;
pub mod imageops;
pub mod labeling;
pub mod mask;
pub mod palette;
pub mod session;
pub mod slic;
pub mod traits;

pub mod mocks;

use std::path::Path;

pub use config::{Config, SessionParams};
pub use errors::{Result, TruthCropError};
pub use export::{CropExporter, CropFailureKind, ExportReport, NamingContext, OutputTree};
pub use labeling::{ClassCounts, LabelAssignment};
pub use mask::build_masks;
pub use palette::{ClassLabel, ClassPalette};
pub use session::{ClickMode, ClickOutcome, LabelingSession};
pub use slic::{SlicEngine, SlicParams};
pub use traits::SuperpixelSegmenter;

#[cfg(test)]
pub use mocks::*;

/// Raster extensions the session's file-list navigation considers.
pub fn is_supported_image_format(path: &Path) -> bool {
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        matches!(
            extension.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp" | "gif" | "tiff" | "avif"
        )
    } else {
        false
    }
}

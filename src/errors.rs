use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for the truth-and-crop pipeline.
///
/// Each variant captures context specific to its error domain (parameter
/// validation, filesystem, image decoding/encoding, segmentation), so callers
/// get diagnostic detail without parsing error strings. The thiserror crate
/// generates the Display implementations from the format strings.
#[derive(Error, Debug)]
pub enum TruthCropError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Validation error: {field} {reason}")]
    Validation { field: String, reason: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image processing error: {operation} failed (file: {path})")]
    ImageProcessing {
        path: String,
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Segmentation error: {operation} failed")]
    Segmentation {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub type Result<T> = std::result::Result<T, TruthCropError>;

impl TruthCropError {
    /// Shorthand for a parameter-validation failure.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Convert anyhow errors to configuration errors at crate boundaries.
impl From<anyhow::Error> for TruthCropError {
    fn from(err: anyhow::Error) -> Self {
        TruthCropError::Configuration {
            message: err.to_string(),
        }
    }
}

/// Convert bare I/O errors to filesystem errors.
///
/// Code that has context should construct TruthCropError::FileSystem directly
/// with the specific path and operation; this conversion is the fallback for
/// callsites without either.
impl From<std::io::Error> for TruthCropError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

/// Convert image crate errors to image processing errors.
impl From<image::ImageError> for TruthCropError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageProcessing {
            path: "unknown".to_string(),
            operation: "image processing".to_string(),
            source: Box::new(err),
        }
    }
}

/// Convert ndarray shape errors to segmentation errors.
///
/// Shape mismatches only occur while assembling the per-pixel segment map,
/// so they belong to the segmentation domain rather than a separate category.
impl From<ndarray::ShapeError> for TruthCropError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Segmentation {
            operation: "segment map shape conversion".to_string(),
            source: Box::new(err),
        }
    }
}

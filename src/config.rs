use clap::Parser;
use image::ImageFormat;
use std::path::PathBuf;

use crate::errors::{Result, TruthCropError};
use crate::slic::SlicParams;

#[derive(Parser, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Source image to label.
    pub input: PathBuf,

    /// Root directory for the three output trees.
    #[arg(default_value = "output")]
    pub output_dir: PathBuf,

    /// Crop half-window in pixels (crops are 2w x 2w).
    #[arg(short = 'w', long, default_value_t = 112)]
    pub half_window: u32,

    /// Downsampling stride applied on load (every Dth row and column).
    #[arg(short, long, default_value_t = 1)]
    pub downsample: u32,

    /// Target superpixel count.
    #[arg(short, long, default_value_t = 500)]
    pub n_segments: u32,

    /// Gaussian pre-smoothing sigma (0 disables smoothing).
    #[arg(long, default_value_t = 3.0)]
    pub sigma: f64,

    /// SLIC compactness (higher favors square segments).
    #[arg(long, default_value_t = 10.0)]
    pub compactness: f64,

    /// Merge small disconnected fragments into a neighboring segment.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub enforce_connectivity: bool,

    #[arg(short, long, default_value = "png", value_parser = check_format)]
    pub format: String,

    /// Click script to replay (label/crop/commit commands, one per line).
    #[arg(short, long)]
    pub script: Option<PathBuf>,
}

impl Config {
    /// The already-validated output format (`check_format` ran at parse time).
    pub fn image_format(&self) -> ImageFormat {
        ImageFormat::from_extension(&self.format).unwrap_or(ImageFormat::Png)
    }
}

/// Per-session parameter set, split off the CLI surface so the session API
/// can be driven without clap.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionParams {
    pub half_window: u32,
    pub downsample: u32,
    pub n_segments: u32,
    pub sigma: f64,
    pub compactness: f64,
    pub enforce_connectivity: bool,
}

impl SessionParams {
    /// The subset that determines the superpixel partition. `half_window`
    /// affects export geometry only and is deliberately absent.
    pub fn slic(&self) -> SlicParams {
        SlicParams {
            n_segments: self.n_segments,
            sigma: self.sigma,
            compactness: self.compactness,
            enforce_connectivity: self.enforce_connectivity,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.half_window == 0 {
            return Err(TruthCropError::validation(
                "half_window",
                "must be positive",
            ));
        }
        if self.downsample == 0 {
            return Err(TruthCropError::validation("downsample", "must be positive"));
        }
        crate::slic::validate_params(&self.slic())
    }
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            half_window: 112,
            downsample: 1,
            n_segments: 500,
            sigma: 3.0,
            compactness: 10.0,
            enforce_connectivity: true,
        }
    }
}

impl From<&Config> for SessionParams {
    fn from(config: &Config) -> Self {
        Self {
            half_window: config.half_window,
            downsample: config.downsample,
            n_segments: config.n_segments,
            sigma: config.sigma,
            compactness: config.compactness,
            enforce_connectivity: config.enforce_connectivity,
        }
    }
}

fn check_format(s: &str) -> std::result::Result<String, String> {
    let supported: Vec<_> = ImageFormat::all()
        .filter(|f| f.writing_enabled())
        .flat_map(|f| f.extensions_str())
        .map(|s| format!("`{}`", s))
        .collect();
    let supported_message = format!("Supported formats: {}", supported.join(", "));

    let format = ImageFormat::from_extension(s)
        .ok_or(format!("{} is not supported. {}", s, supported_message))?;
    if !format.writing_enabled() {
        return Err(format!("{} is not supported. {}", s, supported_message));
    }

    Ok(s.to_string())
}

//! Windowed crop export into three parallel output trees.

use std::fs;
use std::path::{Path, PathBuf};

use image::{imageops, EncodableLayout, GrayImage, ImageBuffer, ImageFormat, Pixel, RgbImage};

use crate::errors::TruthCropError;

pub const IMAGES_OUT_DIR: &str = "images";
pub const INT_MASKS_OUT_DIR: &str = "masks";
pub const RGB_MASKS_OUT_DIR: &str = "PASCALVOCmasks";

/// Which of the three output trees a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputTree {
    Images,
    IntegerMasks,
    RgbMasks,
}

impl OutputTree {
    pub const fn dir_name(self) -> &'static str {
        match self {
            OutputTree::Images => IMAGES_OUT_DIR,
            OutputTree::IntegerMasks => INT_MASKS_OUT_DIR,
            OutputTree::RgbMasks => RGB_MASKS_OUT_DIR,
        }
    }
}

impl std::fmt::Display for OutputTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Inputs for deterministic, collision-resistant crop filenames.
///
/// The sequence index passed to [`NamingContext::base_name`] is carried
/// across export passes for the same source image, so repeated commits never
/// reuse a name.
#[derive(Debug, Clone)]
pub struct NamingContext {
    pub stem: String,
    pub n_segments: u32,
    pub sigma: f64,
    pub downsample: u32,
}

impl NamingContext {
    pub fn base_name(&self, sequence_index: u64, x: u32, y: u32) -> String {
        format!(
            "{}_nseg{}_sig{}_ds{}_{}_x{}_y{}",
            self.stem, self.n_segments, self.sigma, self.downsample, sequence_index, x, y
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CropSuccess {
    pub x: u32,
    pub y: u32,
    pub base_name: String,
}

#[derive(Debug)]
pub struct CropFailure {
    pub x: u32,
    pub y: u32,
    pub kind: CropFailureKind,
}

#[derive(Debug)]
pub enum CropFailureKind {
    /// The window extends outside the image; the crop is skipped, never
    /// clipped.
    OutOfBounds { half_window: u32 },
    /// A write into one of the three trees failed; the sibling trees for the
    /// same crop are still attempted.
    Write {
        tree: OutputTree,
        path: PathBuf,
        source: TruthCropError,
    },
}

/// Outcome of one export pass: both lists, in crop-point order.
#[derive(Debug, Default)]
pub struct ExportReport {
    pub written: Vec<CropSuccess>,
    pub failures: Vec<CropFailure>,
}

impl ExportReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Writes (image crop, integer-mask crop, RGB-mask crop) triplets under an
/// output root, one tree per kind, sharing a base filename.
pub struct CropExporter {
    output_root: PathBuf,
    format: ImageFormat,
    extension: &'static str,
}

impl CropExporter {
    pub fn new(output_root: impl Into<PathBuf>, format: ImageFormat) -> Self {
        let extension = format.extensions_str().first().copied().unwrap_or("png");
        Self {
            output_root: output_root.into(),
            format,
            extension,
        }
    }

    /// Export every pending crop point against the same (image, masks)
    /// triple. Out-of-bounds windows and write failures are reported per
    /// crop; neither aborts the batch, and the caller's label state is never
    /// touched. The caller drains its pending list afterwards regardless of
    /// individual outcomes.
    pub fn export_crops(
        &self,
        image: &RgbImage,
        integer_mask: &GrayImage,
        rgb_mask: &RgbImage,
        crop_points: &[(u32, u32)],
        half_window: u32,
        naming: &NamingContext,
        start_index: u64,
    ) -> ExportReport {
        let mut report = ExportReport::default();
        let (width, height) = image.dimensions();

        for (offset, &(x, y)) in crop_points.iter().enumerate() {
            let sequence_index = start_index + offset as u64;
            if !window_fits(x, y, half_window, width, height) {
                report.failures.push(CropFailure {
                    x,
                    y,
                    kind: CropFailureKind::OutOfBounds { half_window },
                });
                continue;
            }

            let base_name = naming.base_name(sequence_index, x, y);
            let left = x - half_window;
            let top = y - half_window;
            let side = 2 * half_window;

            let mut clean = true;
            let image_crop = imageops::crop_imm(image, left, top, side, side).to_image();
            if let Err(failure) = self.write_tree(OutputTree::Images, &base_name, &image_crop) {
                report.failures.push(CropFailure { x, y, kind: failure });
                clean = false;
            }
            let int_crop = imageops::crop_imm(integer_mask, left, top, side, side).to_image();
            if let Err(failure) = self.write_tree(OutputTree::IntegerMasks, &base_name, &int_crop)
            {
                report.failures.push(CropFailure { x, y, kind: failure });
                clean = false;
            }
            let rgb_crop = imageops::crop_imm(rgb_mask, left, top, side, side).to_image();
            if let Err(failure) = self.write_tree(OutputTree::RgbMasks, &base_name, &rgb_crop) {
                report.failures.push(CropFailure { x, y, kind: failure });
                clean = false;
            }

            if clean {
                report.written.push(CropSuccess { x, y, base_name });
            }
        }

        report
    }

    fn write_tree<P>(
        &self,
        tree: OutputTree,
        base_name: &str,
        crop: &ImageBuffer<P, Vec<P::Subpixel>>,
    ) -> std::result::Result<(), CropFailureKind>
    where
        P: Pixel + image::PixelWithColorType,
        [P::Subpixel]: EncodableLayout,
    {
        let dir = self.output_root.join(tree.dir_name());
        fs::create_dir_all(&dir).map_err(|e| CropFailureKind::Write {
            tree,
            path: dir.clone(),
            source: TruthCropError::FileSystem {
                path: dir.clone(),
                operation: "create output tree".to_string(),
                source: e,
            },
        })?;

        let path = dir.join(format!("{}.{}", base_name, self.extension));
        crop.save_with_format(&path, self.format)
            .map_err(|e| CropFailureKind::Write {
                tree,
                path: path.clone(),
                source: TruthCropError::ImageProcessing {
                    path: path.display().to_string(),
                    operation: "crop save".to_string(),
                    source: Box::new(e),
                },
            })?;
        Ok(())
    }

    pub fn tree_path(&self, tree: OutputTree) -> PathBuf {
        self.output_root.join(tree.dir_name())
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }
}

/// Strict interior containment: a window touching any edge is rejected.
fn window_fits(x: u32, y: u32, half_window: u32, width: u32, height: u32) -> bool {
    let (x, y, half_window) = (x as u64, y as u64, half_window as u64);
    x > half_window
        && y > half_window
        && x + half_window < width as u64
        && y + half_window < height as u64
}

//! Deterministic mask synthesis from a finalized segment map and label
//! assignment.

use image::{GrayImage, Luma, RgbImage};
use imageproc::map::map_colors;
use ndarray::Array2;

use crate::labeling::LabelAssignment;
use crate::palette::ClassPalette;

/// Build the integer class mask and its palette-colored counterpart.
///
/// Every pixel is classified by looking up the label of its segment in the
/// final assignment; pixels of unlabeled segments keep class id 0 and the
/// palette color of 0. Because classification goes through segment-id
/// membership rather than any per-click history, the result depends only on
/// the final assignment, no matter how often a segment was relabeled.
pub fn build_masks(
    segments: &Array2<u32>,
    assignment: &LabelAssignment,
    palette: &ClassPalette,
) -> (GrayImage, RgbImage) {
    let (height, width) = segments.dim();
    let mut integer_mask = GrayImage::new(width as u32, height as u32);
    for ((y, x), id) in segments.indexed_iter() {
        if let Some(label) = assignment.label_of(*id) {
            integer_mask.put_pixel(x as u32, y as u32, Luma([label.id()]));
        }
    }

    let rgb_mask = map_colors(&integer_mask, |Luma([class_id])| palette.color(class_id));
    (integer_mask, rgb_mask)
}

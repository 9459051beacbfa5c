//! Display-only annotations drawn onto the session's working copy.
//!
//! Everything here mutates the working image the UI shows; exported files are
//! always derived from the untouched original.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use ndarray::Array2;

pub const BOUNDARY_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
pub const CROP_MARKER_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Blacken pixels whose right or bottom 4-neighbor belongs to a different
/// segment, tracing superpixel boundaries onto the working copy.
pub fn mark_boundaries(image: &mut RgbImage, segments: &Array2<u32>) {
    let (height, width) = segments.dim();
    debug_assert_eq!(
        (image.width() as usize, image.height() as usize),
        (width, height)
    );
    for y in 0..height {
        for x in 0..width {
            let id = segments[[y, x]];
            let boundary = (x + 1 < width && segments[[y, x + 1]] != id)
                || (y + 1 < height && segments[[y + 1, x]] != id);
            if boundary {
                image.put_pixel(x as u32, y as u32, BOUNDARY_COLOR);
            }
        }
    }
}

/// Flood every pixel of `segment_id` with the class color.
pub fn paint_segment(image: &mut RgbImage, segments: &Array2<u32>, segment_id: u32, color: Rgb<u8>) {
    for ((y, x), id) in segments.indexed_iter() {
        if *id == segment_id {
            image.put_pixel(x as u32, y as u32, color);
        }
    }
}

/// Hollow rectangle marking a queued crop window, clipped at image borders.
pub fn draw_crop_marker(image: &mut RgbImage, x: u32, y: u32, half_window: u32) {
    let side = 2 * half_window;
    if side == 0 {
        return;
    }
    let rect = Rect::at(
        x as i32 - half_window as i32,
        y as i32 - half_window as i32,
    )
    .of_size(side, side);
    draw_hollow_rect_mut(image, rect, CROP_MARKER_COLOR);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn boundaries_marked_between_segments() {
        let segments = array![[0u32, 0, 1], [0, 0, 1], [2, 2, 2]];
        let mut image = RgbImage::from_pixel(3, 3, Rgb([200, 200, 200]));
        mark_boundaries(&mut image, &segments);

        // 0|1 の縦境界と 0/2 の横境界
        assert_eq!(image.get_pixel(1, 0), &BOUNDARY_COLOR);
        assert_eq!(image.get_pixel(1, 1), &BOUNDARY_COLOR);
        assert_eq!(image.get_pixel(0, 1), &BOUNDARY_COLOR);
        // Interior of the bottom segment stays untouched.
        assert_eq!(image.get_pixel(0, 2), &Rgb([200, 200, 200]));
    }

    #[test]
    fn paint_segment_only_touches_members() {
        let segments = array![[0u32, 1], [1, 1]];
        let mut image = RgbImage::from_pixel(2, 2, Rgb([9, 9, 9]));
        paint_segment(&mut image, &segments, 1, Rgb([128, 0, 0]));

        assert_eq!(image.get_pixel(0, 0), &Rgb([9, 9, 9]));
        assert_eq!(image.get_pixel(1, 0), &Rgb([128, 0, 0]));
        assert_eq!(image.get_pixel(0, 1), &Rgb([128, 0, 0]));
    }

    #[test]
    fn crop_marker_near_edge_is_clipped() {
        let mut image = RgbImage::new(20, 20);
        // Window extends past the top-left corner; must not panic.
        draw_crop_marker(&mut image, 2, 2, 5);
        // Rect spans -3..=6 on both axes; the visible bottom-right corner.
        assert_eq!(image.get_pixel(6, 6), &CROP_MARKER_COLOR);
    }
}

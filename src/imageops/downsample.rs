use image::{ImageBuffer, Pixel};

/// Subsample an image by taking every `stride`th row and column.
///
/// No interpolation is performed; output dimensions are `ceil(dim / stride)`,
/// matching a `[::stride, ::stride]` slice. A stride of 0 is treated as 1.
pub fn downsample<P>(
    image: &ImageBuffer<P, Vec<P::Subpixel>>,
    stride: u32,
) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel,
{
    let stride = stride.max(1);
    let out_width = image.width().div_ceil(stride);
    let out_height = image.height().div_ceil(stride);
    ImageBuffer::from_fn(out_width, out_height, |x, y| {
        *image.get_pixel(x * stride, y * stride)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn stride_one_is_identity() {
        let image = RgbImage::from_fn(7, 5, |x, y| Rgb([x as u8, y as u8, 0]));
        assert_eq!(downsample(&image, 1), image);
    }

    #[test]
    fn output_dimensions_round_up() {
        let image = RgbImage::new(10, 7);
        let out = downsample(&image, 3);
        assert_eq!(out.dimensions(), (4, 3));
    }

    #[test]
    fn picks_every_nth_pixel() {
        let image = RgbImage::from_fn(6, 6, |x, y| Rgb([(10 * x) as u8, (10 * y) as u8, 0]));
        let out = downsample(&image, 2);
        assert_eq!(out.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(1, 0), &Rgb([20, 0, 0]));
        assert_eq!(out.get_pixel(2, 1), &Rgb([40, 20, 0]));
    }
}

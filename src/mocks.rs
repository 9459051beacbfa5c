use std::sync::Arc;

use image::RgbImage;
use ndarray::Array2;

use crate::errors::Result;
use crate::slic::{validate_params, SlicParams};
use crate::traits::SuperpixelSegmenter;

/// テスト用のモックセグメンター
///
/// 画像を `cell` ピクセル角のブロックへ機械的に分割する。決定的なので、
/// クリック座標からセグメントIDを机上で予測できる。
#[derive(Debug, Clone)]
pub struct MockSegmenter {
    pub cell: u32,
}

impl MockSegmenter {
    pub const fn new(cell: u32) -> Self {
        Self { cell }
    }
}

impl SuperpixelSegmenter for MockSegmenter {
    fn segment(&self, image: &RgbImage, params: &SlicParams) -> Result<Arc<Array2<u32>>> {
        // 本物のエンジンと同じ契約でパラメータを検証する
        validate_params(params)?;
        let cell = self.cell.max(1) as usize;
        let (width, height) = image.dimensions();
        let columns = (width as usize).div_ceil(cell);
        let map = Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
            ((y / cell) * columns + x / cell) as u32
        });
        Ok(Arc::new(map))
    }

    fn invalidate(&self) {
        // メモ化していないので何もしない
    }
}

/// テスト用のファクトリー関数
pub const fn create_mock_segmenter() -> MockSegmenter {
    MockSegmenter::new(10)
}

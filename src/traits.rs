use std::sync::Arc;

use image::RgbImage;
use ndarray::Array2;

use crate::errors::Result;
use crate::slic::SlicParams;

/// スーパーピクセル分割エンジンの抽象化
///
/// セッションはこのトレイトにのみ依存し、テストではモック実装を注入する。
/// 返されるセグメントIDは等価比較にのみ使う不透明な値で、順序や数値に
/// 意味はない。
pub trait SuperpixelSegmenter: Send + Sync {
    /// 画像を分割し、画素ごとのセグメントIDマップ (height x width) を返す
    ///
    /// 純粋関数として振る舞うこと: 同じ画像とパラメータに対して同じ
    /// マップを返す。パラメータ検証は計算前に行い、検証失敗時は
    /// 既存のメモ化結果を変更しない。
    fn segment(&self, image: &RgbImage, params: &SlicParams) -> Result<Arc<Array2<u32>>>;

    /// メモ化された分割結果を破棄する（画像の差し替え時に呼ぶ）
    fn invalidate(&self);
}

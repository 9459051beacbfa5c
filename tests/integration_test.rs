use std::fs;
use std::path::{Path, PathBuf};

use image::{ImageFormat, Rgb, RgbImage};
use tempfile::TempDir;

use truth_and_crop_rs::mocks::MockSegmenter;
use truth_and_crop_rs::{ClassLabel, ClickMode, ClickOutcome, LabelingSession, SessionParams};

const IMAGES_DIR: &str = "images";
const INT_MASKS_DIR: &str = "masks";
const RGB_MASKS_DIR: &str = "PASCALVOCmasks";

fn write_gradient_image(path: &Path, width: u32, height: u32) {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 120])
    });
    image.save(path).unwrap();
}

fn make_session(output_root: PathBuf) -> LabelingSession<MockSegmenter> {
    let params = SessionParams {
        half_window: 10,
        downsample: 1,
        n_segments: 100,
        sigma: 3.0,
        compactness: 10.0,
        enforce_connectivity: true,
    };
    LabelingSession::new(MockSegmenter::new(10), params, output_root, ImageFormat::Png).unwrap()
}

fn tree_files(root: &Path, tree: &str) -> Vec<String> {
    let dir = root.join(tree);
    if !dir.is_dir() {
        return Vec::new();
    }
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// 仕様のエンドツーエンドシナリオ: 100x100 / halfWindow=10
#[test]
fn end_to_end_labeling_and_export() {
    let tmp = TempDir::new().unwrap();
    let image_path = tmp.path().join("sample.png");
    write_gradient_image(&image_path, 100, 100);
    let output_root = tmp.path().join("out");

    let mut session = make_session(output_root.clone());
    session.load_image(&image_path).unwrap();
    session.set_active_class(ClassLabel::Mussel);

    // ラベルクリック: (50,50) のスーパーピクセルがクラス1になる
    let outcome = session.on_click(50, 50, ClickMode::Label).unwrap();
    assert!(matches!(
        outcome,
        ClickOutcome::Labeled {
            label: ClassLabel::Mussel,
            ..
        }
    ));
    assert_eq!(session.counts().get(ClassLabel::Mussel), 1);
    assert_eq!(session.labeled_total(), 1);

    // クロップクリック2点: (5,5) は窓が範囲外、(50,50) は受理される
    session.on_click(5, 5, ClickMode::Crop).unwrap();
    session.on_click(50, 50, ClickMode::Crop).unwrap();
    assert_eq!(session.pending_crops(), 2);

    let counts_before = session.counts();
    let report = session.commit().unwrap();

    assert_eq!(report.written.len(), 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.written[0].x, 50);
    assert_eq!(report.written[0].y, 50);

    // 3ツリーに同じベース名で1ファイルずつ
    let base = format!("{}.png", report.written[0].base_name);
    assert_eq!(tree_files(&output_root, IMAGES_DIR), vec![base.clone()]);
    assert_eq!(tree_files(&output_root, INT_MASKS_DIR), vec![base.clone()]);
    assert_eq!(tree_files(&output_root, RGB_MASKS_DIR), vec![base]);

    // コミットでクロップ一覧とラベルは原子的にクリアされる
    assert_eq!(session.pending_crops(), 0);
    assert_eq!(session.labeled_total(), 0);

    // 範囲外クロップの失敗はコミット前のラベル状態を壊していない
    assert_eq!(counts_before.get(ClassLabel::Mussel), 1);
}

#[test]
fn edge_touching_window_rejected_one_pixel_in_accepted() {
    let tmp = TempDir::new().unwrap();
    let image_path = tmp.path().join("edges.png");
    write_gradient_image(&image_path, 100, 100);

    let mut session = make_session(tmp.path().join("out"));
    session.load_image(&image_path).unwrap();

    // x - halfWindow == 0 はちょうど縁に触れるため拒否される
    session.on_click(10, 50, ClickMode::Crop).unwrap();
    // 1ピクセル内側なら受理される
    session.on_click(11, 50, ClickMode::Crop).unwrap();

    let report = session.commit().unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].x, 10);
    assert_eq!(report.written.len(), 1);
    assert_eq!(report.written[0].x, 11);
}

#[test]
fn repeated_exports_never_collide() {
    let tmp = TempDir::new().unwrap();
    let image_path = tmp.path().join("twice.png");
    write_gradient_image(&image_path, 100, 100);
    let output_root = tmp.path().join("out");

    let mut session = make_session(output_root.clone());
    session.load_image(&image_path).unwrap();

    session.on_click(30, 30, ClickMode::Crop).unwrap();
    session.on_click(70, 70, ClickMode::Crop).unwrap();
    let first = session.commit().unwrap();
    assert_eq!(first.written.len(), 2);

    // 同じ座標でも連番が進むので衝突しない
    session.on_click(30, 30, ClickMode::Crop).unwrap();
    let second = session.commit().unwrap();
    assert_eq!(second.written.len(), 1);

    let files = tree_files(&output_root, IMAGES_DIR);
    assert_eq!(files.len(), 3);
    assert!(second.written[0].base_name.contains("_2_x30_y30"));
}

#[test]
fn rejected_points_still_consume_sequence_slots() {
    let tmp = TempDir::new().unwrap();
    let image_path = tmp.path().join("slots.png");
    write_gradient_image(&image_path, 100, 100);

    let mut session = make_session(tmp.path().join("out"));
    session.load_image(&image_path).unwrap();

    session.on_click(5, 5, ClickMode::Crop).unwrap();
    session.commit().unwrap();

    // 拒否だけのバッチでもカウンタは1進んでいる
    session.on_click(50, 50, ClickMode::Crop).unwrap();
    let report = session.commit().unwrap();
    assert!(report.written[0].base_name.contains("_1_x50_y50"));
}

#[test]
fn exported_masks_reflect_final_assignment() {
    let tmp = TempDir::new().unwrap();
    let image_path = tmp.path().join("masks.png");
    write_gradient_image(&image_path, 100, 100);
    let output_root = tmp.path().join("out");

    let mut session = make_session(output_root.clone());
    session.load_image(&image_path).unwrap();

    // 同じセグメントを塗り直す: 最後のVoidだけが残る
    session.set_active_class(ClassLabel::Mussel);
    session.on_click(50, 50, ClickMode::Label).unwrap();
    session.set_active_class(ClassLabel::Void);
    session.on_click(50, 50, ClickMode::Label).unwrap();
    assert_eq!(session.counts().get(ClassLabel::Mussel), 0);
    assert_eq!(session.counts().get(ClassLabel::Void), 1);

    session.on_click(50, 50, ClickMode::Crop).unwrap();
    let report = session.commit().unwrap();
    assert_eq!(report.written.len(), 1);

    let mask_path = output_root
        .join(INT_MASKS_DIR)
        .join(format!("{}.png", report.written[0].base_name));
    let mask = image::open(&mask_path).unwrap().into_luma8();
    // (50,50) はモックの10px角ブロック内なので窓中央は全てVoid
    assert_eq!(mask.get_pixel(10, 10).0[0], 255);

    let rgb_path = output_root
        .join(RGB_MASKS_DIR)
        .join(format!("{}.png", report.written[0].base_name));
    let rgb = image::open(&rgb_path).unwrap().into_rgb8();
    assert_eq!(rgb.get_pixel(10, 10), &Rgb([224, 224, 192]));
}

#[test]
fn export_writes_derive_from_original_not_overlay() {
    let tmp = TempDir::new().unwrap();
    let image_path = tmp.path().join("clean.png");
    write_gradient_image(&image_path, 100, 100);
    let output_root = tmp.path().join("out");

    let mut session = make_session(output_root.clone());
    session.load_image(&image_path).unwrap();

    // オーバーレイを汚すラベルクリックの後でも、書き出しは原本から
    session.set_active_class(ClassLabel::Ciona);
    session.on_click(45, 45, ClickMode::Label).unwrap();
    session.on_click(50, 50, ClickMode::Crop).unwrap();
    let report = session.commit().unwrap();

    let crop_path = output_root
        .join(IMAGES_DIR)
        .join(format!("{}.png", report.written[0].base_name));
    let crop = image::open(&crop_path).unwrap().into_rgb8();
    // 窓は[40,60)なので、crop(5,5)は原画像の(45,45)
    assert_eq!(crop.get_pixel(5, 5), &Rgb([45, 45, 120]));
}

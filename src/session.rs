//! Labeling session controller.
//!
//! Owns all per-session mutable state (original and working images, memoized
//! segment map, label assignment, crop queue, export naming counter, image
//! file list) and exposes the click/parameter/commit surface the UI layer
//! drives. Session resets and cache invalidation happen only here, as
//! explicit transitions.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{ImageFormat, RgbImage};
use ndarray::Array2;
use walkdir::WalkDir;

use crate::config::SessionParams;
use crate::errors::{Result, TruthCropError};
use crate::export::{CropExporter, ExportReport, NamingContext};
use crate::imageops;
use crate::labeling::{ClassCounts, LabelAssignment};
use crate::mask::build_masks;
use crate::palette::{ClassLabel, ClassPalette};
use crate::traits::SuperpixelSegmenter;

/// How a click coordinate is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickMode {
    Label,
    Crop,
}

/// What a click did, for the caller's display refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    Labeled { segment_id: u32, label: ClassLabel },
    CropQueued { x: u32, y: u32, pending: usize },
}

/// Per-image state; replaced wholesale when a new image is loaded.
struct SessionImage {
    path: PathBuf,
    /// Downsampled source, immutable for the session; all exports slice this.
    original: RgbImage,
    /// Display copy carrying boundary/label/crop-marker annotations.
    working: RgbImage,
    segments: Option<Arc<Array2<u32>>>,
    assignment: LabelAssignment,
    crop_points: Vec<(u32, u32)>,
    /// Filename sequence counter, carried across commits for this image.
    export_count: u64,
}

pub struct LabelingSession<S: SuperpixelSegmenter> {
    segmenter: S,
    params: SessionParams,
    output_root: PathBuf,
    format: ImageFormat,
    palette: ClassPalette,
    active_class: ClassLabel,
    current: Option<SessionImage>,
    file_list: Vec<PathBuf>,
    file_index: usize,
}

impl<S: SuperpixelSegmenter> LabelingSession<S> {
    pub fn new(
        segmenter: S,
        params: SessionParams,
        output_root: impl Into<PathBuf>,
        format: ImageFormat,
    ) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            segmenter,
            params,
            output_root: output_root.into(),
            format,
            palette: ClassPalette::pascal_voc(),
            active_class: ClassLabel::Other,
            current: None,
            file_list: Vec::new(),
            file_index: 0,
        })
    }

    /// Decode `path`, downsample by the configured stride, and start a fresh
    /// session for it. Discards any previous image's state and memoized map.
    pub fn load_image(&mut self, path: &Path) -> Result<()> {
        let decoded = image::open(path)
            .map_err(|e| TruthCropError::ImageProcessing {
                path: path.display().to_string(),
                operation: "image load".to_string(),
                source: Box::new(e),
            })?
            .into_rgb8();
        let original = imageops::downsample(&decoded, self.params.downsample);

        self.segmenter.invalidate();
        self.current = Some(SessionImage {
            path: path.to_path_buf(),
            working: original.clone(),
            original,
            segments: None,
            assignment: LabelAssignment::new(),
            crop_points: Vec::new(),
            export_count: 0,
        });
        self.refresh_file_list(path);
        Ok(())
    }

    /// Replace the parameter set. Validation happens before any mutation; on
    /// error the previous parameters, segment map and labels all survive.
    ///
    /// A change to a partition-affecting parameter invalidates the memoized
    /// map and clears the label assignment; a stride change additionally
    /// re-derives the working image (coordinates shift, so queued crop points
    /// go with it). `half_window` alone invalidates nothing.
    pub fn set_params(&mut self, params: SessionParams) -> Result<()> {
        params.validate()?;
        let partition_changed = params.slic() != self.params.slic()
            || params.downsample != self.params.downsample;
        let stride_changed = params.downsample != self.params.downsample;
        self.params = params;

        if !partition_changed {
            return Ok(());
        }
        self.segmenter.invalidate();
        if stride_changed {
            if let Some(path) = self.current.as_ref().map(|img| img.path.clone()) {
                return self.load_image(&path);
            }
            return Ok(());
        }
        if let Some(img) = self.current.as_mut() {
            img.segments = None;
            img.assignment.reset();
            img.working = img.original.clone();
            for &(x, y) in &img.crop_points {
                imageops::draw_crop_marker(&mut img.working, x, y, self.params.half_window);
            }
        }
        Ok(())
    }

    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    pub fn set_active_class(&mut self, label: ClassLabel) {
        self.active_class = label;
    }

    pub fn active_class(&self) -> ClassLabel {
        self.active_class
    }

    /// Compute (or fetch the memoized) segment map for the current image and
    /// draw superpixel boundaries onto the working copy on first computation.
    pub fn superpixels(&mut self) -> Result<Arc<Array2<u32>>> {
        let slic_params = self.params.slic();
        let img = self
            .current
            .as_mut()
            .ok_or_else(Self::no_image)?;
        if let Some(map) = img.segments.as_ref() {
            return Ok(Arc::clone(map));
        }
        let map = self.segmenter.segment(&img.original, &slic_params)?;
        imageops::mark_boundaries(&mut img.working, &map);
        img.segments = Some(Arc::clone(&map));
        Ok(map)
    }

    /// Route a click. Label clicks assign the active class to the superpixel
    /// under the cursor (computing the partition on first need); crop clicks
    /// queue the point and draw its window marker.
    pub fn on_click(&mut self, x: u32, y: u32, mode: ClickMode) -> Result<ClickOutcome> {
        let (width, height) = self
            .dimensions()
            .ok_or_else(Self::no_image)?;
        if x >= width || y >= height {
            return Err(TruthCropError::validation(
                "click",
                format!("({x},{y}) is outside the {width}x{height} image"),
            ));
        }

        match mode {
            ClickMode::Label => {
                let map = self.superpixels()?;
                let label = self.active_class;
                let color = self.palette.class_color(label);
                let img = self
                    .current
                    .as_mut()
                    .ok_or_else(Self::no_image)?;
                let segment_id = map[[y as usize, x as usize]];
                img.assignment.assign(segment_id, label);
                imageops::paint_segment(&mut img.working, &map, segment_id, color);
                Ok(ClickOutcome::Labeled { segment_id, label })
            }
            ClickMode::Crop => {
                let half_window = self.params.half_window;
                let img = self
                    .current
                    .as_mut()
                    .ok_or_else(Self::no_image)?;
                img.crop_points.push((x, y));
                imageops::draw_crop_marker(&mut img.working, x, y, half_window);
                Ok(ClickOutcome::CropQueued {
                    x,
                    y,
                    pending: img.crop_points.len(),
                })
            }
        }
    }

    /// Synthesize final masks and export every pending crop, then clear the
    /// crop queue and label assignment atomically. The memoized segment map
    /// stays valid for the unchanged image and parameters; the naming counter
    /// advances by the full batch size, rejections included.
    pub fn commit(&mut self) -> Result<ExportReport> {
        let map = self.superpixels()?;
        let half_window = self.params.half_window;
        let naming_params = (
            self.params.n_segments,
            self.params.sigma,
            self.params.downsample,
        );
        let img = self
            .current
            .as_mut()
            .ok_or_else(Self::no_image)?;

        let (integer_mask, rgb_mask) = build_masks(&map, &img.assignment, &self.palette);
        let stem = img
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let naming = NamingContext {
            stem,
            n_segments: naming_params.0,
            sigma: naming_params.1,
            downsample: naming_params.2,
        };

        let exporter = CropExporter::new(&self.output_root, self.format);
        let report = exporter.export_crops(
            &img.original,
            &integer_mask,
            &rgb_mask,
            &img.crop_points,
            half_window,
            &naming,
            img.export_count,
        );

        img.export_count += img.crop_points.len() as u64;
        img.crop_points.clear();
        img.assignment.reset();
        img.working = img.original.clone();
        imageops::mark_boundaries(&mut img.working, &map);
        Ok(report)
    }

    pub fn next_image(&mut self) -> Result<()> {
        self.step_image(1)
    }

    pub fn previous_image(&mut self) -> Result<()> {
        self.step_image(-1)
    }

    fn step_image(&mut self, delta: isize) -> Result<()> {
        if self.file_list.is_empty() {
            return Err(TruthCropError::validation("file list", "is empty"));
        }
        let index = self.file_index as isize + delta;
        if index < 0 || index as usize >= self.file_list.len() {
            return Err(TruthCropError::validation(
                "file list",
                "no more images in this direction",
            ));
        }
        let path = self.file_list[index as usize].clone();
        self.load_image(&path)
    }

    // --- Views handed back to the UI layer -------------------------------

    pub fn overlay(&self) -> Option<&RgbImage> {
        self.current.as_ref().map(|img| &img.working)
    }

    pub fn original(&self) -> Option<&RgbImage> {
        self.current.as_ref().map(|img| &img.original)
    }

    pub fn segment_map(&self) -> Option<Arc<Array2<u32>>> {
        self.current
            .as_ref()
            .and_then(|img| img.segments.as_ref().map(Arc::clone))
    }

    pub fn counts(&self) -> ClassCounts {
        self.current
            .as_ref()
            .map(|img| img.assignment.counts_snapshot())
            .unwrap_or_default()
    }

    pub fn percentages(&self) -> [u32; ClassLabel::ALL.len()] {
        self.counts().percentages()
    }

    pub fn labeled_total(&self) -> usize {
        self.current
            .as_ref()
            .map(|img| img.assignment.labeled_total())
            .unwrap_or(0)
    }

    pub fn pending_crops(&self) -> usize {
        self.current
            .as_ref()
            .map(|img| img.crop_points.len())
            .unwrap_or(0)
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.current.as_ref().map(|img| img.original.dimensions())
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|img| img.path.as_path())
    }

    pub fn file_list(&self) -> &[PathBuf] {
        &self.file_list
    }

    // ---------------------------------------------------------------------

    fn refresh_file_list(&mut self, current: &Path) {
        let dir = current
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| crate::is_supported_image_format(p))
            .collect();
        files.sort_by(|a, b| natural_cmp(&a.to_string_lossy(), &b.to_string_lossy()));
        self.file_index = files.iter().position(|p| p == current).unwrap_or(0);
        self.file_list = files;
    }

    fn no_image() -> TruthCropError {
        TruthCropError::validation("session", "no image loaded")
    }
}

/// Order strings with digit runs compared by numeric value, so `img2` sorts
/// before `img10`. Leading zeros break ties by run length.
fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ai = a.chars().peekable();
    let mut bi = b.chars().peekable();
    loop {
        match (ai.peek().copied(), bi.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) => {
                if ca.is_ascii_digit() && cb.is_ascii_digit() {
                    let run_a = digit_run(&mut ai);
                    let run_b = digit_run(&mut bi);
                    let trimmed_a = run_a.trim_start_matches('0');
                    let trimmed_b = run_b.trim_start_matches('0');
                    let ordering = trimmed_a
                        .len()
                        .cmp(&trimmed_b.len())
                        .then_with(|| trimmed_a.cmp(trimmed_b))
                        .then_with(|| run_a.len().cmp(&run_b.len()));
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                } else {
                    match ca.cmp(&cb) {
                        Ordering::Equal => {
                            ai.next();
                            bi.next();
                        }
                        other => return other,
                    }
                }
            }
        }
    }
}

fn digit_run(iter: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = iter.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        run.push(c);
        iter.next();
    }
    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockSegmenter;
    use image::Rgb;
    use tempfile::TempDir;

    fn write_test_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        let image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 60])
        });
        image.save(&path).unwrap();
        path
    }

    fn session(out: &TempDir) -> LabelingSession<MockSegmenter> {
        LabelingSession::new(
            MockSegmenter::new(10),
            SessionParams {
                half_window: 10,
                ..SessionParams::default()
            },
            out.path().join("out"),
            ImageFormat::Png,
        )
        .unwrap()
    }

    #[test]
    fn natural_order() {
        assert_eq!(natural_cmp("img2.png", "img10.png"), Ordering::Less);
        assert_eq!(natural_cmp("img10.png", "img2.png"), Ordering::Greater);
        assert_eq!(natural_cmp("a1b2", "a1b2"), Ordering::Equal);
        assert_eq!(natural_cmp("img002", "img2"), Ordering::Greater);
        assert_eq!(natural_cmp("apple", "banana"), Ordering::Less);
    }

    #[test]
    fn click_outside_image_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = write_test_image(tmp.path(), "a.png", 50, 40);
        let mut session = session(&tmp);
        session.load_image(&path).unwrap();

        assert!(session.on_click(50, 10, ClickMode::Label).is_err());
        assert!(session.on_click(10, 40, ClickMode::Crop).is_err());
    }

    #[test]
    fn label_click_updates_assignment_and_overlay() {
        let tmp = TempDir::new().unwrap();
        let path = write_test_image(tmp.path(), "a.png", 50, 40);
        let mut session = session(&tmp);
        session.load_image(&path).unwrap();
        session.set_active_class(ClassLabel::Mussel);

        let outcome = session.on_click(25, 25, ClickMode::Label).unwrap();
        let ClickOutcome::Labeled { segment_id, label } = outcome else {
            panic!("expected a label outcome");
        };
        assert_eq!(label, ClassLabel::Mussel);
        assert_eq!(session.labeled_total(), 1);
        assert_eq!(session.counts().get(ClassLabel::Mussel), 1);

        // 作業コピーはクラス色で塗られ、原本は手つかず
        let map = session.segment_map().unwrap();
        assert_eq!(map[[25, 25]], segment_id);
        assert_eq!(
            session.overlay().unwrap().get_pixel(25, 25),
            &Rgb([128, 0, 0])
        );
        assert_ne!(
            session.original().unwrap().get_pixel(25, 25),
            session.overlay().unwrap().get_pixel(25, 25)
        );
    }

    #[test]
    fn partition_param_change_clears_labels_but_half_window_does_not() {
        let tmp = TempDir::new().unwrap();
        let path = write_test_image(tmp.path(), "a.png", 50, 40);
        let mut session = session(&tmp);
        session.load_image(&path).unwrap();
        session.on_click(25, 25, ClickMode::Label).unwrap();
        assert_eq!(session.labeled_total(), 1);

        // 書き出しウィンドウだけの変更は何も無効化しない
        let mut params = session.params().clone();
        params.half_window = 15;
        session.set_params(params).unwrap();
        assert_eq!(session.labeled_total(), 1);
        assert!(session.segment_map().is_some());

        let mut params = session.params().clone();
        params.n_segments += 100;
        session.set_params(params).unwrap();
        assert_eq!(session.labeled_total(), 0);
        assert!(session.segment_map().is_none());
    }

    #[test]
    fn invalid_params_leave_session_untouched() {
        let tmp = TempDir::new().unwrap();
        let path = write_test_image(tmp.path(), "a.png", 50, 40);
        let mut session = session(&tmp);
        session.load_image(&path).unwrap();
        session.on_click(25, 25, ClickMode::Label).unwrap();

        let mut params = session.params().clone();
        params.n_segments = 0;
        assert!(session.set_params(params).is_err());
        assert_eq!(session.labeled_total(), 1);
        assert!(session.segment_map().is_some());
    }

    #[test]
    fn file_list_navigation_in_natural_order() {
        let tmp = TempDir::new().unwrap();
        write_test_image(tmp.path(), "frame2.png", 20, 20);
        write_test_image(tmp.path(), "frame10.png", 20, 20);
        let first = write_test_image(tmp.path(), "frame1.png", 20, 20);

        let mut session = session(&tmp);
        session.load_image(&first).unwrap();
        let names: Vec<_> = session
            .file_list()
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        assert_eq!(names, ["frame1.png", "frame2.png", "frame10.png"]);

        session.next_image().unwrap();
        assert!(session
            .current_path()
            .unwrap()
            .ends_with("frame2.png"));
        session.previous_image().unwrap();
        assert!(session
            .current_path()
            .unwrap()
            .ends_with("frame1.png"));
        assert!(session.previous_image().is_err());
    }
}

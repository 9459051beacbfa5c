//! SLIC superpixel partitioning.
//!
//! Seeds cluster centers on a regular grid, iteratively reassigns pixels to
//! the nearest center in combined CIELAB + spatial space, then optionally
//! merges small disconnected fragments into a neighboring segment. Segment
//! ids are opaque: consumers may only compare them for equality.

use std::sync::Arc;

use image::RgbImage;
use imageproc::filter::gaussian_blur_f32;
use ndarray::Array2;
use nshare::AsNdarray3;
use parking_lot::Mutex;
use rayon::prelude::*;

use crate::errors::{Result, TruthCropError};
use crate::traits::SuperpixelSegmenter;

const MAX_ITERATIONS: usize = 10;

/// Parameters that determine the superpixel partition.
#[derive(Debug, Clone, PartialEq)]
pub struct SlicParams {
    pub n_segments: u32,
    pub sigma: f64,
    pub compactness: f64,
    pub enforce_connectivity: bool,
}

impl Default for SlicParams {
    fn default() -> Self {
        Self {
            n_segments: 500,
            sigma: 3.0,
            compactness: 10.0,
            enforce_connectivity: true,
        }
    }
}

/// Reject invalid parameters before any computation runs.
pub fn validate_params(params: &SlicParams) -> Result<()> {
    if params.n_segments == 0 {
        return Err(TruthCropError::validation("n_segments", "must be positive"));
    }
    if !params.sigma.is_finite() || params.sigma < 0.0 {
        return Err(TruthCropError::validation(
            "sigma",
            "must be a non-negative finite value",
        ));
    }
    if !params.compactness.is_finite() || params.compactness <= 0.0 {
        return Err(TruthCropError::validation(
            "compactness",
            "must be a positive finite value",
        ));
    }
    Ok(())
}

/// Segmentation engine memoizing the most recent partition.
///
/// The partition is the single most expensive operation in the pipeline, so
/// the last (parameters, dimensions) -> map pair is kept behind a mutex and
/// shared out as an `Arc`. `invalidate` drops the slot when the session
/// replaces its image.
pub struct SlicEngine {
    cache: Mutex<Option<CacheEntry>>,
}

struct CacheEntry {
    params: SlicParams,
    dimensions: (u32, u32),
    map: Arc<Array2<u32>>,
}

impl SlicEngine {
    pub const fn new() -> Self {
        Self {
            cache: Mutex::new(None),
        }
    }
}

impl Default for SlicEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SuperpixelSegmenter for SlicEngine {
    fn segment(&self, image: &RgbImage, params: &SlicParams) -> Result<Arc<Array2<u32>>> {
        validate_params(params)?;
        let dimensions = image.dimensions();
        {
            let cache = self.cache.lock();
            if let Some(entry) = cache.as_ref() {
                if entry.params == *params && entry.dimensions == dimensions {
                    return Ok(Arc::clone(&entry.map));
                }
            }
        }

        // ロックの外で計算する
        let map = Arc::new(compute_slic(image, params)?);
        *self.cache.lock() = Some(CacheEntry {
            params: params.clone(),
            dimensions,
            map: Arc::clone(&map),
        });
        Ok(map)
    }

    fn invalidate(&self) {
        *self.cache.lock() = None;
    }
}

#[derive(Debug, Clone, Copy)]
struct Cluster {
    l: f32,
    a: f32,
    b: f32,
    x: f32,
    y: f32,
}

pub(crate) fn compute_slic(image: &RgbImage, params: &SlicParams) -> Result<Array2<u32>> {
    let (image_width, image_height) = image.dimensions();
    if image_width == 0 || image_height == 0 {
        return Err(TruthCropError::validation(
            "image",
            "cannot segment an empty image",
        ));
    }
    let width = image_width as usize;
    let height = image_height as usize;

    // 平滑化してからCIELABへ変換する（sigma=0は平滑化なし）
    let smoothed;
    let source: &RgbImage = if params.sigma > 0.0 {
        smoothed = gaussian_blur_f32(image, params.sigma as f32);
        &smoothed
    } else {
        image
    };

    let rgb = source.as_ndarray3();
    let lab: Vec<[f32; 3]> = (0..height)
        .into_par_iter()
        .flat_map_iter(move |y| {
            (0..width).map(move |x| rgb_to_lab(rgb[[0, y, x]], rgb[[1, y, x]], rgb[[2, y, x]]))
        })
        .collect();

    let step = (((width * height) as f64 / params.n_segments as f64)
        .sqrt()
        .round() as usize)
        .max(1);
    let mut clusters = seed_clusters(&lab, width, height, step);

    let pixel_count = width * height;
    let mut labels = vec![u32::MAX; pixel_count];
    let mut distances = vec![f32::INFINITY; pixel_count];
    let invwt = {
        let ratio = params.compactness as f32 / step as f32;
        ratio * ratio
    };

    for _ in 0..MAX_ITERATIONS {
        labels.fill(u32::MAX);
        distances.fill(f32::INFINITY);

        for (k, cluster) in clusters.iter().enumerate() {
            let cx = cluster.x.round() as isize;
            let cy = cluster.y.round() as isize;
            let x0 = (cx - step as isize).max(0) as usize;
            let x1 = ((cx + step as isize).max(0) as usize).min(width);
            let y0 = (cy - step as isize).max(0) as usize;
            let y1 = ((cy + step as isize).max(0) as usize).min(height);

            for y in y0..y1 {
                let dy = y as f32 - cluster.y;
                for x in x0..x1 {
                    let idx = y * width + x;
                    let [l, a, b] = lab[idx];
                    let dl = l - cluster.l;
                    let da = a - cluster.a;
                    let db = b - cluster.b;
                    let dx = x as f32 - cluster.x;
                    let distance = dl * dl + da * da + db * db + invwt * (dx * dx + dy * dy);
                    if distance < distances[idx] {
                        distances[idx] = distance;
                        labels[idx] = k as u32;
                    }
                }
            }
        }

        // クラスタ中心を割り当て済み画素の平均へ更新する
        let mut sums = vec![[0f32; 6]; clusters.len()];
        for (idx, &label) in labels.iter().enumerate() {
            if label == u32::MAX {
                continue;
            }
            let sum = &mut sums[label as usize];
            let [l, a, b] = lab[idx];
            sum[0] += l;
            sum[1] += a;
            sum[2] += b;
            sum[3] += (idx % width) as f32;
            sum[4] += (idx / width) as f32;
            sum[5] += 1.0;
        }
        for (cluster, sum) in clusters.iter_mut().zip(&sums) {
            if sum[5] > 0.0 {
                cluster.l = sum[0] / sum[5];
                cluster.a = sum[1] / sum[5];
                cluster.b = sum[2] / sum[5];
                cluster.x = sum[3] / sum[5];
                cluster.y = sum[4] / sum[5];
            }
        }
    }

    // 探索窓から漏れた画素は空間的に最近傍の中心へ割り当てる
    for (idx, label) in labels.iter_mut().enumerate() {
        if *label != u32::MAX {
            continue;
        }
        let x = (idx % width) as f32;
        let y = (idx / width) as f32;
        let mut best = 0u32;
        let mut best_distance = f32::INFINITY;
        for (k, cluster) in clusters.iter().enumerate() {
            let dx = x - cluster.x;
            let dy = y - cluster.y;
            let distance = dx * dx + dy * dy;
            if distance < best_distance {
                best_distance = distance;
                best = k as u32;
            }
        }
        *label = best;
    }

    let labels = if params.enforce_connectivity {
        let min_size = ((width * height / params.n_segments.max(1) as usize) / 4).max(1);
        relabel_connected(&labels, width, height, min_size)
    } else {
        labels
    };

    Ok(Array2::from_shape_vec((height, width), labels)?)
}

/// Place one seed per grid cell, nudged to the lowest-gradient position in
/// its 3x3 neighborhood so seeds avoid edges.
fn seed_clusters(lab: &[[f32; 3]], width: usize, height: usize, step: usize) -> Vec<Cluster> {
    let gradient = |x: usize, y: usize| -> f32 {
        let at = |x: usize, y: usize| lab[y * width + x];
        let dx = channel_norm(at(x + 1, y), at(x - 1, y));
        let dy = channel_norm(at(x, y + 1), at(x, y - 1));
        dx + dy
    };

    let xs = grid_positions(width, step);
    let ys = grid_positions(height, step);
    let mut clusters = Vec::with_capacity(xs.len() * ys.len());
    for &cy in &ys {
        for &cx in &xs {
            let mut best = (cx, cy);
            let mut best_gradient = f32::INFINITY;
            for ny in cy.saturating_sub(1)..=(cy + 1).min(height - 1) {
                for nx in cx.saturating_sub(1)..=(cx + 1).min(width - 1) {
                    if nx == 0 || ny == 0 || nx + 1 >= width || ny + 1 >= height {
                        continue;
                    }
                    let g = gradient(nx, ny);
                    if g < best_gradient {
                        best_gradient = g;
                        best = (nx, ny);
                    }
                }
            }
            let [l, a, b] = lab[best.1 * width + best.0];
            clusters.push(Cluster {
                l,
                a,
                b,
                x: best.0 as f32,
                y: best.1 as f32,
            });
        }
    }
    clusters
}

fn channel_norm(p: [f32; 3], q: [f32; 3]) -> f32 {
    let d0 = p[0] - q[0];
    let d1 = p[1] - q[1];
    let d2 = p[2] - q[2];
    (d0 * d0 + d1 * d1 + d2 * d2).sqrt()
}

fn grid_positions(dim: usize, step: usize) -> Vec<usize> {
    let mut positions: Vec<usize> = (step / 2..dim).step_by(step).collect();
    if positions.is_empty() {
        positions.push(dim / 2);
    }
    positions
}

/// Relabel 4-connected components consecutively, merging fragments smaller
/// than `min_size` into an already-visited neighboring segment.
fn relabel_connected(labels: &[u32], width: usize, height: usize, min_size: usize) -> Vec<u32> {
    let pixel_count = width * height;
    let mut relabeled = vec![u32::MAX; pixel_count];
    let mut next_label = 0u32;
    let mut stack = Vec::new();
    let mut component = Vec::new();

    for start in 0..pixel_count {
        if relabeled[start] != u32::MAX {
            continue;
        }
        let original = labels[start];

        // 走査済み近傍のラベルが小断片の合流先になる
        let start_x = start % width;
        let start_y = start / width;
        let mut adjacent = u32::MAX;
        if start_x > 0 && relabeled[start - 1] != u32::MAX {
            adjacent = relabeled[start - 1];
        } else if start_y > 0 && relabeled[start - width] != u32::MAX {
            adjacent = relabeled[start - width];
        }

        component.clear();
        stack.push(start);
        relabeled[start] = next_label;
        while let Some(idx) = stack.pop() {
            component.push(idx);
            let x = idx % width;
            let y = idx / width;
            let mut visit = |neighbor: usize, relabeled: &mut [u32], stack: &mut Vec<usize>| {
                if relabeled[neighbor] == u32::MAX && labels[neighbor] == original {
                    relabeled[neighbor] = next_label;
                    stack.push(neighbor);
                }
            };
            if x > 0 {
                visit(idx - 1, &mut relabeled, &mut stack);
            }
            if x + 1 < width {
                visit(idx + 1, &mut relabeled, &mut stack);
            }
            if y > 0 {
                visit(idx - width, &mut relabeled, &mut stack);
            }
            if y + 1 < height {
                visit(idx + width, &mut relabeled, &mut stack);
            }
        }

        if component.len() < min_size && adjacent != u32::MAX {
            for &idx in &component {
                relabeled[idx] = adjacent;
            }
        } else {
            next_label += 1;
        }
    }

    relabeled
}

fn srgb_to_linear(channel: u8) -> f32 {
    let c = channel as f32 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// sRGB (D65) -> CIELAB.
fn rgb_to_lab(r: u8, g: u8, b: u8) -> [f32; 3] {
    let rl = srgb_to_linear(r);
    let gl = srgb_to_linear(g);
    let bl = srgb_to_linear(b);

    let x = (0.4124564 * rl + 0.3575761 * gl + 0.1804375 * bl) / 0.95047;
    let y = 0.2126729 * rl + 0.7151522 * gl + 0.0721750 * bl;
    let z = (0.0193339 * rl + 0.1191920 * gl + 0.9503041 * bl) / 1.08883;

    let f = |t: f32| {
        if t > 0.008856 {
            t.cbrt()
        } else {
            7.787 * t + 16.0 / 116.0
        }
    };

    let fx = f(x);
    let fy = f(y);
    let fz = f(z);
    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

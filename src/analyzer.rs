//! Palette extraction, palette comparison and target-color localization.

use log::debug;
use rand::Rng;

use crate::cluster::{kmeans, top_colors};
use crate::config::AnalyzerConfig;
use crate::grid::{PixelGrid, Rgb, clustering_source, downscale, sample_pixels};

/// Score reported when either palette is empty and no comparison is possible.
pub const NO_MATCH: f64 = f64::MAX;

/// Divisor of a cell's extent giving the sampling stride inside it.
const CELL_SAMPLE_DIVISIONS: u32 = 4;

// ------------------------------------------------------------
// Palette distance
// ------------------------------------------------------------

/// Euclidean distance in raw RGB, from 0 up to about 441.67.
#[inline(always)]
pub fn color_distance(a: Rgb, b: Rgb) -> f64 {
    let dr = a.red as f64 - b.red as f64;
    let dg = a.green as f64 - b.green as f64;
    let db = a.blue as f64 - b.blue as f64;
    (dr * dr + dg * dg + db * db).sqrt()
}

/// Distance from `color` to the closest entry of `palette`.
fn nearest_distance(color: Rgb, palette: &[Rgb]) -> f64 {
    palette
        .iter()
        .map(|&c| color_distance(color, c))
        .fold(NO_MATCH, f64::min)
}

/// Distance of the best-aligned color pair between two palettes.
///
/// Lower is a stronger match. Returns [`NO_MATCH`] if either palette is empty.
pub fn best_match_score(target: &[Rgb], candidate: &[Rgb]) -> f64 {
    if target.is_empty() || candidate.is_empty() {
        return NO_MATCH;
    }
    target
        .iter()
        .map(|&t| nearest_distance(t, candidate))
        .fold(NO_MATCH, f64::min)
}

/// The target color that achieves [`best_match_score`], first one on ties.
pub fn best_target_color(target: &[Rgb], candidate: &[Rgb]) -> Option<Rgb> {
    if candidate.is_empty() {
        return target.first().copied();
    }
    let mut best: Option<(Rgb, f64)> = None;
    for &t in target {
        let d = nearest_distance(t, candidate);
        if best.is_none_or(|(_, best_d)| d < best_d) {
            best = Some((t, d));
        }
    }
    best.map(|(t, _)| t)
}

// ------------------------------------------------------------
// Region localization
// ------------------------------------------------------------

/// Image region as fractions of the image size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalizedRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl NormalizedRect {
    /// Bounds of grid cell (`col`, `row`) in a `grid_size` x `grid_size` grid.
    pub fn from_cell(col: u32, row: u32, grid_size: u32) -> Self {
        let g = grid_size as f32;
        Self {
            left: col as f32 / g,
            top: row as f32 / g,
            right: (col + 1) as f32 / g,
            bottom: (row + 1) as f32 / g,
        }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.left, self.top, self.right, self.bottom]
    }

    /// Scale to a view of `width` x `height` pixels, as `[left, top, right, bottom]`.
    pub fn to_view(self, width: f32, height: f32) -> [f32; 4] {
        [
            self.left * width,
            self.top * height,
            self.right * width,
            self.bottom * height,
        ]
    }
}

/// Mean of the cell `[x0, x1) x [y0, y1)`, sampled every `max(1, extent / 4)`
/// pixels along each axis.
fn cell_mean<G: PixelGrid + ?Sized>(grid: &G, x0: u32, y0: u32, x1: u32, y1: u32) -> Option<Rgb> {
    let step_x = (x1.saturating_sub(x0) / CELL_SAMPLE_DIVISIONS).max(1) as usize;
    let step_y = (y1.saturating_sub(y0) / CELL_SAMPLE_DIVISIONS).max(1) as usize;

    let (mut r, mut g, mut b, mut count) = (0u64, 0u64, 0u64, 0u64);
    for y in (y0..y1).step_by(step_y) {
        for x in (x0..x1).step_by(step_x) {
            let c = grid.rgb_at(x, y);
            r += c.red as u64;
            g += c.green as u64;
            b += c.blue as u64;
            count += 1;
        }
    }
    if count == 0 {
        return None;
    }
    Some(Rgb::new((r / count) as u8, (g / count) as u8, (b / count) as u8))
}

/// Grid cell whose mean color is closest to `target`.
///
/// Cells are `width / grid_size` by `height / grid_size` pixels (at least 1),
/// clipped to the image; cells entirely outside the image are skipped. Ties go
/// to the first cell in row-major order. The returned rect is expressed in
/// grid fractions, not in the clipped pixel extent.
pub fn find_matching_region<G: PixelGrid + ?Sized>(grid: &G, target: Rgb, grid_size: u32) -> Option<NormalizedRect> {
    let (w, h) = (grid.width(), grid.height());
    if w == 0 || h == 0 || grid_size == 0 {
        return None;
    }
    let cell_w = (w / grid_size).max(1);
    let cell_h = (h / grid_size).max(1);

    let mut best: Option<(u32, u32, f64)> = None;
    for row in 0..grid_size {
        for col in 0..grid_size {
            let x0 = col.saturating_mul(cell_w);
            let y0 = row.saturating_mul(cell_h);
            let x1 = x0.saturating_add(cell_w).min(w);
            let y1 = y0.saturating_add(cell_h).min(h);
            let Some(mean) = cell_mean(grid, x0, y0, x1, y1) else {
                continue;
            };
            let d = color_distance(target, mean);
            if best.is_none_or(|(_, _, best_d)| d < best_d) {
                best = Some((col, row, d));
            }
        }
    }

    best.map(|(col, row, _)| NormalizedRect::from_cell(col, row, grid_size))
}

// ------------------------------------------------------------
// Matching results
// ------------------------------------------------------------

/// Outcome of comparing a target palette against one candidate image.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchResult<T> {
    /// Caller's handle for the candidate (index, path, ...).
    pub item: T,
    pub score: f64,
    /// Target color that produced `score`; localized to give `region`.
    pub best_target: Option<Rgb>,
    pub region: Option<NormalizedRect>,
}

// ------------------------------------------------------------
// Analyzer
// ------------------------------------------------------------

/// Entry point bundling the pipeline with its configuration.
///
/// Holds no mutable state; one analyzer can serve any number of images, from
/// any number of threads.
#[derive(Clone, Debug, Default)]
pub struct ColorAnalyzer {
    config: AnalyzerConfig,
}

impl ColorAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Dominant colors of `image`, most populous first, at most `count` of them.
    ///
    /// Downscale, stride-sample, brightness-filter (with fallback to the
    /// unfiltered samples) and cluster with `count` centroids seeded from `rng`.
    pub fn extract_palette_with_rng<G, R>(&self, image: &G, count: usize, rng: &mut R) -> Vec<Rgb>
    where
        G: PixelGrid + ?Sized,
        R: Rng + ?Sized,
    {
        let scaled = downscale(image, self.config.max_side);
        let pixels: Vec<Rgb> = sample_pixels(&scaled).collect();
        if pixels.is_empty() || count == 0 {
            return Vec::new();
        }
        let sampled = pixels.len();
        let source = clustering_source(
            pixels,
            count,
            self.config.min_brightness,
            self.config.max_brightness,
        );
        debug!("palette: {sampled} samples, clustering {} into {count}", source.len());
        let clusters = kmeans(&source, count, self.config.iterations, rng);
        top_colors(clusters, count)
    }

    /// [`Self::extract_palette_with_rng`] with the configured random source.
    pub fn extract_palette<G: PixelGrid + ?Sized>(&self, image: &G, count: usize) -> Vec<Rgb> {
        self.extract_palette_with_rng(image, count, &mut self.config.rng())
    }

    /// Swatches for display: `display_count` colors (12 by default).
    pub fn extract_colors<G: PixelGrid + ?Sized>(&self, image: &G) -> Vec<Rgb> {
        self.extract_palette(image, self.config.display_count)
    }

    /// Palette for matching: `match_count` colors (6 by default).
    pub fn extract_match_colors<G: PixelGrid + ?Sized>(&self, image: &G) -> Vec<Rgb> {
        self.extract_palette(image, self.config.match_count)
    }

    /// [`find_matching_region`] with the configured grid size.
    pub fn find_matching_region<G: PixelGrid + ?Sized>(&self, grid: &G, target: Rgb) -> Option<NormalizedRect> {
        find_matching_region(grid, target, self.config.grid_size)
    }

    pub fn is_match(&self, score: f64) -> bool {
        score <= self.config.match_threshold
    }

    /// Score `image` against `target` and locate the best-aligned target color in it.
    pub fn match_candidate_with_rng<T, G, R>(&self, target: &[Rgb], item: T, image: &G, rng: &mut R) -> MatchResult<T>
    where
        G: PixelGrid + ?Sized,
        R: Rng + ?Sized,
    {
        let palette = self.extract_palette_with_rng(image, self.config.match_count, rng);
        let score = best_match_score(target, &palette);
        let best_target = best_target_color(target, &palette);
        let region = if palette.is_empty() {
            None
        } else {
            best_target.and_then(|c| self.find_matching_region(image, c))
        };
        MatchResult {
            item,
            score,
            best_target,
            region,
        }
    }

    /// Match every candidate and sort ascending by score (ties keep input order).
    pub fn rank_matches_with_rng<'a, T, G, I, R>(&self, target: &[Rgb], candidates: I, rng: &mut R) -> Vec<MatchResult<T>>
    where
        G: PixelGrid + ?Sized + 'a,
        I: IntoIterator<Item = (T, &'a G)>,
        R: Rng + ?Sized,
    {
        let mut results: Vec<MatchResult<T>> = candidates
            .into_iter()
            .map(|(item, image)| self.match_candidate_with_rng(target, item, image, rng))
            .collect();
        results.sort_by(|a, b| a.score.total_cmp(&b.score));
        results
    }

    /// [`Self::rank_matches_with_rng`] with the configured random source.
    pub fn rank_matches<'a, T, G, I>(&self, target: &[Rgb], candidates: I) -> Vec<MatchResult<T>>
    where
        G: PixelGrid + ?Sized + 'a,
        I: IntoIterator<Item = (T, &'a G)>,
    {
        self.rank_matches_with_rng(target, candidates, &mut self.config.rng())
    }
}

//! Dominant-color palettes, palette matching and target-color localization.
//!
//! The pipeline works on decoded pixels in raw RGB:
//! 1. Bound the longest side (80 px by default) with bilinear resampling.
//! 2. Stride-sample about twenty pixels across the shorter side.
//! 3. Drop samples outside the brightness band, unless too few survive.
//! 4. Run fixed-iteration k-means and keep the most populous centroids.
//!
//! Two palettes are compared by their best-aligned color pair, and a target
//! color is located in an image by scanning a coarse grid of cell means.
//!
//! The byte-level helpers decode JPEG/PNG/... through `image`; the
//! `#[wasm_bindgen]` exports wrap them for JavaScript hosts.
//!
//! ```
//! use color_finder_wasm::{AnalyzerConfig, ColorAnalyzer, best_match_score};
//! use image::{Rgb, RgbImage};
//!
//! let analyzer = ColorAnalyzer::with_config(AnalyzerConfig::new().seed(1));
//! let shirt = RgbImage::from_pixel(64, 64, Rgb([180, 30, 40]));
//! let photo = RgbImage::from_pixel(64, 64, Rgb([175, 35, 45]));
//!
//! let target = analyzer.extract_palette(&shirt, 5);
//! let score = best_match_score(&target, &analyzer.extract_match_colors(&photo));
//! assert!(analyzer.is_match(score));
//! ```

use image::RgbImage;
use js_sys::{Array, Float32Array, Object, Reflect, Uint8Array};
use log::warn;
use wasm_bindgen::prelude::*;

pub mod analyzer;
pub mod cluster;
pub mod config;
pub mod error;
pub mod grid;

pub use analyzer::{
    ColorAnalyzer, MatchResult, NO_MATCH, NormalizedRect, best_match_score, best_target_color, color_distance,
    find_matching_region,
};
pub use cluster::{Cluster, kmeans, kmeans_from_seeds, top_colors};
pub use config::{AnalyzerConfig, CAPTURE_COLOR_COUNT};
pub use error::{FinderError, Result};
pub use grid::{PixelGrid, Rgb, Scaled, downscale, parse_hex, sample_pixels, to_hex};

// ------------------------------------------------------------
// Byte-level helpers
// ------------------------------------------------------------

/// Decode any format `image` understands into 8-bit RGB.
pub fn decode_rgb(input: &[u8]) -> Result<RgbImage> {
    Ok(image::load_from_memory(input)?.to_rgb8())
}

/// Decode `input` and return its `count` dominant colors as `RRGGBB` strings.
pub fn extract_palette_bytes(input: &[u8], count: usize, config: &AnalyzerConfig) -> Result<Vec<String>> {
    config.validate()?;
    let img = decode_rgb(input)?;
    let palette = ColorAnalyzer::with_config(config.clone()).extract_palette(&img, count);
    Ok(palette.into_iter().map(to_hex).collect())
}

/// Rank encoded candidate images against the palette of an encoded target.
///
/// The target palette has [`CAPTURE_COLOR_COUNT`] colors, candidates use
/// `config.match_count`. Each result's `item` is the candidate's position in
/// `candidates`. A candidate that fails to decode scores [`NO_MATCH`] instead
/// of failing the whole ranking; a target that fails to decode is an error.
pub fn match_bytes<I, B>(target: &[u8], candidates: I, config: &AnalyzerConfig) -> Result<Vec<MatchResult<usize>>>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    config.validate()?;
    let analyzer = ColorAnalyzer::with_config(config.clone());
    let mut rng = config.rng();

    let target_img = decode_rgb(target)?;
    let target_palette = analyzer.extract_palette_with_rng(&target_img, CAPTURE_COLOR_COUNT, &mut rng);

    let mut results: Vec<MatchResult<usize>> = candidates
        .into_iter()
        .enumerate()
        .map(|(idx, bytes)| match decode_rgb(bytes.as_ref()) {
            Ok(img) => analyzer.match_candidate_with_rng(&target_palette, idx, &img, &mut rng),
            Err(err) => {
                warn!("candidate {idx} skipped: {err}");
                MatchResult {
                    item: idx,
                    score: NO_MATCH,
                    best_target: None,
                    region: None,
                }
            }
        })
        .collect();
    results.sort_by(|a, b| a.score.total_cmp(&b.score));
    Ok(results)
}

// ------------------------------------------------------------
// JavaScript bindings
// ------------------------------------------------------------

fn js_err(err: FinderError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn js_config(seed: Option<u64>) -> AnalyzerConfig {
    match seed {
        Some(seed) => AnalyzerConfig::new().seed(seed),
        None => AnalyzerConfig::new(),
    }
}

fn hex_palette(values: &Array) -> std::result::Result<Vec<Rgb>, JsValue> {
    values
        .iter()
        .map(|val| {
            let s = val
                .as_string()
                .ok_or_else(|| JsValue::from_str("Palette values must be strings"))?;
            parse_hex(&s).map_err(js_err)
        })
        .collect()
}

fn js_rect(rect: Option<NormalizedRect>) -> JsValue {
    match rect {
        Some(rect) => Float32Array::from(&rect.to_array()[..]).into(),
        None => JsValue::NULL,
    }
}

/// Dominant colors of an encoded image as an array of `RRGGBB` strings.
///
/// `count` defaults to 12 (display swatches). Pass a `seed` for repeatable output.
#[wasm_bindgen]
pub fn extract_palette(input: Vec<u8>, count: Option<usize>, seed: Option<u64>) -> std::result::Result<Array, JsValue> {
    let config = js_config(seed);
    let count = count.unwrap_or(config.display_count);
    let palette = extract_palette_bytes(&input, count, &config).map_err(js_err)?;

    let out = Array::new();
    for hex in palette {
        out.push(&JsValue::from_str(&hex));
    }
    Ok(out)
}

/// Best-aligned color distance between two hex palettes (lower is closer).
#[wasm_bindgen]
pub fn match_score(target: Array, candidate: Array) -> std::result::Result<f64, JsValue> {
    Ok(best_match_score(&hex_palette(&target)?, &hex_palette(&candidate)?))
}

/// Grid cell of an encoded image closest to `target_hex`, as a
/// `Float32Array` `[left, top, right, bottom]` in 0..1, or `null`.
#[wasm_bindgen]
pub fn find_region(input: Vec<u8>, target_hex: String, grid_size: Option<u32>) -> std::result::Result<JsValue, JsValue> {
    let img = decode_rgb(&input).map_err(js_err)?;
    let target = parse_hex(&target_hex).map_err(js_err)?;
    let grid_size = grid_size.unwrap_or(config::DEFAULT_GRID_SIZE);
    Ok(js_rect(find_matching_region(&img, target, grid_size)))
}

/// Rank encoded candidate images (`Uint8Array`s) against an encoded target.
///
/// Returns `{ index, score, matched, color, region }` objects sorted by score.
#[wasm_bindgen]
pub fn rank_images(target: Vec<u8>, candidates: Array, seed: Option<u64>) -> std::result::Result<Array, JsValue> {
    let config = js_config(seed);
    let buffers: Vec<Vec<u8>> = candidates.iter().map(|val| Uint8Array::new(&val).to_vec()).collect();
    let results = match_bytes(&target, &buffers, &config).map_err(js_err)?;

    let out = Array::new();
    for result in results {
        let entry = Object::new();
        Reflect::set(&entry, &JsValue::from_str("index"), &JsValue::from_f64(result.item as f64))?;
        Reflect::set(&entry, &JsValue::from_str("score"), &JsValue::from_f64(result.score))?;
        Reflect::set(
            &entry,
            &JsValue::from_str("matched"),
            &JsValue::from_bool(result.score <= config.match_threshold),
        )?;
        let color = result.best_target.map_or(JsValue::NULL, |c| JsValue::from_str(&to_hex(c)));
        Reflect::set(&entry, &JsValue::from_str("color"), &color)?;
        Reflect::set(&entry, &JsValue::from_str("region"), &js_rect(result.region))?;
        out.push(&entry);
    }
    Ok(out)
}

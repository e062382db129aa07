//! Pixel access, downscaling, stride sampling and brightness filtering.
//!
//! Everything here reads pixels and never writes them; the only allocation
//! is the reduced RGB image produced by [`downscale`] when the input is
//! larger than the requested bound.

use std::ops::Deref;

use image::{DynamicImage, GenericImageView, ImageBuffer, Pixel, RgbImage, imageops::FilterType};
use log::debug;
use palette::Srgb;

use crate::error::{FinderError, Result};

/// 8-bit RGB triplet. Alpha is never carried.
pub type Rgb = Srgb<u8>;

/// Number of sample rows/columns aimed for along the shorter side.
const SAMPLES_PER_SHORT_SIDE: u32 = 20;

// ------------------------------------------------------------
// Colors
// ------------------------------------------------------------

/// Mean of the three channels, not rounded.
#[inline(always)]
pub fn brightness(c: Rgb) -> f32 {
    (c.red as f32 + c.green as f32 + c.blue as f32) / 3.0
}

pub fn to_hex(c: Rgb) -> String {
    format!("{:02X}{:02X}{:02X}", c.red, c.green, c.blue)
}

/// Parses `RRGGBB`, with or without a leading `#`.
pub fn parse_hex(s: &str) -> Result<Rgb> {
    let hex = s.trim().trim_start_matches('#');
    let invalid = || FinderError::InvalidHex { value: s.to_string() };
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(invalid());
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).map_err(|_| invalid());
    Ok(Srgb::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

// ------------------------------------------------------------
// Pixel grids
// ------------------------------------------------------------

/// Read-only, random-access view of decoded pixels.
///
/// Callers guarantee `x < width()` and `y < height()`; every loop in this
/// crate derives its coordinates from those bounds.
pub trait PixelGrid {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn rgb_at(&self, x: u32, y: u32) -> Rgb;
}

impl<P, C> PixelGrid for ImageBuffer<P, C>
where
    P: Pixel<Subpixel = u8>,
    C: Deref<Target = [u8]>,
{
    fn width(&self) -> u32 {
        ImageBuffer::width(self)
    }

    fn height(&self) -> u32 {
        ImageBuffer::height(self)
    }

    fn rgb_at(&self, x: u32, y: u32) -> Rgb {
        let [r, g, b] = self.get_pixel(x, y).to_rgb().0;
        Srgb::new(r, g, b)
    }
}

impl PixelGrid for DynamicImage {
    fn width(&self) -> u32 {
        GenericImageView::width(self)
    }

    fn height(&self) -> u32 {
        GenericImageView::height(self)
    }

    fn rgb_at(&self, x: u32, y: u32) -> Rgb {
        let [r, g, b, _] = GenericImageView::get_pixel(self, x, y).0;
        Srgb::new(r, g, b)
    }
}

impl<G: PixelGrid + ?Sized> PixelGrid for &G {
    fn width(&self) -> u32 {
        (**self).width()
    }

    fn height(&self) -> u32 {
        (**self).height()
    }

    fn rgb_at(&self, x: u32, y: u32) -> Rgb {
        (**self).rgb_at(x, y)
    }
}

// ------------------------------------------------------------
// Downscale
// ------------------------------------------------------------

/// Target dimensions so that the longer side equals `max_side`.
///
/// Integer arithmetic keeps the longer side exact; the shorter side is
/// floored and never drops below 1.
pub fn scaled_dimensions(width: u32, height: u32, max_side: u32) -> (u32, u32) {
    let max_side = max_side.max(1);
    if width <= max_side && height <= max_side {
        return (width, height);
    }
    let long = width.max(height) as u64;
    let scale = |side: u32| ((side as u64 * max_side as u64) / long).max(1) as u32;
    (scale(width), scale(height))
}

/// Output of [`downscale`]: the caller's grid when it already fits, or a
/// reduced RGB copy.
pub enum Scaled<'a, G: ?Sized> {
    Original(&'a G),
    Resized(RgbImage),
}

impl<G: PixelGrid + ?Sized> Scaled<'_, G> {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }
}

impl<G: PixelGrid + ?Sized> PixelGrid for Scaled<'_, G> {
    fn width(&self) -> u32 {
        match self {
            Scaled::Original(grid) => grid.width(),
            Scaled::Resized(img) => img.width(),
        }
    }

    fn height(&self) -> u32 {
        match self {
            Scaled::Original(grid) => grid.height(),
            Scaled::Resized(img) => img.height(),
        }
    }

    fn rgb_at(&self, x: u32, y: u32) -> Rgb {
        match self {
            Scaled::Original(grid) => grid.rgb_at(x, y),
            Scaled::Resized(img) => img.rgb_at(x, y),
        }
    }
}

/// Bound the longest side to `max_side` with bilinear filtering.
///
/// Grids already within the bound are borrowed, not copied.
pub fn downscale<G: PixelGrid + ?Sized>(grid: &G, max_side: u32) -> Scaled<'_, G> {
    let (w, h) = (grid.width(), grid.height());
    let (nw, nh) = scaled_dimensions(w, h, max_side);
    if (nw, nh) == (w, h) {
        return Scaled::Original(grid);
    }
    debug!("downscaling {w}x{h} -> {nw}x{nh}");
    let full = RgbImage::from_fn(w, h, |x, y| {
        let c = grid.rgb_at(x, y);
        image::Rgb([c.red, c.green, c.blue])
    });
    Scaled::Resized(image::imageops::resize(&full, nw, nh, FilterType::Triangle))
}

// ------------------------------------------------------------
// Sample
// ------------------------------------------------------------

/// Stride between sampled pixels: roughly twenty samples across the shorter side.
pub fn sample_step(width: u32, height: u32) -> u32 {
    (width.min(height) / SAMPLES_PER_SHORT_SIDE).max(1)
}

/// Row-major stride sampling of `grid`.
///
/// The iterator is lazy and can be cloned to restart from the first pixel.
pub fn sample_pixels<G: PixelGrid + ?Sized>(grid: &G) -> impl Iterator<Item = Rgb> + Clone + '_ {
    let (w, h) = (grid.width(), grid.height());
    let step = sample_step(w, h) as usize;
    (0..h)
        .step_by(step)
        .flat_map(move |y| (0..w).step_by(step).map(move |x| grid.rgb_at(x, y)))
}

// ------------------------------------------------------------
// Filter
// ------------------------------------------------------------

/// Keep pixels whose brightness lies inside `[min, max]`.
pub fn filter_brightness(pixels: &[Rgb], min: f32, max: f32) -> Vec<Rgb> {
    pixels
        .iter()
        .copied()
        .filter(|&c| (min..=max).contains(&brightness(c)))
        .collect()
}

/// The pixels clustering should run on: the brightness-filtered set, or the
/// unfiltered one when fewer than `count` pixels survive the filter.
pub fn clustering_source(pixels: Vec<Rgb>, count: usize, min: f32, max: f32) -> Vec<Rgb> {
    let filtered = filter_brightness(&pixels, min, max);
    if filtered.len() >= count {
        filtered
    } else {
        debug!(
            "brightness filter kept {} of {} pixels (< {count}), using unfiltered samples",
            filtered.len(),
            pixels.len()
        );
        pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb as Px, RgbaImage};

    fn solid(w: u32, h: u32, c: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(w, h, Px(c))
    }

    #[test]
    fn hex_round_trip_and_rejects_garbage() {
        let c = Srgb::new(0x12, 0xAB, 0xFF);
        assert_eq!(to_hex(c), "12ABFF");
        assert_eq!(parse_hex("#12abff").unwrap(), c);
        assert!(parse_hex("12AB").is_err());
        assert!(parse_hex("GG0000").is_err());
        assert!(parse_hex("éé0000").is_err());
    }

    #[test]
    fn small_image_is_borrowed() {
        let img = solid(80, 40, [10, 20, 30]);
        let out = downscale(&img, 80);
        assert!(matches!(out, Scaled::Original(_)));
        assert_eq!(out.dimensions(), (80, 40));
    }

    #[test]
    fn large_image_longer_side_hits_bound() {
        let img = solid(300, 200, [10, 20, 30]);
        let out = downscale(&img, 80);
        assert_eq!(out.dimensions(), (80, 53));

        let tall = solid(7, 1000, [0, 0, 0]);
        assert_eq!(downscale(&tall, 80).dimensions(), (1, 80));
    }

    #[test]
    fn rgba_and_dynamic_grids_downscale_like_rgb() {
        let rgb = RgbImage::from_fn(200, 100, |x, y| Px([x as u8, y as u8, 90]));
        let rgba = RgbaImage::from_fn(200, 100, |x, y| image::Rgba([x as u8, y as u8, 90, 17]));
        let dynamic = DynamicImage::ImageRgba8(rgba.clone());

        let Scaled::Resized(expected) = downscale(&rgb, 80) else {
            panic!("200x100 should be resized");
        };
        assert!(matches!(downscale(&rgba, 80), Scaled::Resized(ref img) if *img == expected));
        assert!(matches!(downscale(&dynamic, 80), Scaled::Resized(ref img) if *img == expected));
        assert!(matches!(downscale(&dynamic, 200), Scaled::Original(_)));
    }

    #[test]
    fn scaled_dimensions_preserves_aspect_within_a_pixel() {
        for &(w, h) in &[(1920, 1080), (1081, 1919), (81, 80), (4000, 3), (123, 457)] {
            let (nw, nh) = scaled_dimensions(w, h, 80);
            assert_eq!(nw.max(nh), 80);
            let expected = w.min(h) as f64 * 80.0 / w.max(h) as f64;
            assert!((nw.min(nh) as f64 - expected.max(1.0)).abs() <= 1.0);
        }
    }

    #[test]
    fn sampling_is_row_major_with_stride() {
        let mut img = RgbImage::new(40, 40);
        for (x, y, p) in img.enumerate_pixels_mut() {
            *p = Px([x as u8, y as u8, 0]);
        }
        // min side 40 -> step 2
        let coords: Vec<(u8, u8)> = sample_pixels(&img).map(|c| (c.red, c.green)).collect();
        assert_eq!(coords.len(), 400);
        assert_eq!(&coords[..3], &[(0, 0), (2, 0), (4, 0)]);
        assert_eq!(coords[20], (0, 2));
    }

    #[test]
    fn sampling_restarts_from_clone() {
        let img = solid(5, 3, [1, 2, 3]);
        let samples = sample_pixels(&img);
        assert_eq!(samples.clone().count(), 15);
        assert_eq!(samples.count(), 15);
    }

    #[test]
    fn rgba_grid_ignores_alpha() {
        let img = RgbaImage::from_pixel(2, 2, image::Rgba([9, 8, 7, 0]));
        assert_eq!(img.rgb_at(1, 1), Srgb::new(9, 8, 7));
        let dynamic = DynamicImage::ImageRgba8(img);
        assert_eq!(dynamic.rgb_at(0, 1), Srgb::new(9, 8, 7));
    }

    #[test]
    fn band_is_inclusive_and_unrounded() {
        let edge_low = Srgb::new(20, 20, 20);
        let just_below = Srgb::new(20, 20, 19); // 19.67
        let edge_high = Srgb::new(235, 235, 235);
        let just_above = Srgb::new(235, 235, 236); // 235.33
        let kept = filter_brightness(&[edge_low, just_below, edge_high, just_above], 20.0, 235.0);
        assert_eq!(kept, vec![edge_low, edge_high]);
    }

    #[test]
    fn falls_back_to_unfiltered_when_starved() {
        let pixels = vec![Srgb::new(0, 0, 0), Srgb::new(255, 255, 255), Srgb::new(100, 100, 100)];
        assert_eq!(clustering_source(pixels.clone(), 1, 20.0, 235.0).len(), 1);
        assert_eq!(clustering_source(pixels.clone(), 2, 20.0, 235.0), pixels);
    }
}

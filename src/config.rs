use log::warn;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::error::{FinderError, Result};

/// Longest side the image is reduced to before sampling.
pub const DEFAULT_MAX_SIDE: u32 = 80;
/// Palette size used for on-screen swatches.
pub const DEFAULT_DISPLAY_COUNT: usize = 12;
/// Palette size used for stored images during matching.
pub const DEFAULT_MATCH_COUNT: usize = 6;
/// Palette size used for a freshly captured object.
pub const CAPTURE_COLOR_COUNT: usize = 5;
pub const DEFAULT_MIN_BRIGHTNESS: f32 = 20.0;
pub const DEFAULT_MAX_BRIGHTNESS: f32 = 235.0;
pub const DEFAULT_ITERATIONS: usize = 15;
pub const DEFAULT_GRID_SIZE: u32 = 8;
/// Scores at or below this are reported as a match.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 80.0;

/// Every tunable of the analysis pipeline.
///
/// ```
/// use color_finder_wasm::AnalyzerConfig;
///
/// let config = AnalyzerConfig::new().max_side(64).seed(42);
/// assert_eq!(config.max_side, 64);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct AnalyzerConfig {
    pub max_side: u32,
    pub min_brightness: f32,
    pub max_brightness: f32,
    pub iterations: usize,
    pub grid_size: u32,
    pub display_count: usize,
    pub match_count: usize,
    pub match_threshold: f64,
    /// Fixed seed for centroid initialisation. `None` draws from system entropy.
    pub seed: Option<u64>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_side: DEFAULT_MAX_SIDE,
            min_brightness: DEFAULT_MIN_BRIGHTNESS,
            max_brightness: DEFAULT_MAX_BRIGHTNESS,
            iterations: DEFAULT_ITERATIONS,
            grid_size: DEFAULT_GRID_SIZE,
            display_count: DEFAULT_DISPLAY_COUNT,
            match_count: DEFAULT_MATCH_COUNT,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            seed: None,
        }
    }
}

impl AnalyzerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_side(mut self, max_side: u32) -> Self {
        self.max_side = max_side;
        self
    }

    /// Sets the inclusive brightness band, in channel-mean units (0-255).
    pub fn brightness_band(mut self, min: f32, max: f32) -> Self {
        self.min_brightness = min;
        self.max_brightness = max;
        self
    }

    pub fn iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn grid_size(mut self, grid_size: u32) -> Self {
        self.grid_size = grid_size;
        self
    }

    pub fn display_count(mut self, count: usize) -> Self {
        self.display_count = count;
        self
    }

    pub fn match_count(mut self, count: usize) -> Self {
        self.match_count = count;
        self
    }

    pub fn match_threshold(mut self, threshold: f64) -> Self {
        self.match_threshold = threshold;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Rejects settings the pipeline cannot do anything useful with.
    pub fn validate(&self) -> Result<()> {
        if self.max_side == 0 {
            return Err(FinderError::invalid("max_side", self.max_side));
        }
        if self.grid_size == 0 {
            return Err(FinderError::invalid("grid_size", self.grid_size));
        }
        if !(self.min_brightness <= self.max_brightness) {
            return Err(FinderError::invalid(
                "brightness_band",
                format!("{}..={}", self.min_brightness, self.max_brightness),
            ));
        }
        if self.match_threshold.is_nan() || self.match_threshold < 0.0 {
            return Err(FinderError::invalid("match_threshold", self.match_threshold));
        }
        Ok(())
    }

    /// Random source for centroid seeding: the fixed seed when one is set,
    /// otherwise fresh entropy.
    pub fn rng(&self) -> StdRng {
        let seed = self.seed.unwrap_or_else(|| {
            getrandom::u64().unwrap_or_else(|err| {
                warn!("system entropy unavailable ({err}), falling back to seed 0");
                0
            })
        });
        StdRng::seed_from_u64(seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn defaults_match_documented_values() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.max_side, 80);
        assert_eq!(config.display_count, 12);
        assert_eq!(config.match_count, 6);
        assert_eq!(config.iterations, 15);
        assert_eq!(config.grid_size, 8);
        assert_eq!(config.min_brightness, 20.0);
        assert_eq!(config.max_brightness, 235.0);
        assert!(config.seed.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_degenerate_settings() {
        assert!(AnalyzerConfig::new().max_side(0).validate().is_err());
        assert!(AnalyzerConfig::new().grid_size(0).validate().is_err());
        assert!(AnalyzerConfig::new().brightness_band(200.0, 100.0).validate().is_err());
        assert!(AnalyzerConfig::new().match_threshold(f64::NAN).validate().is_err());
    }

    #[test]
    fn seeded_rng_is_reproducible() {
        let config = AnalyzerConfig::new().seed(7);
        let a: u64 = config.rng().random();
        let b: u64 = config.rng().random();
        assert_eq!(a, b);
    }
}

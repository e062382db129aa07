use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use color_finder_wasm::config::{
    DEFAULT_DISPLAY_COUNT, DEFAULT_GRID_SIZE, DEFAULT_ITERATIONS, DEFAULT_MATCH_COUNT, DEFAULT_MATCH_THRESHOLD,
    DEFAULT_MAX_BRIGHTNESS, DEFAULT_MAX_SIDE, DEFAULT_MIN_BRIGHTNESS,
};
use color_finder_wasm::{AnalyzerConfig, CAPTURE_COLOR_COUNT, NO_MATCH, extract_palette_bytes, match_bytes, to_hex};
use serde_json::json;
use std::fs;
use std::path::PathBuf;

/// Extract dominant colors from images and find images sharing a color.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    tuning: Tuning,

    /// Log pipeline details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the dominant colors of each image
    Palette {
        /// One or more input image paths
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Number of colors to extract
        #[arg(short = 'k', long, default_value_t = DEFAULT_DISPLAY_COUNT)]
        n_colors: usize,
    },
    /// Rank candidate images by how well they share a color with the target
    Match {
        /// Image of the object to look for
        target: PathBuf,

        /// Images to search
        #[arg(required = true)]
        candidates: Vec<PathBuf>,

        /// Highest score still reported as a match
        #[arg(short, long, default_value_t = DEFAULT_MATCH_THRESHOLD)]
        threshold: f64,

        /// Localization grid size (cells per side)
        #[arg(short, long, default_value_t = DEFAULT_GRID_SIZE)]
        grid: u32,
    },
}

#[derive(Args, Debug)]
struct Tuning {
    /// Longest side images are reduced to before sampling
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_SIDE)]
    max_side: u32,

    /// k-means iterations
    #[arg(long, global = true, default_value_t = DEFAULT_ITERATIONS)]
    iterations: usize,

    /// Darkest channel mean kept before clustering
    #[arg(long, global = true, default_value_t = DEFAULT_MIN_BRIGHTNESS)]
    min_brightness: f32,

    /// Brightest channel mean kept before clustering
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_BRIGHTNESS)]
    max_brightness: f32,

    /// Colors extracted from each candidate when matching
    #[arg(long, global = true, default_value_t = DEFAULT_MATCH_COUNT)]
    match_count: usize,

    /// Seed for centroid initialisation (random when omitted)
    #[arg(long, global = true)]
    seed: Option<u64>,
}

impl Tuning {
    fn config(&self) -> AnalyzerConfig {
        let config = AnalyzerConfig::new()
            .max_side(self.max_side)
            .iterations(self.iterations)
            .brightness_band(self.min_brightness, self.max_brightness)
            .match_count(self.match_count);
        match self.seed {
            Some(seed) => config.seed(seed),
            None => config,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(if cli.verbose {
        "debug"
    } else {
        "warn"
    }))
    .init();

    let config = cli.tuning.config();

    match &cli.command {
        Command::Palette { inputs, n_colors } => {
            let config = config.display_count(*n_colors);
            for input in inputs {
                let bytes = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
                let palette = extract_palette_bytes(&bytes, config.display_count, &config)
                    .with_context(|| format!("palette extraction failed for {}", input.display()))?;
                println!("{}", json!({ "image": input.display().to_string(), "palette": palette }));
            }
        }
        Command::Match {
            target,
            candidates,
            threshold,
            grid,
        } => {
            let config = config.match_threshold(*threshold).grid_size(*grid);
            let target_bytes = fs::read(target).with_context(|| format!("reading {}", target.display()))?;
            let candidate_bytes = candidates
                .iter()
                .map(|path| fs::read(path).with_context(|| format!("reading {}", path.display())))
                .collect::<Result<Vec<_>>>()?;

            let ranked = match_bytes(&target_bytes, &candidate_bytes, &config).context("matching failed")?;
            let rows: Vec<_> = ranked
                .iter()
                .map(|m| {
                    let score = (m.score != NO_MATCH).then_some(m.score);
                    json!({
                        "image": candidates[m.item].display().to_string(),
                        "score": score,
                        "matched": m.score <= config.match_threshold,
                        "color": m.best_target.map(to_hex),
                        "region": m.region.map(|r| r.to_array()),
                    })
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "target": target.display().to_string(),
                    "target_colors": CAPTURE_COLOR_COUNT,
                    "matches": rows,
                }))?
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_analyzer_config() {
        let cli = Cli::try_parse_from(["color-finder-cli", "palette", "a.png"]).unwrap();
        assert_eq!(cli.tuning.config(), AnalyzerConfig::default());
        assert!(matches!(cli.command, Command::Palette { n_colors: DEFAULT_DISPLAY_COUNT, .. }));
    }

    #[test]
    fn tuning_flags_reach_config() {
        let cli = Cli::try_parse_from([
            "color-finder-cli",
            "match",
            "target.png",
            "a.png",
            "--min-brightness",
            "10",
            "--max-brightness",
            "250",
            "--match-count",
            "4",
            "--max-side",
            "64",
            "--iterations",
            "20",
            "--seed",
            "7",
        ])
        .unwrap();
        let expected = AnalyzerConfig::new()
            .max_side(64)
            .iterations(20)
            .brightness_band(10.0, 250.0)
            .match_count(4)
            .seed(7);
        assert_eq!(cli.tuning.config(), expected);
    }
}

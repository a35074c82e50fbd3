//! CLI Entry Point for raster-scan
//!
//! Provides command-line interface for:
//! - Planning a scan (resolving geometry and timing from a config file)
//! - Generating the mirror waveform for a planned scan
//! - Rebuilding and decombing an acquired frame
//!
//! # Usage
//!
//! Print the resolved scan parameters:
//! ```bash
//! raster-scan plan --config config/scan.toml
//! ```
//!
//! Write three frames of waveform samples:
//! ```bash
//! raster-scan trajectory --config config/scan.toml --frames 3 --output waveform.json
//! ```
//!
//! Rebuild one acquired frame and correct its bidirectional lag:
//! ```bash
//! raster-scan decomb --config config/scan.toml --input frame.json --output image.json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use raster_scan::config::AppConfig;
use raster_scan::geometry::{RectScan, ScanGeometry};
use raster_scan::image::ScanImage;
use raster_scan::logging::{self, LoggingConfig, OutputFormat};
use raster_scan::trajectory::{self, DeviceMapper, IdentityMapper};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "raster-scan")]
#[command(about = "Raster scan planning and waveform generation", long_about = None)]
struct Cli {
    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Override the configured log format (pretty, compact, json)
    #[arg(long, global = true)]
    log_format: Option<OutputFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the scan and print its summary as JSON
    Plan {
        /// Path to the scan config file
        #[arg(long)]
        config: PathBuf,

        /// Number of frames the summary totals cover
        #[arg(long, default_value_t = 1)]
        frames: usize,
    },

    /// Generate device-space waveform samples
    Trajectory {
        /// Path to the scan config file
        #[arg(long)]
        config: PathBuf,

        /// Number of identical frames to concatenate
        #[arg(long, default_value_t = 1)]
        frames: usize,

        /// Write the samples as JSON to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Rebuild one frame from raw samples and correct bidirectional lag
    Decomb {
        /// Path to the scan config file
        #[arg(long)]
        config: PathBuf,

        /// JSON array with one frame of raw detector samples
        #[arg(long)]
        input: PathBuf,

        /// Write the corrected image rows as JSON to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Plan { ref config, frames } => {
            let (config, geometry) = load(config, &cli)?;
            info!(name = %config.application.name, "scan planned");
            let summary = geometry.summary(frames);
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Commands::Trajectory {
            ref config,
            frames,
            ref output,
        } => {
            let (config, geometry) = load(config, &cli)?;
            let mapper: Box<dyn DeviceMapper> = match config.mapper {
                Some(affine) => Box::new(affine),
                None => Box::new(IdentityMapper),
            };
            let frame = trajectory::generate(&geometry, mapper.as_ref())
                .context("Failed to generate trajectory")?;
            let waveform = frame.repeat(frames);

            println!("samples: {}", waveform.len());
            println!("samples per frame: {}", frame.len());
            if let Some(((x0, x1), (y0, y1))) = waveform.extents() {
                println!("x range: {x0:.6e} .. {x1:.6e}");
                println!("y range: {y0:.6e} .. {y1:.6e}");
            }

            if let Some(path) = output {
                waveform
                    .write_json(path)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!(path = %path.display(), samples = waveform.len(), "waveform written");
            }
            Ok(())
        }
        Commands::Decomb {
            ref config,
            ref input,
            ref output,
        } => {
            let (config, geometry) = load(config, &cli)?;
            let text = std::fs::read_to_string(input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let samples: Vec<f64> = serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse samples in {}", input.display()))?;

            let image = ScanImage::from_samples(&samples, &geometry)
                .context("Samples do not match the configured scan")?;
            let adjusted = image
                .adjust_bidirectional(config.decomb.correction())
                .context("Failed to decomb image")?;
            let result = &adjusted.result;

            println!("shift: {} px ({:.3e} s)", result.shift, adjusted.shift_seconds);
            println!("valid columns: {:?}", result.valid_columns());

            if let Some(path) = output {
                let rows: Vec<Vec<f64>> = result
                    .image
                    .rows()
                    .into_iter()
                    .map(|row| row.to_vec())
                    .collect();
                let json = serde_json::to_string(&rows)?;
                std::fs::write(path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!(path = %path.display(), shift = result.shift, "decombed image written");
            }
            Ok(())
        }
    }
}

/// Loads the config, sets up logging and resolves the scan.
fn load(path: &Path, cli: &Cli) -> Result<(AppConfig, ScanGeometry)> {
    let mut config = AppConfig::load_from(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    if let Some(level) = &cli.log_level {
        config.application.log_level = level.clone();
    }

    let mut logging_config =
        LoggingConfig::from_app_config(&config).map_err(anyhow::Error::msg)?;
    if let Some(format) = cli.log_format {
        logging_config = logging_config.with_format(format);
    }
    logging::init(logging_config).map_err(anyhow::Error::msg)?;

    let mut scan = RectScan::from_params(&config.scan).context("Invalid scan parameters")?;
    let geometry = scan.resolve().context("Failed to resolve scan")?;
    Ok((config, geometry))
}

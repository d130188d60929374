//! Vehicle compositing CLI tool
//!
//! Command-line front end for the compositing processor: one foreground
//! photo, an optional background, and files (or stdout) for the results.

use super::config::CliConfigBuilder;
use crate::{
    plates::PlateRegion,
    preview::cutout_preview,
    processor::CompositeProcessor,
    services::{ImageIOService, ProgressTracker},
    tracing_config::{events, init_cli_tracing, spans},
    types::ProcessingOutput,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Composite a vehicle photo onto a new background
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "vehicle-composite")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Foreground vehicle photo (use "-" for stdin)
    #[arg(value_name = "FOREGROUND")]
    pub foreground: String,

    /// Background image; without one only the cutout is written
    #[arg(short, long, value_name = "BACKGROUND")]
    pub background: Option<PathBuf>,

    /// Output file for the composite (or the cutout). Use "-" for PNG on stdout.
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<String>,

    /// Reference flow to start from
    #[arg(long, value_enum, default_value_t = CliPreset::Interactive)]
    pub preset: CliPreset,

    /// JSON configuration file (replaces the preset)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Background remover
    #[arg(long, value_enum, default_value_t = CliRemover::Alpha)]
    pub remover: CliRemover,

    /// Grayscale segmentation mask for `--remover mask`
    #[arg(long, value_name = "FILE")]
    pub mask: Option<PathBuf>,

    /// Key colour for `--remover chroma` as RRGGBB [default: 00ff00]
    #[arg(long, value_name = "RRGGBB")]
    pub key_color: Option<String>,

    /// Foreground confidence threshold (0.0-1.0)
    #[arg(long)]
    pub threshold: Option<f32>,

    /// License plate region to blur as x,y,width,height (repeatable)
    #[arg(long, value_name = "X,Y,W,H")]
    pub plate: Vec<PlateRegion>,

    /// Also write the cutout to this file
    #[arg(long, value_name = "FILE")]
    pub cutout_output: Option<PathBuf>,

    /// Also write the cutout over a checkerboard to this file
    #[arg(long, value_name = "FILE")]
    pub preview_output: Option<PathBuf>,

    /// Print a JSON report (angle, orientation, placement, timings) to stdout
    #[arg(long)]
    pub report: bool,

    /// Resize the background to the foreground photo's dimensions
    #[arg(long)]
    pub match_foreground_size: bool,

    /// Subject height as a fraction of the background height
    #[arg(long)]
    pub subject_height_ratio: Option<f32>,

    /// Vertical nudge direction after centering
    #[arg(long, value_enum)]
    pub vertical_bias: Option<CliVerticalBias>,

    /// Reflection band height as a fraction of the subject height
    #[arg(long)]
    pub reflection_height_ratio: Option<f32>,

    /// Reflection fade exponent (higher fades faster)
    #[arg(long)]
    pub fade_factor: Option<f32>,

    /// Reflection blur radius
    #[arg(long)]
    pub blur_radius: Option<f32>,

    /// Reflection opacity (0.0-1.0)
    #[arg(long)]
    pub reflection_opacity: Option<f32>,

    /// Apply saturation/contrast enhancement (true/false)
    #[arg(long)]
    pub color_enhancement: Option<bool>,

    /// Letterbox the cutout onto the background canvas before analysis (true/false)
    #[arg(long)]
    pub center_subject: Option<bool>,

    /// Log each processing stage instead of showing a spinner
    #[arg(long)]
    pub progress: bool,

    /// Emit logs as JSON (requires the `tracing-json` feature)
    #[arg(long)]
    pub json_logs: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliPreset {
    Interactive,
    Service,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliRemover {
    Alpha,
    Mask,
    Chroma,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliVerticalBias {
    Down,
    Up,
    None,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let session_id = init_cli_tracing(cli.verbose, cli.json_logs).context("Failed to initialize tracing")?;
    let session = spans::session(
        &session_id,
        &format!("{:?}", cli.preset).to_lowercase(),
        &format!("{:?}", cli.remover).to_lowercase(),
    );

    run(cli).instrument(session).await
}

async fn run(cli: Cli) -> Result<()> {
    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;

    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;
    let factory = CliConfigBuilder::remover_factory(&cli)?;

    info!("Starting vehicle composite");
    info!("Foreground: {}", cli.foreground);
    if let Some(background) = &cli.background {
        info!("Background: {}", background.display());
    }

    let mut processor = CompositeProcessor::with_factory(config, Arc::new(factory))
        .context("Failed to create compositing processor")?
        .with_plate_detector(CliConfigBuilder::plate_detector(&cli));
    if cli.progress {
        processor = processor.with_progress_tracker(ProgressTracker::console(cli.verbose > 0));
    }

    let spinner = (!cli.progress && !cli.report && cli.output.as_deref() != Some("-")).then(create_spinner);

    let start_time = Instant::now();
    let result = process_inputs(&cli, &mut processor)
        .instrument(spans::file_processing(
            Path::new(&cli.foreground),
            cli.background.as_deref(),
        ))
        .await;

    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }

    let mut output = match result {
        Ok(output) => output,
        Err(e) => {
            events::error_with_context(e.as_ref(), "processing");
            return Err(e);
        },
    };

    write_outputs(&cli, &mut processor, &mut output)?;
    log_timings(&output);

    if cli.report {
        let report = output.report().to_json().context("Failed to serialize report")?;
        println!("{report}");
    }

    info!(
        "Finished in {:.2}s",
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

fn create_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        pb.set_style(style);
    }
    pb.set_message("Compositing...");
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

async fn process_inputs(cli: &Cli, processor: &mut CompositeProcessor) -> Result<ProcessingOutput> {
    if cli.foreground == "-" {
        let foreground = read_stdin()?;
        let background = match &cli.background {
            Some(path) => Some(
                tokio::fs::read(path)
                    .await
                    .with_context(|| format!("Failed to read background {}", path.display()))?,
            ),
            None => None,
        };
        return processor
            .process_bytes(&foreground, background.as_deref())
            .context("Failed to composite stdin input");
    }

    let foreground = PathBuf::from(&cli.foreground);
    if !foreground.is_file() {
        anyhow::bail!(
            "Input path does not exist or is not accessible: {}",
            foreground.display()
        );
    }

    processor
        .process_file(&foreground, cli.background.as_deref())
        .await
        .with_context(|| format!("Failed to composite {}", foreground.display()))
}

fn write_outputs(cli: &Cli, processor: &mut CompositeProcessor, output: &mut ProcessingOutput) -> Result<()> {
    match cli.output.as_deref() {
        Some("-") => {
            let image = output
                .composite
                .as_ref()
                .map_or(&output.cutout, |composite| &composite.image);
            let bytes = ImageIOService::encode_png(image).context("Failed to encode output")?;
            write_stdout(&bytes)?;
        },
        Some(target) => {
            processor
                .save_output(output, target)
                .with_context(|| format!("Failed to save {}", target))?;
            info!("💾 Saved {}", target);
        },
        None => {
            let target = generate_output_path(&cli.foreground, output.composite.is_some());
            processor
                .save_output(output, &target)
                .with_context(|| format!("Failed to save {}", target.display()))?;
            info!("💾 Saved {}", target.display());
        },
    }

    if let Some(path) = &cli.cutout_output {
        ImageIOService::save_image(&output.cutout, path)
            .with_context(|| format!("Failed to save cutout {}", path.display()))?;
        info!("💾 Saved cutout {}", path.display());
    }

    if let Some(path) = &cli.preview_output {
        ImageIOService::save_image(&cutout_preview(&output.cutout), path)
            .with_context(|| format!("Failed to save preview {}", path.display()))?;
        info!("💾 Saved preview {}", path.display());
    }

    Ok(())
}

fn log_timings(output: &ProcessingOutput) {
    let timings = &output.timings;

    info!("📊 Processing breakdown:");
    if timings.remover_load_ms > 0 {
        info!("  ├─ Remover load: {}ms", timings.remover_load_ms);
    }
    info!("  ├─ Image decode: {}ms", timings.image_decode_ms);
    info!(
        "  ├─ Plate redaction: {}ms ({} plate(s))",
        timings.plate_redaction_ms,
        output.plates.len()
    );
    info!("  ├─ Background removal: {}ms ({})", timings.background_removal_ms, output.remover);
    if let Some(composite) = &output.composite {
        info!(
            "  ├─ Analysis: {}ms ({}, {:.1}°)",
            timings.analysis_ms, composite.estimate.orientation, composite.estimate.angle
        );
        info!("  ├─ Layer synthesis: {}ms", timings.layer_synthesis_ms);
        info!("  ├─ Compositing: {}ms", timings.compositing_ms);
    }
    if let Some(encode_ms) = timings.image_encode_ms {
        info!("  ├─ Image encode: {}ms", encode_ms);
    }
    info!(
        "  └─ Total: {}ms ({:.2}s)",
        timings.total_ms,
        timings.total_ms as f64 / 1000.0
    );
    events::performance_metric("request", timings.total_ms);
}

/// Read image data from stdin
fn read_stdin() -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    io::stdin()
        .read_to_end(&mut buffer)
        .context("Failed to read from stdin")?;
    if buffer.is_empty() {
        anyhow::bail!("No data received from stdin");
    }
    Ok(buffer)
}

/// Write image data to stdout
fn write_stdout(data: &[u8]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(data).context("Failed to write to stdout")?;
    stdout.flush().context("Failed to flush stdout")?;
    Ok(())
}

/// `<stem>_composite.png` (or `_cutout.png`) next to the foreground
fn generate_output_path(foreground: &str, composited: bool) -> PathBuf {
    let suffix = if composited { "composite" } else { "cutout" };
    if foreground == "-" {
        return PathBuf::from(format!("stdin_{}.png", suffix));
    }

    let input = Path::new(foreground);
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let file_name = format!("{}_{}.png", stem, suffix);
    match input.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_output_path() {
        assert_eq!(
            generate_output_path("photos/car.jpg", true),
            PathBuf::from("photos/car_composite.png")
        );
        assert_eq!(generate_output_path("car.jpg", false), PathBuf::from("car_cutout.png"));
        assert_eq!(generate_output_path("-", true), PathBuf::from("stdin_composite.png"));
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["vehicle-composite", "car.jpg"]).unwrap();
        assert_eq!(cli.preset, CliPreset::Interactive);
        assert_eq!(cli.remover, CliRemover::Alpha);
        assert!(cli.background.is_none());
        assert!(cli.plate.is_empty());
        assert!(!cli.report);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_cli_requires_foreground() {
        assert!(Cli::try_parse_from(["vehicle-composite"]).is_err());
    }

    #[test]
    fn test_cli_rejects_unknown_preset() {
        assert!(Cli::try_parse_from(["vehicle-composite", "car.jpg", "--preset", "batch"]).is_err());
    }

    #[test]
    fn test_cli_verbosity_counts() {
        let cli = Cli::try_parse_from(["vehicle-composite", "car.jpg", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }
}

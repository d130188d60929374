#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Vehicle Composite
//!
//! Places a vehicle photo onto a new background with a synthetic drop shadow
//! and a ground reflection whose position follows the vehicle's pose.
//!
//! One request runs through these stages:
//!
//! - **Plate redaction**: detected license plates are blurred
//! - **Background removal**: a pluggable [`BackgroundRemover`] produces the cutout
//! - **Silhouette analysis**: the dominant contour gives a rotation angle and a
//!   `front`/`side` orientation
//! - **Placement**: scale and position follow the background size, the
//!   reflection offset comes from a validated angle table
//! - **Layer synthesis**: shadow and reflection are rendered from the resized
//!   subject and stacked onto the background
//!
//! Two presets reproduce the interactive and the single-shot service flows.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vehicle_composite::{CompositeProcessor, Preset, ProcessorConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ProcessorConfig::builder().preset(Preset::Service).build()?;
//! let mut processor = CompositeProcessor::new(config)?;
//!
//! let output = processor
//!     .process_file("car.png", Some(std::path::Path::new("showroom.jpg")))
//!     .await?;
//! if let Some(composite) = &output.composite {
//!     composite.save_png("composite.png")?;
//!     println!("{}", composite.report().to_json()?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Compositing an existing cutout
//!
//! ```rust,no_run
//! use vehicle_composite::{CompositeConfig, CompositionPipeline, ImageIOService};
//!
//! # fn example() -> anyhow::Result<()> {
//! let cutout = ImageIOService::load_image("cutout.png")?.to_rgba8();
//! let background = ImageIOService::load_image("showroom.jpg")?;
//!
//! let pipeline = CompositionPipeline::new(CompositeConfig::default())?;
//! let result = pipeline.compose(&background, &cutout)?;
//! println!("{} at {:.1}°", result.estimate.orientation, result.estimate.angle);
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): command-line interface, tracing subscriber and spinner
//! - `webp-support` (default): WebP encoding and decoding
//! - `tracing-json`: JSON log output for the CLI
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! vehicle-composite = { version = "0.1", default-features = false }
//! ```

pub mod alpha;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod enhance;
pub mod error;
pub mod offset_table;
pub mod pipeline;
pub mod placement;
pub mod plates;
pub mod preview;
pub mod processor;
pub mod reflection;
pub mod remover;
pub mod services;
pub mod shadow;
pub mod silhouette;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;

use tokio::io::AsyncRead;

// Public API exports
pub use config::{
    BackgroundFit, CompositeConfig, CompositeConfigBuilder, EnhancementConfig, Preset,
    ReflectionConfig, ShadowConfig, VerticalBias,
};
pub use error::{CompositeError, Result};
pub use offset_table::{OffsetBand, ReflectionOffsetTable};
pub use pipeline::CompositionPipeline;
pub use placement::{PlacementPlan, PlacementPlanner};
pub use plates::{FixedRegionDetector, NoPlateDetector, PlateDetector, PlateRedactor, PlateRegion};
pub use processor::{CompositeProcessor, ProcessorConfig, ProcessorConfigBuilder};
pub use reflection::ReflectionSynthesizer;
pub use remover::{
    AlphaPassthroughRemover, BackgroundRemover, ChromaKeyRemover, DefaultRemoverFactory,
    MaskRemover, RemoverFactory, RemoverHandle, RemoverKind, SharedRemover,
};
pub use services::{
    ConsoleProgressReporter, ImageIOService, NoOpProgressReporter, OutputFormat,
    OutputFormatHandler, ProcessingStage, ProgressReporter, ProgressTracker, ProgressUpdate,
};
pub use shadow::ShadowSynthesizer;
pub use silhouette::{Orientation, OrientationEstimate, SilhouetteAnalyzer};
pub use types::{CompositeReport, CompositeResult, ProcessingOutput, ProcessingTimings};

#[cfg(feature = "cli")]
pub use tracing_config::{events, init_cli_tracing, spans, TracingConfig, TracingFormat};

/// Composite a foreground photo onto a background, both given as encoded bytes
///
/// Runs plate redaction (none by default), background removal and
/// composition with a fresh processor.
///
/// # Examples
///
/// ```rust,no_run
/// use vehicle_composite::{composite_from_bytes, ProcessorConfig};
///
/// # async fn example(car: Vec<u8>, background: Vec<u8>) -> anyhow::Result<()> {
/// let config = ProcessorConfig::default();
/// let result = composite_from_bytes(&car, &background, &config).await?;
/// let png = result.to_png_bytes()?;
/// # Ok(())
/// # }
/// ```
pub async fn composite_from_bytes(
    foreground: &[u8],
    background: &[u8],
    config: &ProcessorConfig,
) -> Result<CompositeResult> {
    let mut processor = CompositeProcessor::new(config.clone())?;
    let output = processor.process_bytes(foreground, Some(background))?;
    output
        .composite
        .ok_or_else(|| CompositeError::processing("Compositing produced no image"))
}

/// Composite decoded images
///
/// # Examples
///
/// ```rust,no_run
/// use vehicle_composite::{composite_from_image, ProcessorConfig, ImageIOService};
///
/// # async fn example() -> anyhow::Result<()> {
/// let car = ImageIOService::load_image("car.png")?;
/// let background = ImageIOService::load_image("showroom.jpg")?;
/// let result = composite_from_image(&car, &background, &ProcessorConfig::default()).await?;
/// result.save_png("composite.png")?;
/// # Ok(())
/// # }
/// ```
pub async fn composite_from_image(
    foreground: &image::DynamicImage,
    background: &image::DynamicImage,
    config: &ProcessorConfig,
) -> Result<CompositeResult> {
    let mut processor = CompositeProcessor::new(config.clone())?;
    let output = processor.process_image(foreground, Some(background))?;
    output
        .composite
        .ok_or_else(|| CompositeError::processing("Compositing produced no image"))
}

/// Composite images read from two async streams
///
/// # Examples
///
/// ```rust,no_run
/// use vehicle_composite::{composite_from_readers, ProcessorConfig};
/// use tokio::fs::File;
///
/// # async fn example() -> anyhow::Result<()> {
/// let car = File::open("car.png").await?;
/// let background = File::open("showroom.jpg").await?;
/// let result = composite_from_readers(car, background, &ProcessorConfig::default()).await?;
/// result.save_png("composite.png")?;
/// # Ok(())
/// # }
/// ```
pub async fn composite_from_readers<R, B>(
    mut foreground: R,
    mut background: B,
    config: &ProcessorConfig,
) -> Result<CompositeResult>
where
    R: AsyncRead + Unpin,
    B: AsyncRead + Unpin,
{
    use tokio::io::AsyncReadExt;

    let mut fg_bytes = Vec::new();
    foreground.read_to_end(&mut fg_bytes).await?;
    let mut bg_bytes = Vec::new();
    background.read_to_end(&mut bg_bytes).await?;

    composite_from_bytes(&fg_bytes, &bg_bytes, config).await
}

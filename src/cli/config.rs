//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliPreset, CliRemover, CliVerticalBias};
use crate::{
    config::{BackgroundFit, CompositeConfig, Preset, VerticalBias},
    plates::{FixedRegionDetector, NoPlateDetector, PlateDetector},
    processor::{ProcessorConfig, ProcessorConfigBuilder},
    remover::{parse_hex_color, DefaultRemoverFactory, RemoverKind},
    services::ImageIOService,
};
use anyhow::{Context, Result};

impl From<CliPreset> for Preset {
    fn from(preset: CliPreset) -> Self {
        match preset {
            CliPreset::Interactive => Preset::Interactive,
            CliPreset::Service => Preset::Service,
        }
    }
}

impl From<CliRemover> for RemoverKind {
    fn from(remover: CliRemover) -> Self {
        match remover {
            CliRemover::Alpha => RemoverKind::Alpha,
            CliRemover::Mask => RemoverKind::Mask,
            CliRemover::Chroma => RemoverKind::Chroma,
        }
    }
}

impl From<CliVerticalBias> for VerticalBias {
    fn from(bias: CliVerticalBias) -> Self {
        match bias {
            CliVerticalBias::Down => VerticalBias::Down,
            CliVerticalBias::Up => VerticalBias::Up,
            CliVerticalBias::None => VerticalBias::None,
        }
    }
}

/// Convert CLI arguments to processor configuration
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build `ProcessorConfig` from CLI arguments
    ///
    /// Precedence: explicit flags, then `--config`, then `--preset`.
    pub(crate) fn from_cli(cli: &Cli) -> Result<ProcessorConfig> {
        let mut composite = match &cli.config {
            Some(path) => CompositeConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => CompositeConfig::preset(cli.preset.into()),
        };
        Self::apply_overrides(cli, &mut composite);

        ProcessorConfigBuilder::new()
            .composite(composite)
            .remover(cli.remover.into())
            .verbose_progress(cli.verbose > 0)
            .build()
            .context("Invalid configuration")
    }

    fn apply_overrides(cli: &Cli, composite: &mut CompositeConfig) {
        if let Some(ratio) = cli.subject_height_ratio {
            composite.subject_height_ratio = ratio;
        }
        if let Some(bias) = cli.vertical_bias {
            composite.vertical_bias = bias.into();
        }
        if let Some(ratio) = cli.reflection_height_ratio {
            composite.reflection.height_ratio = ratio;
        }
        if let Some(fade) = cli.fade_factor {
            composite.reflection.fade_factor = fade;
        }
        if let Some(radius) = cli.blur_radius {
            composite.reflection.blur_radius = radius;
        }
        if let Some(opacity) = cli.reflection_opacity {
            composite.reflection.opacity = opacity;
        }
        if let Some(enabled) = cli.color_enhancement {
            composite.apply_color_enhancement = enabled;
        }
        if let Some(center) = cli.center_subject {
            composite.center_subject = center;
        }
        if let Some(threshold) = cli.threshold {
            composite.removal_threshold = threshold;
        }
        if cli.match_foreground_size {
            composite.background_fit = BackgroundFit::MatchSubject;
        }
    }

    /// Remover factory carrying the mask and key colour given on the command line
    pub(crate) fn remover_factory(cli: &Cli) -> Result<DefaultRemoverFactory> {
        let mut factory = DefaultRemoverFactory::new();
        if let Some(mask_path) = &cli.mask {
            let mask = ImageIOService::load_mask(mask_path)
                .with_context(|| format!("Failed to load mask {}", mask_path.display()))?;
            factory = factory.with_mask(mask);
        }
        if let Some(color) = &cli.key_color {
            factory = factory.with_key_color(parse_hex_color(color).context("Invalid --key-color")?);
        }
        Ok(factory)
    }

    /// Plate detector for the `--plate` regions
    pub(crate) fn plate_detector(cli: &Cli) -> Box<dyn PlateDetector> {
        if cli.plate.is_empty() {
            Box::new(NoPlateDetector)
        } else {
            Box::new(FixedRegionDetector::new(cli.plate.clone()))
        }
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if cli.remover == CliRemover::Mask && cli.mask.is_none() {
            anyhow::bail!("--remover mask requires --mask <FILE>");
        }

        if let Some(color) = &cli.key_color {
            parse_hex_color(color).context("Invalid --key-color")?;
        }

        if cli.report && cli.output.as_deref() == Some("-") {
            anyhow::bail!("--report cannot be combined with --output - (both write to stdout)");
        }

        for path in [&cli.cutout_output, &cli.preview_output].into_iter().flatten() {
            if !ImageIOService::is_supported_format(path) {
                anyhow::bail!("Unsupported output extension: {}", path.display());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plates::PlateRegion;
    use clap::Parser;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("vehicle-composite").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_config_conversion() {
        let cli = parse(&["car.png", "-b", "bg.png"]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert_eq!(config.composite, CompositeConfig::preset(Preset::Interactive));
        assert_eq!(config.remover, RemoverKind::Alpha);
        assert!(!config.verbose_progress);
    }

    #[test]
    fn test_overrides_apply_on_top_of_preset() {
        let cli = parse(&[
            "car.png",
            "--preset",
            "service",
            "--subject-height-ratio",
            "0.7",
            "--vertical-bias",
            "none",
            "--reflection-opacity",
            "0.5",
            "--color-enhancement",
            "true",
            "--match-foreground-size",
            "-v",
        ]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert!((config.composite.subject_height_ratio - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.composite.vertical_bias, VerticalBias::None);
        assert!((config.composite.reflection.opacity - 0.5).abs() < f32::EPSILON);
        assert!(config.composite.apply_color_enhancement);
        assert_eq!(config.composite.background_fit, BackgroundFit::MatchSubject);
        assert!(!config.composite.center_subject);
        assert!(config.verbose_progress);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let cli = parse(&["car.png", "--subject-height-ratio", "1.5"]);
        assert!(CliConfigBuilder::from_cli(&cli).is_err());
    }

    #[test]
    fn test_config_file_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let config = CompositeConfig::builder().subject_height_ratio(0.6).build().unwrap();
        file.write_all(config.to_json().unwrap().as_bytes()).unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let cli = parse(&["car.png", "--config", &path]);
        let loaded = CliConfigBuilder::from_cli(&cli).unwrap();
        assert!((loaded.composite.subject_height_ratio - 0.6).abs() < f32::EPSILON);
    }

    #[test]
    fn test_cli_validation() {
        let cli = parse(&["car.png", "--remover", "mask"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());

        let cli = parse(&["car.png", "--key-color", "zz00zz"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());

        let cli = parse(&["car.png", "--report", "-o", "-"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());

        let cli = parse(&["car.png", "--cutout-output", "cutout.gif"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());

        let cli = parse(&["car.png", "--remover", "chroma", "--key-color", "#00ff00"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_ok());
    }

    #[test]
    fn test_plate_regions_parse() {
        let cli = parse(&["car.png", "--plate", "10,20,30,8", "--plate", "0,0,5,5"]);
        assert_eq!(
            cli.plate,
            vec![PlateRegion::new(10, 20, 30, 8), PlateRegion::new(0, 0, 5, 5)]
        );
        assert_eq!(CliConfigBuilder::plate_detector(&cli).name(), "fixed");
        assert!(Cli::try_parse_from(["vehicle-composite", "car.png", "--plate", "1,2"]).is_err());
    }
}

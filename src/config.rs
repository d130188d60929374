//! Configuration types for compositing operations

use crate::error::{CompositeError, Result};
use crate::offset_table::ReflectionOffsetTable;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Named parameter sets matching the two reference flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// Step-by-step flow: 80% subject height, downward bias, colour enhancement
    Interactive,
    /// Single-shot flow: 95% subject height, upward bias, no enhancement
    Service,
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interactive => write!(f, "interactive"),
            Self::Service => write!(f, "service"),
        }
    }
}

impl std::str::FromStr for Preset {
    type Err = CompositeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "interactive" => Ok(Self::Interactive),
            "service" => Ok(Self::Service),
            other => Err(CompositeError::invalid_config(format!(
                "Unknown preset '{}'. Expected 'interactive' or 'service'",
                other
            ))),
        }
    }
}

/// Direction of the small vertical nudge applied after centering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VerticalBias {
    /// Shift toward the bottom so the subject reads as grounded
    #[default]
    Down,
    /// Shift toward the top to leave room for a taller subject's reflection
    Up,
    /// Exact vertical centering
    None,
}

impl VerticalBias {
    /// Sign applied to the bias magnitude
    #[must_use]
    pub fn sign(self) -> i64 {
        match self {
            Self::Down => 1,
            Self::Up => -1,
            Self::None => 0,
        }
    }
}

/// How the background canvas is sized before compositing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundFit {
    /// Keep the background at its own dimensions
    #[default]
    Keep,
    /// Resize the background to the foreground photo's dimensions
    MatchSubject,
}

/// Drop shadow parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    /// Maximum shadow opacity (0-255) reached at the bottom row
    pub strength: u8,
    /// Exponent of the vertical opacity ramp
    pub exponent: f32,
    /// Gaussian blur radius
    pub blur_radius: f32,
    /// Vertical stretch factor faking ground-plane perspective
    pub stretch: f32,
    /// Downward offset in pixels relative to the subject
    pub offset_y: i64,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            strength: 200,
            exponent: 0.7,
            blur_radius: 20.0,
            stretch: 1.1,
            offset_y: 5,
        }
    }
}

/// Ground reflection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectionConfig {
    /// Reflection band height as a ratio of the subject height
    pub height_ratio: f32,
    /// Exponent of the fade ramp; larger values hold opacity longer
    pub fade_factor: f32,
    /// Gaussian blur radius applied to the band
    pub blur_radius: f32,
    /// Overall reflection opacity, clamped to 0.0-1.0
    pub opacity: f32,
    /// RGB multiplier washing out the reflected colours
    pub brighten: f32,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            height_ratio: 0.6,
            fade_factor: 0.6,
            blur_radius: 8.0,
            opacity: 0.8,
            brighten: 1.2,
        }
    }
}

/// Final global colour adjustments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementConfig {
    /// Saturation factor (1.0 = unchanged)
    pub saturation: f32,
    /// Contrast factor (1.0 = unchanged)
    pub contrast: f32,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            saturation: 1.1,
            contrast: 1.05,
        }
    }
}

/// Configuration for a compositing run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeConfig {
    /// Subject height as a fraction of the background height
    pub subject_height_ratio: f32,

    /// Direction of the vertical nudge after centering
    pub vertical_bias: VerticalBias,

    /// Magnitude of the vertical nudge as a fraction of the background height
    pub vertical_bias_ratio: f32,

    /// Apply saturation/contrast enhancement to the final composite
    pub apply_color_enhancement: bool,

    /// Enhancement factors used when `apply_color_enhancement` is set
    pub enhancement: EnhancementConfig,

    /// Drop shadow parameters
    pub shadow: ShadowConfig,

    /// Ground reflection parameters
    pub reflection: ReflectionConfig,

    /// Angle → reflection offset policy
    pub offset_table: ReflectionOffsetTable,

    /// Confidence threshold handed to the background remover (0.0-1.0)
    pub removal_threshold: f32,

    /// Background sizing policy
    pub background_fit: BackgroundFit,

    /// Letterbox the cutout onto a canvas of the background's size first
    pub center_subject: bool,

    /// Sharpness factor applied after the letterbox resize
    pub resize_sharpness: f32,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self::preset(Preset::Interactive)
    }
}

impl CompositeConfig {
    /// Configuration reproducing one of the reference flows
    #[must_use]
    pub fn preset(preset: Preset) -> Self {
        match preset {
            Preset::Interactive => Self {
                subject_height_ratio: 0.8,
                vertical_bias: VerticalBias::Down,
                vertical_bias_ratio: 0.02,
                apply_color_enhancement: true,
                enhancement: EnhancementConfig::default(),
                shadow: ShadowConfig::default(),
                reflection: ReflectionConfig::default(),
                offset_table: ReflectionOffsetTable::interactive(),
                removal_threshold: 0.75,
                background_fit: BackgroundFit::Keep,
                center_subject: true,
                resize_sharpness: 1.2,
            },
            Preset::Service => Self {
                subject_height_ratio: 0.95,
                vertical_bias: VerticalBias::Up,
                vertical_bias_ratio: 0.02,
                apply_color_enhancement: false,
                enhancement: EnhancementConfig::default(),
                shadow: ShadowConfig::default(),
                reflection: ReflectionConfig {
                    opacity: 0.35,
                    ..ReflectionConfig::default()
                },
                offset_table: ReflectionOffsetTable::service(),
                removal_threshold: 0.75,
                background_fit: BackgroundFit::MatchSubject,
                center_subject: false,
                resize_sharpness: 1.2,
            },
        }
    }

    /// Create a new configuration builder starting from the interactive preset
    ///
    /// # Examples
    ///
    /// ```rust
    /// use vehicle_composite::{CompositeConfig, VerticalBias};
    ///
    /// let config = CompositeConfig::builder()
    ///     .subject_height_ratio(0.9)
    ///     .vertical_bias(VerticalBias::None)
    ///     .apply_color_enhancement(false)
    ///     .build()
    ///     .unwrap();
    /// assert!((config.subject_height_ratio - 0.9).abs() < f32::EPSILON);
    /// ```
    #[must_use]
    pub fn builder() -> CompositeConfigBuilder {
        CompositeConfigBuilder::default()
    }

    /// Load a configuration from a JSON file
    ///
    /// Missing fields fall back to the interactive preset.
    ///
    /// # Errors
    /// - File cannot be read
    /// - JSON is malformed
    /// - Resulting configuration fails validation
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let content = std::fs::read_to_string(path_ref)
            .map_err(|e| CompositeError::file_io_error("read config file", path_ref, &e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            CompositeError::invalid_config(format!(
                "Failed to parse config '{}': {}",
                path_ref.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to pretty JSON
    ///
    /// # Errors
    /// Serialization failures (not expected for this type).
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CompositeError::processing(format!("Failed to serialize config: {}", e)))
    }

    /// Validate all configuration parameters
    ///
    /// # Validation Rules
    ///
    /// - Subject height ratio: (0.0, 1.0]
    /// - Vertical bias ratio: 0.0-0.5
    /// - Removal threshold: 0.0-1.0
    /// - Shadow exponent and stretch: finite and positive
    /// - Reflection parameters and blur radii: finite
    /// - Enhancement factors: finite and non-negative
    /// - Offset table: ordered, disjoint, exhaustive over [0, 180)
    ///
    /// Out-of-range reflection values that are still finite are accepted and
    /// handled by the reflection synthesizer's clamping rules.
    ///
    /// # Errors
    /// Returns `CompositeError::InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if !(self.subject_height_ratio > 0.0 && self.subject_height_ratio <= 1.0) {
            return Err(CompositeError::config_value_error(
                "subject height ratio",
                self.subject_height_ratio,
                "(0.0, 1.0]",
                Some(0.8),
            ));
        }

        if !(0.0..=0.5).contains(&self.vertical_bias_ratio) {
            return Err(CompositeError::config_value_error(
                "vertical bias ratio",
                self.vertical_bias_ratio,
                "0.0-0.5",
                Some(0.02),
            ));
        }

        if !(0.0..=1.0).contains(&self.removal_threshold) {
            return Err(CompositeError::config_value_error(
                "removal threshold",
                self.removal_threshold,
                "0.0-1.0",
                Some(0.75),
            ));
        }

        let shadow = &self.shadow;
        if !(shadow.exponent.is_finite() && shadow.exponent > 0.0) {
            return Err(CompositeError::config_value_error(
                "shadow exponent",
                shadow.exponent,
                "> 0.0",
                Some(0.7),
            ));
        }
        if !(shadow.stretch.is_finite() && shadow.stretch > 0.0) {
            return Err(CompositeError::config_value_error(
                "shadow stretch",
                shadow.stretch,
                "> 0.0",
                Some(1.1),
            ));
        }
        if !shadow.blur_radius.is_finite() {
            return Err(CompositeError::invalid_config("shadow blur radius must be finite"));
        }

        let reflection = &self.reflection;
        for (name, value) in [
            ("reflection height ratio", reflection.height_ratio),
            ("reflection fade factor", reflection.fade_factor),
            ("reflection blur radius", reflection.blur_radius),
            ("reflection opacity", reflection.opacity),
            ("reflection brighten", reflection.brighten),
        ] {
            if !value.is_finite() {
                return Err(CompositeError::invalid_config(format!(
                    "{} must be finite, got {}",
                    name, value
                )));
            }
        }

        for (name, value) in [
            ("saturation", self.enhancement.saturation),
            ("contrast", self.enhancement.contrast),
            ("resize sharpness", self.resize_sharpness),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(CompositeError::config_value_error(name, value, ">= 0.0", Some(1.0)));
            }
        }

        self.offset_table.validate()
    }
}

/// Builder for `CompositeConfig`
#[derive(Debug, Default)]
pub struct CompositeConfigBuilder {
    config: CompositeConfig,
}

impl CompositeConfigBuilder {
    /// Start from a preset instead of the interactive defaults
    #[must_use]
    pub fn from_preset(preset: Preset) -> Self {
        Self {
            config: CompositeConfig::preset(preset),
        }
    }

    #[must_use]
    pub fn subject_height_ratio(mut self, ratio: f32) -> Self {
        self.config.subject_height_ratio = ratio;
        self
    }

    #[must_use]
    pub fn vertical_bias(mut self, bias: VerticalBias) -> Self {
        self.config.vertical_bias = bias;
        self
    }

    #[must_use]
    pub fn vertical_bias_ratio(mut self, ratio: f32) -> Self {
        self.config.vertical_bias_ratio = ratio;
        self
    }

    #[must_use]
    pub fn apply_color_enhancement(mut self, enabled: bool) -> Self {
        self.config.apply_color_enhancement = enabled;
        self
    }

    #[must_use]
    pub fn enhancement(mut self, enhancement: EnhancementConfig) -> Self {
        self.config.enhancement = enhancement;
        self
    }

    #[must_use]
    pub fn shadow(mut self, shadow: ShadowConfig) -> Self {
        self.config.shadow = shadow;
        self
    }

    #[must_use]
    pub fn reflection(mut self, reflection: ReflectionConfig) -> Self {
        self.config.reflection = reflection;
        self
    }

    #[must_use]
    pub fn reflection_height_ratio(mut self, ratio: f32) -> Self {
        self.config.reflection.height_ratio = ratio;
        self
    }

    #[must_use]
    pub fn fade_factor(mut self, fade: f32) -> Self {
        self.config.reflection.fade_factor = fade;
        self
    }

    #[must_use]
    pub fn blur_radius(mut self, radius: f32) -> Self {
        self.config.reflection.blur_radius = radius;
        self
    }

    #[must_use]
    pub fn reflection_opacity(mut self, opacity: f32) -> Self {
        self.config.reflection.opacity = opacity;
        self
    }

    #[must_use]
    pub fn offset_table(mut self, table: ReflectionOffsetTable) -> Self {
        self.config.offset_table = table;
        self
    }

    #[must_use]
    pub fn removal_threshold(mut self, threshold: f32) -> Self {
        self.config.removal_threshold = threshold;
        self
    }

    #[must_use]
    pub fn background_fit(mut self, fit: BackgroundFit) -> Self {
        self.config.background_fit = fit;
        self
    }

    #[must_use]
    pub fn center_subject(mut self, center: bool) -> Self {
        self.config.center_subject = center;
        self
    }

    #[must_use]
    pub fn resize_sharpness(mut self, factor: f32) -> Self {
        self.config.resize_sharpness = factor;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// Any rule listed on [`CompositeConfig::validate`].
    pub fn build(self) -> Result<CompositeConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}

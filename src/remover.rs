//! Background removal seam
//!
//! Segmentation models live outside this crate. A [`BackgroundRemover`]
//! turns a photo into an RGBA cutout; a [`RemoverFactory`] builds one on
//! demand and a [`RemoverHandle`] makes sure that happens at most once.

use crate::alpha::to_rgba;
use crate::error::{CompositeError, Result};
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Rgb, RgbaImage};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{debug, info};

/// Removes the background of a photo, leaving the subject on transparency
pub trait BackgroundRemover: Send + Sync {
    /// Produce a cutout with the input's dimensions
    ///
    /// Pixels whose foreground confidence is not strictly above `threshold`
    /// become fully transparent.
    ///
    /// # Errors
    /// `CompositeError::ModelInference` when the remover cannot produce a
    /// cutout.
    fn remove(&self, image: &DynamicImage, threshold: f32) -> Result<RgbaImage>;

    /// Remover name for logging
    fn name(&self) -> &'static str;
}

/// Shared, immutable remover instance
pub type SharedRemover = Arc<dyn BackgroundRemover>;

fn confidence_to_alpha(confidence: f32, threshold: f32) -> u8 {
    if confidence > threshold {
        255
    } else {
        0
    }
}

/// Keeps the alpha channel the input already carries, binarised
///
/// Useful for photos that were cut out upstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlphaPassthroughRemover;

impl BackgroundRemover for AlphaPassthroughRemover {
    fn remove(&self, image: &DynamicImage, threshold: f32) -> Result<RgbaImage> {
        let mut cutout = to_rgba(image);
        for pixel in cutout.pixels_mut() {
            pixel[3] = confidence_to_alpha(f32::from(pixel[3]) / 255.0, threshold);
        }
        Ok(cutout)
    }

    fn name(&self) -> &'static str {
        "alpha"
    }
}

/// Applies an externally produced grayscale segmentation mask
#[derive(Debug, Clone)]
pub struct MaskRemover {
    mask: GrayImage,
}

impl MaskRemover {
    #[must_use]
    pub fn new(mask: GrayImage) -> Self {
        Self { mask }
    }
}

impl BackgroundRemover for MaskRemover {
    fn remove(&self, image: &DynamicImage, threshold: f32) -> Result<RgbaImage> {
        if self.mask.width() == 0 || self.mask.height() == 0 {
            return Err(CompositeError::model_inference("segmentation mask is empty"));
        }

        let mut cutout = to_rgba(image);
        let (width, height) = cutout.dimensions();
        let resized;
        let mask = if self.mask.dimensions() == (width, height) {
            &self.mask
        } else {
            debug!(
                mask_width = self.mask.width(),
                mask_height = self.mask.height(),
                width,
                height,
                "Resizing segmentation mask to image size"
            );
            resized = image::imageops::resize(&self.mask, width, height, FilterType::Triangle);
            &resized
        };

        for (pixel, confidence) in cutout.pixels_mut().zip(mask.pixels()) {
            pixel[3] = confidence_to_alpha(f32::from(confidence[0]) / 255.0, threshold);
        }
        Ok(cutout)
    }

    fn name(&self) -> &'static str {
        "mask"
    }
}

/// Removes a uniform backdrop colour
#[derive(Debug, Clone, Copy)]
pub struct ChromaKeyRemover {
    key: Rgb<u8>,
    /// Normalised distance at which a pixel is fully trusted as foreground
    tolerance: f32,
}

impl ChromaKeyRemover {
    pub const DEFAULT_TOLERANCE: f32 = 0.25;

    #[must_use]
    pub fn new(key: Rgb<u8>) -> Self {
        Self {
            key,
            tolerance: Self::DEFAULT_TOLERANCE,
        }
    }

    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f32) -> Self {
        self.tolerance = tolerance;
        self
    }

    fn confidence(&self, r: u8, g: u8, b: u8) -> f32 {
        let dr = f32::from(r) - f32::from(self.key[0]);
        let dg = f32::from(g) - f32::from(self.key[1]);
        let db = f32::from(b) - f32::from(self.key[2]);
        let distance = (dr * dr + dg * dg + db * db).sqrt() / (255.0 * 3f32.sqrt());
        if self.tolerance <= 0.0 {
            return 1.0;
        }
        (distance / self.tolerance).min(1.0)
    }
}

impl Default for ChromaKeyRemover {
    fn default() -> Self {
        Self::new(Rgb([0, 255, 0]))
    }
}

impl BackgroundRemover for ChromaKeyRemover {
    fn remove(&self, image: &DynamicImage, threshold: f32) -> Result<RgbaImage> {
        if !self.tolerance.is_finite() {
            return Err(CompositeError::model_inference(format!(
                "chroma key tolerance must be finite, got {}",
                self.tolerance
            )));
        }
        let mut cutout = to_rgba(image);
        for pixel in cutout.pixels_mut() {
            if pixel[3] == 0 {
                continue;
            }
            let confidence = self.confidence(pixel[0], pixel[1], pixel[2]);
            pixel[3] = confidence_to_alpha(confidence, threshold);
        }
        Ok(cutout)
    }

    fn name(&self) -> &'static str {
        "chroma"
    }
}

/// Parse a `RRGGBB` (optionally `#`-prefixed) colour
///
/// # Errors
/// `CompositeError::InvalidConfig` for anything that is not six hex digits.
pub fn parse_hex_color(value: &str) -> Result<Rgb<u8>> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CompositeError::invalid_config(format!(
            "Invalid colour '{}': expected RRGGBB",
            value
        )));
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16)
            .map_err(|e| CompositeError::invalid_config(format!("Invalid colour '{}': {}", value, e)))
    };
    Ok(Rgb([channel(0..2)?, channel(2..4)?, channel(4..6)?]))
}

/// Built-in remover implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RemoverKind {
    #[default]
    Alpha,
    Mask,
    Chroma,
}

impl std::fmt::Display for RemoverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alpha => write!(f, "alpha"),
            Self::Mask => write!(f, "mask"),
            Self::Chroma => write!(f, "chroma"),
        }
    }
}

impl std::str::FromStr for RemoverKind {
    type Err = CompositeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "alpha" => Ok(Self::Alpha),
            "mask" => Ok(Self::Mask),
            "chroma" => Ok(Self::Chroma),
            other => Err(CompositeError::invalid_config(format!(
                "Unknown remover '{}'. Expected 'alpha', 'mask' or 'chroma'",
                other
            ))),
        }
    }
}

/// Factory trait for creating background removers
pub trait RemoverFactory: Send + Sync {
    /// Create a remover of the requested kind
    ///
    /// # Errors
    /// - Kind not supported by this factory
    /// - Missing inputs the remover needs (mask, key colour)
    fn create_remover(&self, kind: RemoverKind) -> Result<SharedRemover>;

    /// List remover kinds this factory can build
    fn available_removers(&self) -> Vec<RemoverKind>;
}

/// Factory for the model-free removers shipped with the crate
#[derive(Debug, Clone, Default)]
pub struct DefaultRemoverFactory {
    mask: Option<GrayImage>,
    key_color: Option<Rgb<u8>>,
}

impl DefaultRemoverFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_mask(mut self, mask: GrayImage) -> Self {
        self.mask = Some(mask);
        self
    }

    #[must_use]
    pub fn with_key_color(mut self, key: Rgb<u8>) -> Self {
        self.key_color = Some(key);
        self
    }
}

impl RemoverFactory for DefaultRemoverFactory {
    fn create_remover(&self, kind: RemoverKind) -> Result<SharedRemover> {
        match kind {
            RemoverKind::Alpha => Ok(Arc::new(AlphaPassthroughRemover)),
            RemoverKind::Mask => {
                let mask = self.mask.clone().ok_or_else(|| {
                    CompositeError::invalid_config("Mask remover requires a segmentation mask")
                })?;
                Ok(Arc::new(MaskRemover::new(mask)))
            },
            RemoverKind::Chroma => Ok(Arc::new(
                self.key_color
                    .map_or_else(ChromaKeyRemover::default, ChromaKeyRemover::new),
            )),
        }
    }

    fn available_removers(&self) -> Vec<RemoverKind> {
        let mut kinds = vec![RemoverKind::Alpha, RemoverKind::Chroma];
        if self.mask.is_some() {
            kinds.push(RemoverKind::Mask);
        }
        kinds
    }
}

/// Lazily created remover, built at most once and immutable afterwards
pub struct RemoverHandle {
    factory: Arc<dyn RemoverFactory>,
    kind: RemoverKind,
    remover: OnceLock<SharedRemover>,
    init_lock: Mutex<()>,
}

impl RemoverHandle {
    #[must_use]
    pub fn new(factory: Arc<dyn RemoverFactory>, kind: RemoverKind) -> Self {
        Self {
            factory,
            kind,
            remover: OnceLock::new(),
            init_lock: Mutex::new(()),
        }
    }

    /// Handle around an already constructed remover
    #[must_use]
    pub fn ready(remover: SharedRemover) -> Self {
        let handle = Self::new(Arc::new(DefaultRemoverFactory::default()), RemoverKind::Alpha);
        // A fresh OnceLock is always empty
        let _ = handle.remover.set(remover);
        handle
    }

    #[must_use]
    pub fn kind(&self) -> RemoverKind {
        self.kind
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.remover.get().is_some()
    }

    /// The remover, creating it on first use
    ///
    /// # Errors
    /// Factory failures; nothing is cached when creation fails.
    pub fn get(&self) -> Result<SharedRemover> {
        if let Some(remover) = self.remover.get() {
            return Ok(Arc::clone(remover));
        }

        let _guard = self
            .init_lock
            .lock()
            .map_err(|_| CompositeError::model_inference("remover initialization lock poisoned"))?;
        if let Some(remover) = self.remover.get() {
            return Ok(Arc::clone(remover));
        }

        let remover = self.factory.create_remover(self.kind)?;
        info!(remover = remover.name(), "🧠 Background remover loaded");
        let _ = self.remover.set(Arc::clone(&remover));
        Ok(remover)
    }
}

impl std::fmt::Debug for RemoverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoverHandle")
            .field("kind", &self.kind)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

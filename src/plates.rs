//! License plate redaction
//!
//! Detection is an external concern behind [`PlateDetector`]; this module
//! only owns the region type and the blur applied to every detection.

use crate::error::{CompositeError, Result};
use image::{DynamicImage, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Blur strength applied to each plate, equivalent to a 99×99 kernel
pub const PLATE_BLUR_SIGMA: f32 = 30.0;

/// Axis-aligned plate rectangle in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlateRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PlateRegion {
    #[must_use]
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Intersection with a `width`×`height` image, `None` if empty
    #[must_use]
    pub fn clip(&self, width: u32, height: u32) -> Option<Self> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let clipped_width = self.width.min(width - self.x);
        let clipped_height = self.height.min(height - self.y);
        if clipped_width == 0 || clipped_height == 0 {
            return None;
        }
        Some(Self::new(self.x, self.y, clipped_width, clipped_height))
    }

    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x
            && y >= self.y
            && u64::from(x) < u64::from(self.x) + u64::from(self.width)
            && u64::from(y) < u64::from(self.y) + u64::from(self.height)
    }
}

impl std::str::FromStr for PlateRegion {
    type Err = CompositeError;

    /// Parse `x,y,width,height`
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let [x, y, width, height] = parts.as_slice() else {
            return Err(CompositeError::invalid_config(format!(
                "Plate region '{}' must be 'x,y,width,height'",
                s
            )));
        };
        let parse = |name: &str, value: &str| {
            value.parse::<u32>().map_err(|e| {
                CompositeError::invalid_config(format!("Invalid plate {} '{}': {}", name, value, e))
            })
        };
        Ok(Self::new(
            parse("x", *x)?,
            parse("y", *y)?,
            parse("width", *width)?,
            parse("height", *height)?,
        ))
    }
}

/// Locates license plates in an RGB image
pub trait PlateDetector: Send + Sync {
    /// Detect plates; an empty list is a valid answer
    ///
    /// # Errors
    /// `CompositeError::ModelInference` when the detector fails.
    fn detect(&self, image: &RgbImage) -> Result<Vec<PlateRegion>>;

    /// Detector name for logging
    fn name(&self) -> &'static str;
}

/// Detector that never finds anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPlateDetector;

impl PlateDetector for NoPlateDetector {
    fn detect(&self, _image: &RgbImage) -> Result<Vec<PlateRegion>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Detector returning caller-supplied regions, e.g. from an upstream service
#[derive(Debug, Clone, Default)]
pub struct FixedRegionDetector {
    regions: Vec<PlateRegion>,
}

impl FixedRegionDetector {
    #[must_use]
    pub fn new(regions: Vec<PlateRegion>) -> Self {
        Self { regions }
    }
}

impl PlateDetector for FixedRegionDetector {
    fn detect(&self, _image: &RgbImage) -> Result<Vec<PlateRegion>> {
        Ok(self.regions.clone())
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Runs a detector and blurs every region it reports
pub struct PlateRedactor {
    detector: Box<dyn PlateDetector>,
    sigma: f32,
}

impl PlateRedactor {
    #[must_use]
    pub fn new(detector: Box<dyn PlateDetector>) -> Self {
        Self {
            detector,
            sigma: PLATE_BLUR_SIGMA,
        }
    }

    #[must_use]
    pub fn with_sigma(mut self, sigma: f32) -> Self {
        self.sigma = sigma;
        self
    }

    /// Blur detected plates, returning the redacted image and the regions used
    ///
    /// Alpha is preserved. Regions are clipped to the image bounds.
    ///
    /// # Errors
    /// Detector failures.
    #[instrument(skip(self, image), fields(detector = self.detector.name()))]
    pub fn redact(&self, image: &DynamicImage) -> Result<(DynamicImage, Vec<PlateRegion>)> {
        let regions = self.detector.detect(&image.to_rgb8())?;
        if regions.is_empty() {
            debug!("No license plates detected");
            return Ok((image.clone(), regions));
        }

        let mut rgba = image.to_rgba8();
        let applied = blur_regions(&mut rgba, &regions, self.sigma);
        info!(plates = applied.len(), "🚘 License plates blurred");
        Ok((DynamicImage::ImageRgba8(rgba), applied))
    }
}

impl Default for PlateRedactor {
    fn default() -> Self {
        Self::new(Box::new(NoPlateDetector))
    }
}

/// Blur the colour of each region in place, keeping its alpha
///
/// Returns the clipped regions that were applied.
pub fn blur_regions(image: &mut RgbaImage, regions: &[PlateRegion], sigma: f32) -> Vec<PlateRegion> {
    let (width, height) = image.dimensions();
    let mut applied = Vec::with_capacity(regions.len());
    for region in regions.iter().filter_map(|r| r.clip(width, height)) {
        let roi = image::imageops::crop_imm(&*image, region.x, region.y, region.width, region.height)
            .to_image();
        let mut blurred = crate::alpha::gaussian_blur(&roi, sigma);
        for (target, source) in blurred.pixels_mut().zip(roi.pixels()) {
            target[3] = source[3];
        }
        image::imageops::replace(image, &blurred, i64::from(region.x), i64::from(region.y));
        applied.push(region);
    }
    applied
}

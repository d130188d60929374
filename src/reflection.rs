//! Ground reflection synthesis

use crate::alpha::{brighten, clear_transparent, fading_ramp, gaussian_blur, pixel_view_mut};
use crate::config::ReflectionConfig;
use crate::error::Result;
use image::imageops;
use image::RgbaImage;
use ndarray::Axis;
use tracing::{debug, instrument};

/// Renders a flipped, fading, washed-out copy of the subject
#[derive(Debug, Clone, Default)]
pub struct ReflectionSynthesizer {
    config: ReflectionConfig,
}

impl ReflectionSynthesizer {
    #[must_use]
    pub fn new(config: ReflectionConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ReflectionConfig {
        &self.config
    }

    /// Height of the reflection band for a subject of `subject_height` rows
    ///
    /// Zero when the height ratio is not positive.
    #[must_use]
    pub fn band_height(&self, subject_height: u32) -> u32 {
        let ratio = self.config.height_ratio;
        if !(ratio.is_finite() && ratio > 0.0) {
            return 0;
        }
        (subject_height as f32 * ratio).round() as u32
    }

    /// Effective opacity after clamping to `[0, 1]`
    #[must_use]
    pub fn opacity(&self) -> f32 {
        if self.config.opacity.is_nan() {
            0.0
        } else {
            self.config.opacity.clamp(0.0, 1.0)
        }
    }

    /// Reflection band, or `None` when the band would be empty
    ///
    /// The output is as wide as the subject and `band_height` rows tall. Its
    /// alpha never exceeds the mirrored subject alpha times the opacity
    /// before the final blur.
    ///
    /// # Errors
    /// Buffer shape errors from the pixel view.
    #[instrument(skip(self, subject), fields(width = subject.width(), height = subject.height()))]
    pub fn synthesize(&self, subject: &RgbaImage) -> Result<Option<RgbaImage>> {
        let (width, height) = subject.dimensions();
        let band_height = self.band_height(height).min(height);
        if width == 0 || band_height == 0 {
            debug!("🪞 Reflection skipped: empty band");
            return Ok(None);
        }

        let unblurred = self.fade_band(subject, band_height)?;
        let mut band = gaussian_blur(&unblurred, self.config.blur_radius);
        clear_transparent(&mut band);

        debug!(
            band_height,
            opacity = self.opacity(),
            fade_factor = self.config.fade_factor,
            "🪞 Reflection layer synthesized"
        );
        Ok(Some(band))
    }

    /// Flip, crop and fade without the final blur
    fn fade_band(&self, subject: &RgbaImage, band_height: u32) -> Result<RgbaImage> {
        let (width, height) = subject.dimensions();
        let flipped = imageops::flip_vertical(subject);
        let mut band = imageops::crop_imm(&flipped, 0, 0, width, band_height).to_image();

        let mask = fading_ramp(band_height, self.config.fade_factor);
        let opacity = self.opacity();
        let brighten_factor = self.config.brighten;

        let mut view = pixel_view_mut(&mut band)?;
        for (y, mut row) in view.axis_iter_mut(Axis(0)).enumerate() {
            let mask_y = ((y as f32 / height as f32) * band_height as f32).round() as usize;
            let row_factor = mask
                .get(mask_y)
                .map_or(0.0, |&m| f32::from(m) / 255.0 * opacity);

            for mut pixel in row.axis_iter_mut(Axis(0)) {
                if pixel[3] == 0 {
                    pixel.fill(0);
                    continue;
                }
                let alpha = (f32::from(pixel[3]) * row_factor).floor() as u8;
                if alpha == 0 {
                    pixel.fill(0);
                    continue;
                }
                pixel[0] = brighten(pixel[0], brighten_factor);
                pixel[1] = brighten(pixel[1], brighten_factor);
                pixel[2] = brighten(pixel[2], brighten_factor);
                pixel[3] = alpha;
            }
        }
        Ok(band)
    }
}

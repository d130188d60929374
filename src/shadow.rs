//! Soft drop shadow synthesis

use crate::alpha::{gaussian_blur, pixel_view_mut, rising_ramp};
use crate::config::ShadowConfig;
use crate::error::Result;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use ndarray::Axis;
use tracing::{debug, instrument};

/// Renders a black, bottom-weighted shadow from a subject's alpha
#[derive(Debug, Clone, Default)]
pub struct ShadowSynthesizer {
    config: ShadowConfig,
}

impl ShadowSynthesizer {
    #[must_use]
    pub fn new(config: ShadowConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ShadowConfig {
        &self.config
    }

    /// Shadow layer with the subject's dimensions
    ///
    /// Every visible subject pixel becomes black with an opacity that grows
    /// toward the bottom row. The layer is then blurred and stretched
    /// vertically, keeping the top `height` rows.
    ///
    /// # Errors
    /// Buffer shape errors from the pixel view.
    #[instrument(skip(self, subject), fields(width = subject.width(), height = subject.height()))]
    pub fn synthesize(&self, subject: &RgbaImage) -> Result<RgbaImage> {
        let height = subject.height();
        let ramp = rising_ramp(
            height,
            f32::from(self.config.strength),
            self.config.exponent,
        );

        let mut shadow = subject.clone();
        {
            let mut view = pixel_view_mut(&mut shadow)?;
            for (mut row, &opacity) in view.axis_iter_mut(Axis(0)).zip(ramp.iter()) {
                for mut pixel in row.axis_iter_mut(Axis(0)) {
                    let visible = pixel[3] > 0;
                    pixel.fill(0);
                    if visible {
                        pixel[3] = opacity;
                    }
                }
            }
        }

        let blurred = gaussian_blur(&shadow, self.config.blur_radius);
        let stretched = self.stretch(&blurred);

        debug!(
            strength = self.config.strength,
            stretch = self.config.stretch,
            "🌑 Shadow layer synthesized"
        );
        Ok(stretched)
    }

    fn stretch(&self, layer: &RgbaImage) -> RgbaImage {
        let (width, height) = layer.dimensions();
        if width == 0 || height == 0 {
            return layer.clone();
        }
        let stretched_height = ((height as f32) * self.config.stretch).round().max(1.0) as u32;
        if stretched_height == height {
            return layer.clone();
        }

        let resized = imageops::resize(layer, width, stretched_height, FilterType::Lanczos3);
        if stretched_height > height {
            imageops::crop_imm(&resized, 0, 0, width, height).to_image()
        } else {
            let mut canvas = RgbaImage::new(width, height);
            imageops::replace(&mut canvas, &resized, 0, 0);
            canvas
        }
    }
}

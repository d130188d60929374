//! Alpha-aware pixel helpers shared by the layer synthesizers
//!
//! Everything here works on RGBA buffers. Per-row factors are computed once
//! and applied across whole rows through `ndarray` views of the raw buffer.

use crate::error::{CompositeError, Result};
use image::{DynamicImage, GrayImage, Luma, RgbaImage};
use ndarray::ArrayViewMut3;

/// Normalize any decoded image to RGBA
#[must_use]
pub fn to_rgba(image: &DynamicImage) -> RgbaImage {
    match image {
        DynamicImage::ImageRgba8(rgba) => rgba.clone(),
        other => other.to_rgba8(),
    }
}

/// View an RGBA buffer as `(row, column, channel)`
///
/// # Errors
/// Returns a processing error if the buffer length does not match its
/// dimensions.
pub fn pixel_view_mut(image: &mut RgbaImage) -> Result<ArrayViewMut3<'_, u8>> {
    let (width, height) = image.dimensions();
    let raw: &mut [u8] = image;
    ArrayViewMut3::from_shape((height as usize, width as usize, 4), raw).map_err(|e| {
        CompositeError::processing_stage_error(
            "pixel view",
            &e.to_string(),
            Some(&format!("{}x{} RGBA", width, height)),
        )
    })
}

/// Binary mask: 255 where alpha exceeds `threshold`, 0 elsewhere
#[must_use]
pub fn alpha_mask(image: &RgbaImage, threshold: u8) -> GrayImage {
    let (width, height) = image.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        if image.get_pixel(x, y)[3] > threshold {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// True when no pixel carries any opacity
#[must_use]
pub fn is_fully_transparent(image: &RgbaImage) -> bool {
    image.pixels().all(|p| p[3] == 0)
}

/// Opacity ramp growing toward the bottom: `round(strength * (y / height)^exponent)`
#[must_use]
pub fn rising_ramp(height: u32, strength: f32, exponent: f32) -> Vec<u8> {
    let h = height.max(1) as f32;
    (0..height)
        .map(|y| {
            let y_norm = y as f32 / h;
            clamp_to_u8(strength * y_norm.powf(exponent))
        })
        .collect()
}

/// Fade ramp shrinking toward the bottom: `round(255 * (1 - (y / height)^fade))`
///
/// A non-positive or non-finite `fade` produces an all-zero ramp: the band is
/// fully transparent rather than carrying NaN or negative opacity.
#[must_use]
pub fn fading_ramp(height: u32, fade: f32) -> Vec<u8> {
    if !(fade.is_finite() && fade > 0.0) {
        return vec![0; height as usize];
    }
    let h = height.max(1) as f32;
    (0..height)
        .map(|y| {
            let y_norm = y as f32 / h;
            clamp_to_u8(255.0 * (1.0 - y_norm.powf(fade)))
        })
        .collect()
}

/// Multiply a colour channel, rounding and saturating at 255
#[must_use]
pub fn brighten(value: u8, factor: f32) -> u8 {
    clamp_to_u8(f32::from(value) * factor)
}

/// Round and clamp a float into the 0-255 range
#[must_use]
pub fn clamp_to_u8(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 255.0) as u8
}

/// Gaussian blur with PIL-style radius semantics; radius <= 0 is a no-op
#[must_use]
pub fn gaussian_blur(image: &RgbaImage, radius: f32) -> RgbaImage {
    if !(radius.is_finite() && radius > 0.0) || image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    imageproc::filter::gaussian_blur_f32(image, radius)
}

/// Zero the colour of every fully transparent pixel
pub fn clear_transparent(image: &mut RgbaImage) {
    for pixel in image.pixels_mut() {
        if pixel[3] == 0 {
            pixel.0 = [0, 0, 0, 0];
        }
    }
}

/// Alpha-composite `layer` over `base` with its top-left corner at `(x, y)`
///
/// Parts falling outside `base` are clipped.
pub fn overlay_layer(base: &mut RgbaImage, layer: &RgbaImage, x: i64, y: i64) {
    image::imageops::overlay(base, layer, x, y);
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_alpha_mask() {
        let mut image = RgbaImage::new(2, 1);
        image.put_pixel(0, 0, Rgba([10, 20, 30, 0]));
        image.put_pixel(1, 0, Rgba([10, 20, 30, 1]));

        let mask = alpha_mask(&image, 0);
        assert_eq!(mask.get_pixel(0, 0)[0], 0);
        assert_eq!(mask.get_pixel(1, 0)[0], 255);
    }

    #[test]
    fn test_rising_ramp_is_monotonic() {
        let ramp = rising_ramp(100, 200.0, 0.7);
        assert_eq!(ramp.len(), 100);
        assert_eq!(ramp[0], 0);
        assert!(ramp.windows(2).all(|w| w[0] <= w[1]));
        assert!(*ramp.last().unwrap() <= 200);
        // round(200 * 0.99^0.7) = 199
        assert_eq!(*ramp.last().unwrap(), 199);
    }

    #[test]
    fn test_fading_ramp() {
        let ramp = fading_ramp(10, 0.6);
        assert_eq!(ramp[0], 255);
        assert!(ramp.windows(2).all(|w| w[0] >= w[1]));

        // round(255 * (1 - 0.5^0.6)) = round(86.74) = 87
        let ramp = fading_ramp(2, 0.6);
        assert_eq!(ramp, vec![255, 87]);
    }

    #[test]
    fn test_fading_ramp_degenerate_fade() {
        assert!(fading_ramp(8, 0.0).iter().all(|&a| a == 0));
        assert!(fading_ramp(8, -1.0).iter().all(|&a| a == 0));
        assert!(fading_ramp(8, f32::NAN).iter().all(|&a| a == 0));
    }

    #[test]
    fn test_brighten_saturates() {
        assert_eq!(brighten(100, 1.2), 120);
        assert_eq!(brighten(250, 1.2), 255);
        assert_eq!(brighten(0, 1.2), 0);
    }

    #[test]
    fn test_pixel_view_shape() {
        let mut image = RgbaImage::new(3, 2);
        let view = pixel_view_mut(&mut image).unwrap();
        assert_eq!(view.shape(), &[2, 3, 4]);
    }

    #[test]
    fn test_blur_zero_radius_is_identity() {
        let image = RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 4]));
        assert_eq!(gaussian_blur(&image, 0.0), image);
        assert_eq!(gaussian_blur(&image, -3.0), image);
    }

    #[test]
    fn test_clear_transparent() {
        let mut image = RgbaImage::new(2, 1);
        image.put_pixel(0, 0, Rgba([40, 50, 60, 0]));
        image.put_pixel(1, 0, Rgba([40, 50, 60, 1]));
        clear_transparent(&mut image);
        assert_eq!(image.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
        assert_eq!(image.get_pixel(1, 0), &Rgba([40, 50, 60, 1]));
    }

    #[test]
    fn test_overlay_clips() {
        let mut base = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let layer = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]));
        overlay_layer(&mut base, &layer, 2, -2);
        assert_eq!(base.get_pixel(3, 0), &Rgba([255, 255, 255, 255]));
        assert_eq!(base.get_pixel(3, 2), &Rgba([0, 0, 0, 255]));
        assert_eq!(base.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
    }
}

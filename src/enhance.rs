//! Global colour adjustments for the finished composite
//!
//! Each operator blends the image with a "degenerate" version of itself:
//! `out = degenerate + factor * (image - degenerate)`. A factor of 1.0 is the
//! identity, 0.0 yields the degenerate image. Alpha is never touched.
//!
//! | operator   | degenerate image                          |
//! |------------|-------------------------------------------|
//! | saturation | per-pixel luma (grayscale)                |
//! | contrast   | uniform mean luma of the whole image      |
//! | sharpness  | 3×3 smoothing filter (centre weight 5/13) |

use crate::alpha::clamp_to_u8;
use crate::config::EnhancementConfig;
use image::RgbaImage;

/// Weights of the smoothing kernel used as the sharpness baseline
const SMOOTH_KERNEL: [f32; 9] = [
    1.0 / 13.0,
    1.0 / 13.0,
    1.0 / 13.0,
    1.0 / 13.0,
    5.0 / 13.0,
    1.0 / 13.0,
    1.0 / 13.0,
    1.0 / 13.0,
    1.0 / 13.0,
];

/// ITU-R 601-2 luma
#[must_use]
pub fn luma(r: u8, g: u8, b: u8) -> f32 {
    (f32::from(r) * 299.0 + f32::from(g) * 587.0 + f32::from(b) * 114.0) / 1000.0
}

fn blend(degenerate: f32, value: u8, factor: f32) -> u8 {
    clamp_to_u8(degenerate + factor * (f32::from(value) - degenerate))
}

/// Scale colour saturation
#[must_use]
pub fn adjust_saturation(image: &RgbaImage, factor: f32) -> RgbaImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let gray = luma(pixel[0], pixel[1], pixel[2]).round();
        for channel in 0..3 {
            pixel[channel] = blend(gray, pixel[channel], factor);
        }
    }
    out
}

/// Scale contrast around the image's mean luma
#[must_use]
pub fn adjust_contrast(image: &RgbaImage, factor: f32) -> RgbaImage {
    let pixel_count = u64::from(image.width()) * u64::from(image.height());
    if pixel_count == 0 {
        return image.clone();
    }
    let total: f64 = image
        .pixels()
        .map(|p| f64::from(luma(p[0], p[1], p[2]).round()))
        .sum();
    let mean = (total / pixel_count as f64 + 0.5).floor() as f32;

    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        for channel in 0..3 {
            pixel[channel] = blend(mean, pixel[channel], factor);
        }
    }
    out
}

/// Sharpen (factor > 1) or soften (factor < 1) against a smoothed copy
///
/// Border pixels keep their original values, matching a 3×3 filter that
/// only evaluates interior pixels.
#[must_use]
pub fn adjust_sharpness(image: &RgbaImage, factor: f32) -> RgbaImage {
    let (width, height) = image.dimensions();
    if width < 3 || height < 3 || (factor - 1.0).abs() < f32::EPSILON {
        return image.clone();
    }

    let smoothed: RgbaImage = image::imageops::filter3x3(image, &SMOOTH_KERNEL);
    let mut out = image.clone();
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let source = image.get_pixel(x, y);
            let baseline = smoothed.get_pixel(x, y);
            let target = out.get_pixel_mut(x, y);
            for channel in 0..3 {
                target[channel] = blend(f32::from(baseline[channel]), source[channel], factor);
            }
        }
    }
    out
}

/// Saturation then contrast, as configured
#[must_use]
pub fn apply(image: &RgbaImage, config: &EnhancementConfig) -> RgbaImage {
    let saturated = adjust_saturation(image, config.saturation);
    adjust_contrast(&saturated, config.contrast)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient() -> RgbaImage {
        RgbaImage::from_fn(8, 8, |x, y| {
            Rgba([(x * 30) as u8, (y * 30) as u8, ((x + y) * 15) as u8, 200])
        })
    }

    #[test]
    fn test_identity_factors() {
        let image = gradient();
        assert_eq!(adjust_saturation(&image, 1.0), image);
        assert_eq!(adjust_contrast(&image, 1.0), image);
        assert_eq!(adjust_sharpness(&image, 1.0), image);
        let config = EnhancementConfig {
            saturation: 1.0,
            contrast: 1.0,
        };
        assert_eq!(apply(&image, &config), image);
    }

    #[test]
    fn test_zero_saturation_is_grayscale() {
        let image = gradient();
        let gray = adjust_saturation(&image, 0.0);
        for pixel in gray.pixels() {
            assert_eq!(pixel[0], pixel[1]);
            assert_eq!(pixel[1], pixel[2]);
            assert_eq!(pixel[3], 200);
        }
    }

    #[test]
    fn test_saturation_boost_spreads_channels() {
        let image = RgbaImage::from_pixel(1, 1, Rgba([200, 100, 50, 255]));
        let boosted = adjust_saturation(&image, 1.1);
        let p = boosted.get_pixel(0, 0);
        assert!(p[0] > 200);
        assert!(p[2] < 50);
        assert_eq!(p[3], 255);
    }

    #[test]
    fn test_zero_contrast_is_uniform() {
        let image = gradient();
        let flat = adjust_contrast(&image, 0.0);
        let first = *flat.get_pixel(0, 0);
        assert!(flat.pixels().all(|p| p[0] == first[0] && p[1] == first[0]));
    }

    #[test]
    fn test_sharpness_keeps_borders_and_alpha() {
        let image = gradient();
        let sharp = adjust_sharpness(&image, 2.0);
        assert_eq!(sharp.get_pixel(0, 0), image.get_pixel(0, 0));
        assert_eq!(sharp.get_pixel(7, 7), image.get_pixel(7, 7));
        assert!(sharp.pixels().all(|p| p[3] == 200));
    }

    #[test]
    fn test_luma_weights() {
        assert!((luma(255, 255, 255) - 255.0).abs() < 1e-3);
        assert!((luma(255, 0, 0) - 76.245).abs() < 1e-3);
    }
}

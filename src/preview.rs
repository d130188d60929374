//! Transparency preview for cutouts

use crate::alpha::overlay_layer;
use image::{Rgba, RgbaImage};

/// Side of one checkerboard square in pixels
pub const CHECKER_SQUARE: u32 = 15;

const LIGHT: Rgba<u8> = Rgba([235, 235, 235, 255]);
const DARK: Rgba<u8> = Rgba([215, 215, 215, 255]);
const BASE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Opaque checkerboard
///
/// Each `2 × square` tile has a light square top-left, a dark square
/// bottom-right and white elsewhere.
#[must_use]
pub fn checkerboard(width: u32, height: u32, square: u32) -> RgbaImage {
    let square = square.max(1);
    RgbaImage::from_fn(width, height, |x, y| {
        match ((x / square) % 2, (y / square) % 2) {
            (0, 0) => LIGHT,
            (1, 1) => DARK,
            _ => BASE,
        }
    })
}

/// Cutout composited over a checkerboard of the same size
#[must_use]
pub fn cutout_preview(cutout: &RgbaImage) -> RgbaImage {
    let mut preview = checkerboard(cutout.width(), cutout.height(), CHECKER_SQUARE);
    overlay_layer(&mut preview, cutout, 0, 0);
    preview
}

//! Output format selection for composites and cutouts

use crate::error::{CompositeError, Result};
use image::{DynamicImage, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Encodings the crate writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Lossless, keeps alpha
    #[default]
    Png,
    /// Lossy, alpha is dropped
    Jpeg,
    /// Keeps alpha (requires the `webp-support` feature)
    WebP,
    /// Lossless, keeps alpha
    Tiff,
}

impl OutputFormat {
    /// Guess the format from a file extension
    ///
    /// # Errors
    /// `CompositeError::InvalidConfig` for missing or unsupported extensions.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let extension = path_ref
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| {
                CompositeError::invalid_config(format!(
                    "Output path '{}' has no file extension",
                    path_ref.display()
                ))
            })?;

        match extension.as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::WebP),
            "tif" | "tiff" => Ok(Self::Tiff),
            other => Err(CompositeError::invalid_config(format!(
                "Unsupported output extension '{}'. Expected png, jpg, webp or tiff",
                other
            ))),
        }
    }

    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
            Self::Tiff => "tiff",
        }
    }

    #[must_use]
    pub fn supports_transparency(self) -> bool {
        !matches!(self, Self::Jpeg)
    }

    #[must_use]
    pub fn image_format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
            Self::WebP => ImageFormat::WebP,
            Self::Tiff => ImageFormat::Tiff,
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Converts RGBA buffers into something the target encoder accepts
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Wrap an RGBA image for `format`, dropping alpha where unsupported
    #[must_use]
    pub fn convert_format(rgba_image: RgbaImage, format: OutputFormat) -> DynamicImage {
        let image = DynamicImage::ImageRgba8(rgba_image);
        if format.supports_transparency() {
            image
        } else {
            log::debug!("Dropping alpha channel for {} output", format);
            DynamicImage::ImageRgb8(image.to_rgb8())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_from_path() {
        assert_eq!(OutputFormat::from_path("out.PNG").unwrap(), OutputFormat::Png);
        assert_eq!(OutputFormat::from_path("a/b.jpeg").unwrap(), OutputFormat::Jpeg);
        assert_eq!(OutputFormat::from_path("x.tif").unwrap(), OutputFormat::Tiff);
        assert!(OutputFormat::from_path("noext").is_err());
        assert!(OutputFormat::from_path("x.gif").is_err());
    }

    #[test]
    fn test_convert_format_jpeg_drops_alpha() {
        let rgba = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 128]));
        let converted = OutputFormatHandler::convert_format(rgba, OutputFormat::Jpeg);
        assert!(matches!(converted, DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn test_convert_format_png_keeps_alpha() {
        let rgba = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 128]));
        let converted = OutputFormatHandler::convert_format(rgba.clone(), OutputFormat::Png);
        assert_eq!(converted.to_rgba8(), rgba);
    }

    #[test]
    fn test_extension_roundtrip() {
        for format in [
            OutputFormat::Png,
            OutputFormat::Jpeg,
            OutputFormat::WebP,
            OutputFormat::Tiff,
        ] {
            let path = format!("out.{}", format.extension());
            assert_eq!(OutputFormat::from_path(path).unwrap(), format);
        }
    }
}

//! Image I/O operations service
//!
//! Decoding, encoding and file access live here so the compositing stages
//! only ever see in-memory buffers.

use crate::{
    error::{CompositeError, Result},
    services::format::{OutputFormat, OutputFormatHandler},
};
use image::{DynamicImage, GrayImage, RgbaImage};
use std::io::Cursor;
use std::path::Path;

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// Falls back to content sniffing when the extension is wrong.
    ///
    /// # Examples
    /// ```rust,no_run
    /// use vehicle_composite::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("car.jpg")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    ///
    /// # Errors
    /// - File missing or unreadable
    /// - Bytes cannot be decoded as an image
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(CompositeError::file_io_error(
                "read image file",
                path_ref,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(e) => {
                log::debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path_ref.display(),
                    e
                );
                let data = std::fs::read(path_ref)
                    .map_err(|io_err| CompositeError::file_io_error("read image data", path_ref, &io_err))?;
                image::load_from_memory(&data).map_err(|content_err| {
                    CompositeError::input_decode(format!(
                        "'{}' ({} bytes) is not a decodable image: {}; {}",
                        path_ref.display(),
                        data.len(),
                        e,
                        content_err
                    ))
                })
            },
        }
    }

    /// Load a grayscale segmentation mask
    ///
    /// # Errors
    /// Same as [`ImageIOService::load_image`].
    pub fn load_mask<P: AsRef<Path>>(path: P) -> Result<GrayImage> {
        Ok(Self::load_image(path)?.to_luma8())
    }

    /// Decode an image from bytes
    ///
    /// # Errors
    /// `CompositeError::InputDecode` for empty or malformed data.
    pub fn load_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(CompositeError::input_decode("image data is empty"));
        }
        image::load_from_memory(bytes).map_err(|e| {
            CompositeError::input_decode(format!("Failed to decode image from bytes: {}", e))
        })
    }

    /// Read an async stream to the end and decode it
    ///
    /// # Examples
    /// ```rust,no_run
    /// use vehicle_composite::services::ImageIOService;
    /// use tokio::fs::File;
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let file = File::open("background.png").await?;
    /// let image = ImageIOService::load_from_reader(file).await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// - Stream read failures
    /// - Decode failures
    pub async fn load_from_reader<R: tokio::io::AsyncRead + Unpin>(mut reader: R) -> Result<DynamicImage> {
        use tokio::io::AsyncReadExt;

        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await?;
        Self::load_from_bytes(&buffer)
    }

    /// Encode as PNG, keeping alpha
    ///
    /// # Errors
    /// Encoder failures.
    pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
        Self::encode(image, OutputFormat::Png)
    }

    /// Encode in any supported output format
    ///
    /// # Errors
    /// Encoder failures, including formats compiled out of the `image` crate.
    pub fn encode(image: &RgbaImage, format: OutputFormat) -> Result<Vec<u8>> {
        let converted = OutputFormatHandler::convert_format(image.clone(), format);
        let mut buffer = Cursor::new(Vec::new());
        converted
            .write_to(&mut buffer, format.image_format())
            .map_err(|e| {
                CompositeError::processing_stage_error(
                    "image encode",
                    &e.to_string(),
                    Some(&format!("{}x{} as {}", image.width(), image.height(), format)),
                )
            })?;
        Ok(buffer.into_inner())
    }

    /// Save an image, choosing the format from the extension
    ///
    /// Parent directories are created as needed.
    ///
    /// # Errors
    /// - Unsupported extension
    /// - Directory creation or write failures
    pub fn save_image<P: AsRef<Path>>(image: &RgbaImage, path: P) -> Result<()> {
        let path_ref = path.as_ref();
        let format = OutputFormat::from_path(path_ref)?;

        if let Some(parent) = path_ref.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| CompositeError::file_io_error("create output directory", parent, &e))?;
        }

        let bytes = Self::encode(image, format)?;
        std::fs::write(path_ref, bytes)
            .map_err(|e| CompositeError::file_io_error("write image", path_ref, &e))?;
        log::debug!("Saved {} ({})", path_ref.display(), format);
        Ok(())
    }

    /// Check if a file path has a supported image extension
    #[must_use]
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| {
                matches!(
                    ext.to_lowercase().as_str(),
                    "jpg" | "jpeg" | "png" | "webp" | "tiff" | "tif"
                )
            })
    }
}

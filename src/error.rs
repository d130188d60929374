//! Error types for compositing operations

use thiserror::Error;

/// Result type alias for compositing operations
pub type Result<T> = std::result::Result<T, CompositeError>;

/// Error kinds surfaced by every compositing stage
#[derive(Error, Debug)]
pub enum CompositeError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image encoding or buffer errors raised by the image crate
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Malformed or undecodable input image bytes
    #[error("Input decode error: {0}")]
    InputDecode(String),

    /// No contour could be extracted from the cutout
    ///
    /// Recovered inside the silhouette analyzer; it only escapes through
    /// `SilhouetteAnalyzer::try_analyze`.
    #[error("No silhouette found in cutout")]
    NoSilhouetteFound,

    /// Background removal or plate detection failure
    #[error("Model inference error: {0}")]
    ModelInference(String),

    /// Subject placement does not fit the background
    #[error("Placement out of range: {0}")]
    PlacementOutOfRange(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Any other stage failure
    #[error("Processing error: {0}")]
    Processing(String),
}

impl CompositeError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new input decode error
    pub fn input_decode<S: Into<String>>(msg: S) -> Self {
        Self::InputDecode(msg.into())
    }

    /// Create a new model inference error
    pub fn model_inference<S: Into<String>>(msg: S) -> Self {
        Self::ModelInference(msg.into())
    }

    /// Create a new placement error
    pub fn placement<S: Into<String>>(msg: S) -> Self {
        Self::PlacementOutOfRange(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create processing error with stage context
    pub fn processing_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {})", info),
            None => String::new(),
        };

        Self::Processing(format!(
            "Processing failed at stage '{}'{}: {}",
            stage, input_context, details
        ))
    }

    /// Whether the error is fatal to a composite
    ///
    /// Only `NoSilhouetteFound` has a local recovery path.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::NoSilhouetteFound)
    }
}

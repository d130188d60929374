//! Result types for compositing operations

use crate::error::Result;
use crate::placement::PlacementPlan;
use crate::plates::PlateRegion;
use crate::services::ImageIOService;
use crate::silhouette::{Orientation, OrientationEstimate};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Detailed timing breakdown for one request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Remover creation (first request on a handle only)
    pub remover_load_ms: u64,

    /// Input decoding
    pub image_decode_ms: u64,

    /// Plate detection and blur
    pub plate_redaction_ms: u64,

    /// Background removal
    pub background_removal_ms: u64,

    /// Letterboxing and silhouette analysis
    pub analysis_ms: u64,

    /// Subject resize plus shadow and reflection rendering
    pub layer_synthesis_ms: u64,

    /// Layer stacking and colour enhancement
    pub compositing_ms: u64,

    /// Final encoding (if saving)
    pub image_encode_ms: Option<u64>,

    /// Total end-to-end processing time
    pub total_ms: u64,
}

impl ProcessingTimings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of all measured phases
    #[must_use]
    pub fn measured_ms(&self) -> u64 {
        self.remover_load_ms
            + self.image_decode_ms
            + self.plate_redaction_ms
            + self.background_removal_ms
            + self.analysis_ms
            + self.layer_synthesis_ms
            + self.compositing_ms
            + self.image_encode_ms.unwrap_or(0)
    }

    /// Time not attributed to any phase
    #[must_use]
    pub fn other_overhead_ms(&self) -> u64 {
        self.total_ms.saturating_sub(self.measured_ms())
    }

    /// Fold the compositing-stage timings of `other` into `self`
    pub fn absorb_composite(&mut self, other: &Self) {
        self.analysis_ms += other.analysis_ms;
        self.layer_synthesis_ms += other.layer_synthesis_ms;
        self.compositing_ms += other.compositing_ms;
    }
}

/// Output of [`crate::CompositionPipeline::compose`]
#[derive(Debug, Clone)]
pub struct CompositeResult {
    /// Final composite at the background's dimensions
    pub image: RgbaImage,

    /// Cutout as it was analysed (letterboxed when centering is enabled)
    pub cutout: RgbaImage,

    pub estimate: OrientationEstimate,

    pub plan: PlacementPlan,

    pub timings: ProcessingTimings,
}

impl CompositeResult {
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Save the composite as PNG
    ///
    /// # Errors
    /// Encoding or write failures.
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.to_png_bytes()?;
        let path_ref = path.as_ref();
        std::fs::write(path_ref, bytes)
            .map_err(|e| crate::error::CompositeError::file_io_error("write composite", path_ref, &e))
    }

    /// Encode the composite as PNG
    ///
    /// # Errors
    /// Encoder failures.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        ImageIOService::encode_png(&self.image)
    }

    #[must_use]
    pub fn report(&self) -> CompositeReport {
        CompositeReport {
            angle: self.estimate.angle,
            orientation: self.estimate.orientation,
            aspect_ratio: self.estimate.aspect_ratio,
            width: self.image.width(),
            height: self.image.height(),
            plan: Some(self.plan),
            plates_blurred: 0,
            remover: None,
            timings: self.timings.clone(),
        }
    }
}

/// Output of a full request: redaction, removal and optional composite
#[derive(Debug, Clone)]
pub struct ProcessingOutput {
    /// Plate-redacted subject on transparency
    pub cutout: RgbaImage,

    /// Plate regions that were blurred
    pub plates: Vec<PlateRegion>,

    /// Present when a background was supplied
    pub composite: Option<CompositeResult>,

    /// Name of the remover that produced the cutout
    pub remover: String,

    pub timings: ProcessingTimings,
}

impl ProcessingOutput {
    /// Summary suitable for JSON output
    #[must_use]
    pub fn report(&self) -> CompositeReport {
        let mut report = match &self.composite {
            Some(composite) => composite.report(),
            None => CompositeReport {
                angle: 0.0,
                orientation: Orientation::Front,
                aspect_ratio: 1.0,
                width: self.cutout.width(),
                height: self.cutout.height(),
                plan: None,
                plates_blurred: 0,
                remover: None,
                timings: ProcessingTimings::default(),
            },
        };
        report.plates_blurred = self.plates.len();
        report.remover = Some(self.remover.clone());
        report.timings = self.timings.clone();
        report
    }
}

/// Serializable summary of a composite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeReport {
    #[serde(rename = "car_angle")]
    pub angle: f32,

    #[serde(rename = "car_orientation")]
    pub orientation: Orientation,

    pub aspect_ratio: f32,

    pub width: u32,

    pub height: u32,

    /// Absent when no background was supplied
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub plan: Option<PlacementPlan>,

    pub plates_blurred: usize,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub remover: Option<String>,

    pub timings: ProcessingTimings,
}

impl CompositeReport {
    /// Pretty JSON rendering
    ///
    /// # Errors
    /// Serialization failures (not expected for this type).
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            crate::error::CompositeError::processing(format!("Failed to serialize report: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timings_overhead() {
        let timings = ProcessingTimings {
            image_decode_ms: 5,
            background_removal_ms: 20,
            compositing_ms: 10,
            image_encode_ms: Some(5),
            total_ms: 50,
            ..ProcessingTimings::default()
        };
        assert_eq!(timings.measured_ms(), 40);
        assert_eq!(timings.other_overhead_ms(), 10);

        let short = ProcessingTimings {
            image_decode_ms: 100,
            total_ms: 50,
            ..ProcessingTimings::default()
        };
        assert_eq!(short.other_overhead_ms(), 0);
    }

    #[test]
    fn test_report_uses_service_field_names() {
        let output = ProcessingOutput {
            cutout: RgbaImage::new(4, 3),
            plates: vec![PlateRegion::new(0, 0, 1, 1)],
            composite: None,
            remover: "alpha".to_string(),
            timings: ProcessingTimings::default(),
        };
        let report = output.report();
        assert_eq!(report.plates_blurred, 1);
        assert_eq!((report.width, report.height), (4, 3));

        let json = report.to_json().unwrap();
        assert!(json.contains("\"car_angle\""));
        assert!(json.contains("\"car_orientation\": \"front\""));
        assert!(!json.contains("\"plan\""));

        let parsed: CompositeReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }
}

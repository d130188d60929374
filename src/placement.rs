//! Subject scale and position on the background

use crate::config::VerticalBias;
use crate::error::{CompositeError, Result};
use crate::offset_table::ReflectionOffsetTable;
use crate::silhouette::OrientationEstimate;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where and how large the subject lands, and where its reflection starts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacementPlan {
    pub scale: f32,
    pub target_width: u32,
    pub target_height: u32,
    pub paste_x: i64,
    pub paste_y: i64,
    /// Top row of the reflection band, clamped to the background height
    pub reflection_y: i64,
    /// Offset looked up from the angle table
    pub reflection_offset: i64,
}

/// Computes a [`PlacementPlan`] from sizes, pose and the offset table
#[derive(Debug, Clone)]
pub struct PlacementPlanner {
    pub target_height_ratio: f32,
    pub vertical_bias: VerticalBias,
    pub vertical_bias_ratio: f32,
    pub offset_table: ReflectionOffsetTable,
}

impl PlacementPlanner {
    #[must_use]
    pub fn new(
        target_height_ratio: f32,
        vertical_bias: VerticalBias,
        vertical_bias_ratio: f32,
        offset_table: ReflectionOffsetTable,
    ) -> Self {
        Self {
            target_height_ratio,
            vertical_bias,
            vertical_bias_ratio,
            offset_table,
        }
    }

    /// Plan the placement of a `subject_size` image on a `background_size` canvas
    ///
    /// Pure function of its inputs.
    ///
    /// # Errors
    /// - `PlacementOutOfRange` when the subject is empty, the scaled subject
    ///   is larger than the background, or a paste coordinate is negative
    pub fn plan(
        &self,
        subject_size: (u32, u32),
        background_size: (u32, u32),
        estimate: &OrientationEstimate,
    ) -> Result<PlacementPlan> {
        let (subject_w, subject_h) = subject_size;
        let (bg_w, bg_h) = background_size;

        if subject_w == 0 || subject_h == 0 {
            return Err(CompositeError::placement(format!(
                "subject has empty dimensions {}x{}",
                subject_w, subject_h
            )));
        }

        let target_height = floor_fraction(self.target_height_ratio, bg_h) as u32;
        if target_height == 0 {
            return Err(CompositeError::placement(format!(
                "target height rounds to zero for background height {}",
                bg_h
            )));
        }
        let scale = target_height as f32 / subject_h as f32;
        let scaled_width = u64::from(subject_w) * u64::from(target_height) / u64::from(subject_h);

        if scaled_width > u64::from(bg_w) || target_height > bg_h {
            return Err(CompositeError::placement(format!(
                "scaled subject {}x{} exceeds background {}x{}",
                scaled_width, target_height, bg_w, bg_h
            )));
        }
        let target_width = scaled_width as u32;

        let bias = self.vertical_bias.sign() * floor_fraction(self.vertical_bias_ratio, bg_h);
        let paste_x = (i64::from(bg_w) - i64::from(target_width)) / 2;
        let paste_y = (i64::from(bg_h) - i64::from(target_height)) / 2 + bias;

        if paste_x < 0 || paste_y < 0 {
            return Err(CompositeError::placement(format!(
                "paste position ({}, {}) falls outside the background",
                paste_x, paste_y
            )));
        }

        let reflection_offset = self.offset_table.offset_for(estimate.angle);
        let reflection_y =
            (paste_y + i64::from(target_height) - reflection_offset).clamp(0, i64::from(bg_h));

        let plan = PlacementPlan {
            scale,
            target_width,
            target_height,
            paste_x,
            paste_y,
            reflection_y,
            reflection_offset,
        };
        debug!(
            target_width,
            target_height,
            paste_x,
            paste_y,
            reflection_y,
            reflection_offset,
            table = %self.offset_table.name,
            "📐 Placement planned"
        );
        Ok(plan)
    }
}

/// `floor(ratio * value)` for decimal ratios stored as `f32`
///
/// Ratios such as 0.95 are stored slightly below their decimal value, so the
/// product is nudged by a small tolerance before flooring.
fn floor_fraction(ratio: f32, value: u32) -> i64 {
    const TOLERANCE: f64 = 1e-4;
    let product = f64::from(ratio) * f64::from(value);
    if !product.is_finite() || product <= 0.0 {
        return 0;
    }
    (product + TOLERANCE).floor() as i64
}

impl Default for PlacementPlanner {
    fn default() -> Self {
        Self::new(0.8, VerticalBias::Down, 0.02, ReflectionOffsetTable::interactive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::silhouette::Orientation;

    fn estimate(angle: f32) -> OrientationEstimate {
        OrientationEstimate {
            angle,
            orientation: Orientation::Front,
            aspect_ratio: 1.0,
        }
    }

    #[test]
    fn test_reference_scenario() {
        let planner = PlacementPlanner::default();
        let plan = planner.plan((400, 300), (800, 600), &estimate(0.0)).unwrap();

        assert_eq!(plan.target_width, 640);
        assert_eq!(plan.target_height, 480);
        assert_eq!(plan.paste_x, 80);
        // (600 - 480) / 2 + floor(600 * 0.02)
        assert_eq!(plan.paste_y, 72);
        assert!((plan.scale - 1.6).abs() < 1e-6);
        assert_eq!(plan.reflection_offset, 390);
        assert_eq!(plan.reflection_y, 72 + 480 - 390);
    }

    #[test]
    fn test_bias_directions() {
        let mut planner = PlacementPlanner::default();
        planner.vertical_bias = VerticalBias::Up;
        let up = planner.plan((400, 300), (800, 600), &estimate(0.0)).unwrap();
        assert_eq!(up.paste_y, 48);

        planner.vertical_bias = VerticalBias::None;
        let centered = planner.plan((400, 300), (800, 600), &estimate(0.0)).unwrap();
        assert_eq!(centered.paste_y, 60);
    }

    #[test]
    fn test_plan_is_deterministic() {
        let planner = PlacementPlanner::new(
            0.95,
            VerticalBias::Up,
            0.02,
            ReflectionOffsetTable::service(),
        );
        let first = planner.plan((1200, 700), (1920, 1080), &estimate(37.5)).unwrap();
        let second = planner.plan((1200, 700), (1920, 1080), &estimate(37.5)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.reflection_offset, 490);
    }

    #[test]
    fn test_reflection_y_is_clamped() {
        let planner = PlacementPlanner::default();
        let plan = planner.plan((100, 100), (100, 100), &estimate(0.0)).unwrap();
        assert_eq!(plan.reflection_y, 0);
    }

    #[test]
    fn test_oversized_subject_is_rejected() {
        let planner = PlacementPlanner::default();
        let err = planner
            .plan((4000, 100), (800, 600), &estimate(0.0))
            .unwrap_err();
        assert!(matches!(err, CompositeError::PlacementOutOfRange(_)));
    }

    #[test]
    fn test_negative_paste_is_rejected() {
        let planner = PlacementPlanner::new(
            1.0,
            VerticalBias::Up,
            0.1,
            ReflectionOffsetTable::interactive(),
        );
        let err = planner.plan((100, 100), (200, 200), &estimate(0.0)).unwrap_err();
        assert!(matches!(err, CompositeError::PlacementOutOfRange(_)));
    }

    #[test]
    fn test_floor_fraction_tolerates_f32_ratios() {
        assert_eq!(floor_fraction(0.95, 1080), 1026);
        assert_eq!(floor_fraction(0.8, 600), 480);
        assert_eq!(floor_fraction(0.02, 600), 12);
        assert_eq!(floor_fraction(0.0, 600), 0);
    }

    #[test]
    fn test_empty_subject_is_rejected() {
        let planner = PlacementPlanner::default();
        assert!(planner.plan((0, 10), (800, 600), &estimate(0.0)).is_err());
    }
}

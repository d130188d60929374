//! Angle → reflection offset lookup tables
//!
//! The vertical position of a ground reflection depends on where the
//! subject's contact point with the ground lands, which moves non-linearly
//! with the silhouette's rotation. Instead of a formula the placement uses an
//! ordered, validated table of angle bands, each mapping to the number of
//! pixels subtracted from the bottom edge of the placed subject.
//!
//! Two presets ship with the crate. They disagree with each other for most
//! angles; pick the one that matches the flow being reproduced.

use crate::error::{CompositeError, Result};
use serde::{Deserialize, Serialize};

/// Upper bound (exclusive) of the angle domain, in degrees
pub const ANGLE_DOMAIN_END: f32 = 180.0;

/// One band of the lookup table
///
/// A band covers `min <= angle < max`. A band with `min == max` is a point
/// band and covers exactly `angle == min`; it takes precedence over the band
/// that starts at the same angle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OffsetBand {
    pub min: f32,
    pub max: f32,
    /// Pixels subtracted from `paste_y + target_height`
    pub offset: i64,
}

impl OffsetBand {
    #[must_use]
    pub const fn new(min: f32, max: f32, offset: i64) -> Self {
        Self { min, max, offset }
    }

    #[must_use]
    pub const fn point(angle: f32, offset: i64) -> Self {
        Self {
            min: angle,
            max: angle,
            offset,
        }
    }

    #[must_use]
    pub fn is_point(&self) -> bool {
        (self.max - self.min).abs() < f32::EPSILON
    }

    fn contains(&self, angle: f32) -> bool {
        if self.is_point() {
            (angle - self.min).abs() < f32::EPSILON
        } else {
            angle >= self.min && angle < self.max
        }
    }
}

/// Named, swappable reflection offset policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionOffsetTable {
    pub name: String,
    pub bands: Vec<OffsetBand>,
}

impl ReflectionOffsetTable {
    /// Build a table and validate it
    ///
    /// # Errors
    /// - Empty table
    /// - Bands out of order, overlapping, or leaving gaps
    /// - Bands not covering `[0, 180)`
    pub fn new<S: Into<String>>(name: S, bands: Vec<OffsetBand>) -> Result<Self> {
        let table = Self {
            name: name.into(),
            bands,
        };
        table.validate()?;
        Ok(table)
    }

    /// Effective behaviour of the interactive flow
    ///
    /// Only two branches of that flow are reachable: `10 < angle < 70` uses
    /// 150 and every other angle (including exactly 10 and exactly 70) uses 390.
    #[must_use]
    pub fn interactive() -> Self {
        Self {
            name: "interactive".to_string(),
            bands: vec![
                OffsetBand::new(0.0, 10.0, 390),
                OffsetBand::point(10.0, 390),
                OffsetBand::new(10.0, 70.0, 150),
                OffsetBand::new(70.0, ANGLE_DOMAIN_END, 390),
            ],
        }
    }

    /// Breakpoints of the single-shot service flow
    #[must_use]
    pub fn service() -> Self {
        Self {
            name: "service".to_string(),
            bands: vec![
                OffsetBand::point(0.0, 200),
                OffsetBand::new(0.0, 5.0, 180),
                OffsetBand::new(5.0, 10.0, 390),
                OffsetBand::new(10.0, 12.0, 440),
                OffsetBand::new(12.0, 70.0, 490),
                OffsetBand::new(70.0, 80.0, 190),
                OffsetBand::new(80.0, 85.0, 370),
                OffsetBand::new(85.0, 90.0, 120),
                OffsetBand::new(90.0, 110.0, 150),
                OffsetBand::new(110.0, ANGLE_DOMAIN_END, 400),
            ],
        }
    }

    /// Check the table is ordered, disjoint and exhaustive over `[0, 180)`
    ///
    /// # Errors
    /// Returns `CompositeError::InvalidConfig` describing the first violation.
    pub fn validate(&self) -> Result<()> {
        let first = self.bands.first().ok_or_else(|| {
            CompositeError::invalid_config(format!("Offset table '{}' has no bands", self.name))
        })?;

        if first.min.abs() > f32::EPSILON {
            return Err(CompositeError::invalid_config(format!(
                "Offset table '{}' must start at 0°, starts at {}°",
                self.name, first.min
            )));
        }

        for band in &self.bands {
            if !band.min.is_finite() || !band.max.is_finite() || band.max < band.min {
                return Err(CompositeError::invalid_config(format!(
                    "Offset table '{}' has malformed band [{}, {})",
                    self.name, band.min, band.max
                )));
            }
        }

        for pair in self.bands.windows(2) {
            let [prev, next] = pair else { continue };
            if (next.min - prev.max).abs() > f32::EPSILON {
                let problem = if next.min < prev.max { "overlap" } else { "gap" };
                return Err(CompositeError::invalid_config(format!(
                    "Offset table '{}' has a {} between {}° and {}°",
                    self.name, problem, prev.max, next.min
                )));
            }
            if prev.is_point() && next.is_point() {
                return Err(CompositeError::invalid_config(format!(
                    "Offset table '{}' repeats the point band at {}°",
                    self.name, next.min
                )));
            }
        }

        let last = self.bands.last().unwrap_or(first);
        if last.is_point() || (last.max - ANGLE_DOMAIN_END).abs() > f32::EPSILON {
            return Err(CompositeError::invalid_config(format!(
                "Offset table '{}' must end at {}°, ends at {}°",
                self.name, ANGLE_DOMAIN_END, last.max
            )));
        }

        Ok(())
    }

    /// Offset for an angle in degrees
    ///
    /// Angles outside `[0, 180)` are folded into the domain first, since a
    /// rectangle rotated by 180° is the same rectangle.
    #[must_use]
    pub fn offset_for(&self, angle: f32) -> i64 {
        let folded = normalize_angle(angle);
        self.bands
            .iter()
            .find(|band| band.contains(folded))
            .or_else(|| self.bands.last())
            .map_or(0, |band| band.offset)
    }
}

impl Default for ReflectionOffsetTable {
    fn default() -> Self {
        Self::interactive()
    }
}

/// Fold an angle into `[0, 180)`; non-finite angles map to 0
#[must_use]
pub fn normalize_angle(angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }
    let folded = angle.rem_euclid(ANGLE_DOMAIN_END);
    if folded >= ANGLE_DOMAIN_END {
        0.0
    } else {
        folded
    }
}

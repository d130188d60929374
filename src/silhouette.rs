//! Pose estimation from a cutout's silhouette
//!
//! The estimate is deliberately coarse: a 2D rotation angle of the dominant
//! contour's minimum-area rectangle plus a `front`/`side` label derived from
//! the rectangle's aspect ratio. It only steers where the reflection is
//! placed, so a failed analysis degrades to a neutral estimate instead of
//! failing the composite.

use crate::alpha::alpha_mask;
use crate::enhance::luma;
use crate::error::{CompositeError, Result};
use image::{GrayImage, Luma, RgbaImage};
use imageproc::contours::{find_contours, Contour};
use imageproc::geometry::{convex_hull, min_area_rect};
use imageproc::point::Point;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Canny hysteresis thresholds
const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;

/// Rectangles more elongated than this read as a side view
pub const SIDE_ASPECT_THRESHOLD: f32 = 2.0;

/// Upper end of the rectangle rotation range `(0, 90]`
pub const RIGHT_ANGLE: f32 = 90.0;

/// Edge directions this close to a multiple of 90° count as axis-aligned
const AXIS_TOLERANCE: f32 = 1e-3;

/// Coarse viewing direction of the subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Front,
    Side,
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Front => write!(f, "front"),
            Self::Side => write!(f, "side"),
        }
    }
}

/// Angle and orientation of a silhouette
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientationEstimate {
    /// Rotation of the fitted rectangle in degrees, in `(0, 90]`
    ///
    /// Axis-aligned rectangles report 90. The fallback estimate is 0.
    pub angle: f32,
    pub orientation: Orientation,
    /// Long side over short side of the fitted rectangle
    pub aspect_ratio: f32,
}

impl OrientationEstimate {
    /// Neutral estimate used when no contour can be found
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            angle: 0.0,
            orientation: Orientation::Front,
            aspect_ratio: 1.0,
        }
    }

    /// Build an estimate from the direction of any rectangle edge and its side lengths
    ///
    /// The short side is clamped to one pixel so degenerate rectangles still
    /// produce a finite ratio.
    #[must_use]
    pub fn from_rectangle(edge_direction: f32, long_side: f32, short_side: f32) -> Self {
        let aspect_ratio = long_side / short_side.max(1.0);
        Self {
            angle: rectangle_angle(edge_direction),
            orientation: classify(aspect_ratio),
            aspect_ratio,
        }
    }
}

impl Default for OrientationEstimate {
    fn default() -> Self {
        Self::fallback()
    }
}

/// Rotation of a rectangle with an edge pointing along `edge_direction`
///
/// Folds the direction (degrees, image coordinates with y pointing down) into
/// `(0, 90]`. Both edges of a rectangle give the same value, and an
/// axis-aligned rectangle gives 90, matching the rotated-rectangle
/// convention the offset tables are keyed on.
#[must_use]
pub fn rectangle_angle(edge_direction: f32) -> f32 {
    if !edge_direction.is_finite() {
        return RIGHT_ANGLE;
    }
    let folded = edge_direction.rem_euclid(RIGHT_ANGLE);
    if folded < AXIS_TOLERANCE || RIGHT_ANGLE - folded < AXIS_TOLERANCE {
        RIGHT_ANGLE
    } else {
        folded
    }
}

/// `Side` when strictly more elongated than [`SIDE_ASPECT_THRESHOLD`]
#[must_use]
pub fn classify(aspect_ratio: f32) -> Orientation {
    if aspect_ratio > SIDE_ASPECT_THRESHOLD {
        Orientation::Side
    } else {
        Orientation::Front
    }
}

/// Extracts the dominant contour of a cutout and fits a rotated rectangle
#[derive(Debug, Clone, Copy, Default)]
pub struct SilhouetteAnalyzer;

impl SilhouetteAnalyzer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Estimate the pose, falling back to `(0°, Front)` when nothing is found
    #[must_use]
    pub fn analyze(&self, cutout: &RgbaImage) -> OrientationEstimate {
        match self.try_analyze(cutout) {
            Ok(estimate) => estimate,
            Err(e) => {
                debug!(error = %e, "🔍 Silhouette analysis fell back to neutral estimate");
                OrientationEstimate::fallback()
            },
        }
    }

    /// Estimate the pose without recovering from a missing contour
    ///
    /// # Errors
    /// `CompositeError::NoSilhouetteFound` when edge detection yields no
    /// external contour.
    #[instrument(skip(self, cutout), fields(width = cutout.width(), height = cutout.height()))]
    pub fn try_analyze(&self, cutout: &RgbaImage) -> Result<OrientationEstimate> {
        if cutout.width() == 0 || cutout.height() == 0 {
            return Err(CompositeError::NoSilhouetteFound);
        }

        let gray = masked_grayscale(cutout);
        let edges = imageproc::edges::canny(&gray, CANNY_LOW, CANNY_HIGH);
        let contours = find_contours::<i32>(&edges);
        let dominant = largest_external_contour(&contours).ok_or(CompositeError::NoSilhouetteFound)?;

        let estimate = fit_rectangle(&dominant.points);
        debug!(
            angle = estimate.angle,
            aspect_ratio = estimate.aspect_ratio,
            orientation = %estimate.orientation,
            contour_points = dominant.points.len(),
            "🔍 Silhouette analyzed"
        );
        Ok(estimate)
    }
}

/// Luma of every visible pixel; transparent pixels become black
fn masked_grayscale(cutout: &RgbaImage) -> GrayImage {
    let mask = alpha_mask(cutout, 0);
    GrayImage::from_fn(cutout.width(), cutout.height(), |x, y| {
        if mask.get_pixel(x, y)[0] == 0 {
            Luma([0])
        } else {
            let p = cutout.get_pixel(x, y);
            Luma([luma(p[0], p[1], p[2]).round() as u8])
        }
    })
}

/// External contour with the largest enclosed area; the first one wins ties
fn largest_external_contour(contours: &[Contour<i32>]) -> Option<&Contour<i32>> {
    contours
        .iter()
        .filter(|c| c.parent.is_none() && !c.points.is_empty())
        .fold(None, |best: Option<(&Contour<i32>, f64)>, contour| {
            let area = polygon_area(&contour.points);
            match best {
                Some((_, best_area)) if best_area >= area => best,
                _ => Some((contour, area)),
            }
        })
        .map(|(contour, _)| contour)
}

/// Shoelace area of a closed polygon
fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice_area: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| i64::from(a.x) * i64::from(b.y) - i64::from(b.x) * i64::from(a.y))
        .sum();
    (twice_area as f64).abs() / 2.0
}

fn fit_rectangle(points: &[Point<i32>]) -> OrientationEstimate {
    if convex_hull(points).len() < 3 {
        return fit_bounding_box(points);
    }

    let corners = min_area_rect(points);
    let edge = |from: Point<i32>, to: Point<i32>| {
        let dx = (to.x - from.x) as f32;
        let dy = (to.y - from.y) as f32;
        (dx.hypot(dy), dy.atan2(dx).to_degrees())
    };
    let (first_len, first_angle) = edge(corners[0], corners[1]);
    let (second_len, second_angle) = edge(corners[1], corners[2]);

    if first_len >= second_len {
        OrientationEstimate::from_rectangle(first_angle, first_len, second_len)
    } else {
        OrientationEstimate::from_rectangle(second_angle, second_len, first_len)
    }
}

/// Axis-aligned fallback for collinear contours
fn fit_bounding_box(points: &[Point<i32>]) -> OrientationEstimate {
    let (min_x, max_x, min_y, max_y) = points.iter().fold(
        (i32::MAX, i32::MIN, i32::MAX, i32::MIN),
        |(min_x, max_x, min_y, max_y), p| (min_x.min(p.x), max_x.max(p.x), min_y.min(p.y), max_y.max(p.y)),
    );
    let width = (max_x - min_x) as f32;
    let height = (max_y - min_y) as f32;
    OrientationEstimate::from_rectangle(0.0, width.max(height), width.min(height))
}

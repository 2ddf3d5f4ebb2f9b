//! Per-frame detections in pixel space and their localization to camera space.

use depth_calib_core::{centroid, localize, AnchorId, CentroidError, DepthField, PointSet};
use log::debug;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Where a detection sits in the color image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelShape {
    /// Marker outline; reduced to its area centroid.
    Polygon(Vec<Point2<f32>>),
    /// Already a single pixel, e.g. a pose landmark.
    Point(Point2<f32>),
}

impl PixelShape {
    /// Integer pixel used for the depth lookup.
    pub fn pixel(&self) -> Result<Point2<i32>, CentroidError> {
        match self {
            PixelShape::Polygon(vertices) => centroid(vertices),
            PixelShape::Point(p) if !p.x.is_finite() || !p.y.is_finite() => {
                Err(CentroidError::DegenerateGeometry {
                    vertices: 1,
                    signed_area: 0.0,
                })
            }
            // Truncation toward zero, same as the polygon centroid.
            PixelShape::Point(p) => Ok(Point2::new(p.x as i32, p.y as i32)),
        }
    }
}

/// One identified object found by a [`crate::Detector`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: AnchorId,
    pub shape: PixelShape,
}

impl Detection {
    pub fn polygon(id: impl Into<AnchorId>, vertices: Vec<Point2<f32>>) -> Self {
        Self {
            id: id.into(),
            shape: PixelShape::Polygon(vertices),
        }
    }

    pub fn point(id: impl Into<AnchorId>, pixel: Point2<f32>) -> Self {
        Self {
            id: id.into(),
            shape: PixelShape::Point(pixel),
        }
    }
}

/// Turn detections into camera-space points.
///
/// Degenerate polygons are dropped for this frame. Failed depth reads keep
/// their slot as the all-zero point so callers can tell them apart from
/// missing detections.
pub fn localize_detections<D: DepthField + ?Sized>(
    detections: &[Detection],
    depth: &D,
) -> PointSet {
    let mut out = PointSet::new();
    for det in detections {
        match det.shape.pixel() {
            Ok(pixel) => out.insert(det.id.clone(), localize(depth, pixel)),
            Err(err) => debug!("dropping detection {}: {}", det.id, err),
        }
    }
    out
}

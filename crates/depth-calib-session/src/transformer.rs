use depth_calib_core::{AffineTransform, LabeledPoint3, PointSet};
use nalgebra::Point3;

/// Maps camera-space points into the target frame with a committed transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameTransformer {
    transform: AffineTransform,
}

impl FrameTransformer {
    pub fn new(transform: AffineTransform) -> Self {
        Self { transform }
    }

    #[inline]
    pub fn transform(&self) -> &AffineTransform {
        &self.transform
    }

    #[inline]
    pub fn apply(&self, p: &Point3<f64>) -> Point3<f64> {
        self.transform.apply(p)
    }

    /// Transform every point, keeping ids and order.
    pub fn apply_all(&self, points: &PointSet) -> PointSet {
        points
            .iter()
            .map(|p| LabeledPoint3 {
                id: p.id.clone(),
                position: self.apply(&p.position),
            })
            .collect()
    }
}

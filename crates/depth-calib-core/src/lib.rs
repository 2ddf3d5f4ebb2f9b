//! Core geometry for mapping depth-camera detections into an external frame.
//!
//! This crate is purely geometric. It knows nothing about detectors,
//! transports or sessions; it provides:
//! - labeled point sets keyed by marker id or joint name,
//! - the area-weighted polygon centroid used to reduce marker quads to pixels,
//! - a least-squares 3D affine fit from anchor correspondences,
//! - a pinhole depth-camera model for pixel + depth -> 3D deprojection.

mod affine;
mod camera;
mod geometry;
mod logger;
mod polygon;

pub use affine::{
    solve_affine, solve_affine_pairs, AffineFit, AffineSolveError, AffineSolveParams,
    AffineTransform, MIN_CORRESPONDENCES,
};
pub use camera::{localize, DepthField, DepthImage, DepthImageError, PinholeIntrinsics};
pub use geometry::{is_zero_sentinel, AnchorId, LabeledPoint3, PointSet};
pub use polygon::{centroid, centroid_f64, signed_area, CentroidError, MIN_POLYGON_AREA};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;

//! Anchor-based calibration session.
//!
//! A [`CalibrationSession`] gathers camera-space anchors from the local
//! detector and target-space anchors from the remote peer, pairs them by
//! ascending [`AnchorId`](depth_calib_core::AnchorId) and commits a
//! least-squares affine transform. Afterwards a [`FrameTransformer`] maps
//! every detection into the target frame, and a [`ReportFilter`] decides which
//! detections are reported.

mod error;
mod params;
mod report;
mod session;
mod transformer;

pub use error::CalibrationError;
pub use params::CalibrationParams;
pub use report::{ReportFilter, ReportPolicy};
pub use session::{CalibrationSession, SessionState};
pub use transformer::FrameTransformer;

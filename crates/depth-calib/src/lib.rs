//! High-level facade crate for the `depth-calib-*` workspace.
//!
//! This crate provides:
//! - re-exports of the geometry core and the calibration session
//! - skeleton joint helpers for pose-landmark detectors
//! - the JSON wire messages and a JSON-over-TCP [`Transport`]
//! - [`FrameLoop`], which ties a camera, a detector and a transport together:
//!   it collects anchors until a camera -> target transform is committed and
//!   then reports every detection in the target frame.
//!
//! ## Quickstart
//!
//! ```no_run
//! use depth_calib::{CalibrationParams, CalibrationSession, PointSet};
//! use nalgebra::Point3;
//!
//! let mut session = CalibrationSession::new(CalibrationParams::new(1..=4u32));
//!
//! let mut local = PointSet::new();
//! local.insert(1, Point3::new(0.1, 0.0, 1.0));
//! local.insert(2, Point3::new(1.0, 0.0, 1.2));
//! local.insert(3, Point3::new(0.1, 1.0, 1.1));
//! local.insert(4, Point3::new(0.2, 0.1, 2.0));
//! session.submit_local_anchors(&local);
//! session.submit_remote_anchors(&local);
//!
//! match session.try_calibrate_default() {
//!     Ok(t) => println!("translation: {:?}", t.translation()),
//!     Err(e) => println!("not yet: {e}"),
//! }
//! ```
//!
//! ## API map
//! - `depth_calib::core`: point sets, polygon centroid, affine solver, depth camera model.
//! - `depth_calib::session`: calibration session, frame transformer, report filter.
//! - [`skeleton`]: pose joints and landmark-to-pixel helpers.
//! - [`FrameLoop`]: the per-frame driver.

pub use depth_calib_core as core;
pub use depth_calib_session as session;

pub use depth_calib_core::{
    AffineTransform, AnchorId, DepthField, DepthImage, LabeledPoint3, PinholeIntrinsics, PointSet,
};
pub use depth_calib_session::{
    CalibrationError, CalibrationParams, CalibrationSession, FrameTransformer, ReportPolicy,
    SessionState,
};

mod detection;
mod io;
mod messages;
mod pipeline;
pub mod skeleton;
mod transport;

pub use detection::{localize_detections, Detection, PixelShape};
pub use io::{ConfigError, DepthCalibConfig};
pub use messages::{
    FlatSkeleton, MarkerEntry, MarkerReport, OutputMessage, Position, RemoteMessage, SceneReport,
};
pub use pipeline::{
    Camera, Detector, Frame, FrameLoop, FrameOutcome, PipelineConfig, PipelineError, ReportConfig,
};
pub use transport::{TcpJsonTransport, Transport, TransportError, TransportParams};

/// Install a `tracing` subscriber and forward `log` records into it.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let _ = tracing_log::LogTracer::init();
    depth_calib_core::init_tracing(json);
}

//! Frame-driven calibration and reporting loop.
//!
//! Each frame is localized into camera space. Until the session commits a
//! transform, anchors feed calibration; afterwards every frame is mapped into
//! the target frame and reported to the peer.

use std::sync::atomic::{AtomicBool, Ordering};

use depth_calib_core::{is_zero_sentinel, AnchorId, DepthField, PointSet};
use nalgebra::Point3;
use depth_calib_session::{
    CalibrationError, CalibrationParams, CalibrationSession, FrameTransformer, ReportFilter,
    ReportPolicy,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::skeleton::{skeleton_present, Joint};
use crate::{
    localize_detections, Detection, FlatSkeleton, MarkerReport, OutputMessage, Position,
    SceneReport, Transport, TransportError,
};

/// One synchronized color/depth capture.
#[derive(Clone, Debug)]
pub struct Frame<I, D> {
    pub image: I,
    pub depth: D,
}

/// Source of aligned color and depth frames.
pub trait Camera {
    type Image;
    type Depth: DepthField;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Block for the next frame; `Ok(None)` when the stream has ended.
    fn next_frame(&mut self) -> Result<Option<Frame<Self::Image, Self::Depth>>, Self::Error>;
}

/// Finds identified objects in a color image.
pub trait Detector<I> {
    fn detect(&mut self, image: &I) -> Vec<Detection>;
}

impl<I, F> Detector<I> for F
where
    F: FnMut(&I) -> Vec<Detection>,
{
    fn detect(&mut self, image: &I) -> Vec<Detection> {
        self(image)
    }
}

fn default_cart_ids() -> Vec<u32> {
    vec![50]
}

fn default_refill_ids() -> Vec<u32> {
    vec![7]
}

/// What the loop sends once calibrated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportConfig {
    /// List of every non-anchor detection.
    Markers {
        #[serde(default)]
        policy: ReportPolicy,
    },
    /// Flat skeleton + cart report.
    Scene {
        #[serde(default = "default_cart_ids")]
        cart_ids: Vec<u32>,
        #[serde(default = "default_refill_ids")]
        refill_ids: Vec<u32>,
    },
    /// Five joints as flat `<Joint>_<axis>` keys, sent only while a skeleton is tracked.
    Skeleton,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig::Markers {
            policy: ReportPolicy::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub calibration: CalibrationParams,
    pub report: ReportConfig,
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("camera failed: {0}")]
    Camera(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result of one [`FrameLoop::step`].
#[derive(Clone, Debug, PartialEq)]
pub enum FrameOutcome {
    /// Calibration is still pending; the attempt on this frame failed.
    Collecting(CalibrationError),
    /// The transform was committed on this frame; its detections were reported too.
    Calibrated,
    /// A report with this many points was sent.
    Reported { points: usize },
    /// The report could not be sent; the loop keeps going.
    SendFailed,
    /// Calibrated, but this frame had nothing the report mode sends.
    NothingToReport,
    /// The camera stream ended.
    EndOfStream,
}

/// Drives camera, detector, session and transport one frame at a time.
pub struct FrameLoop<C, D, T> {
    camera: C,
    detector: D,
    transport: T,
    config: PipelineConfig,
    session: CalibrationSession,
    filter: ReportFilter,
    last_cart: Option<Position>,
    frames: u64,
}

impl<C, D, T> FrameLoop<C, D, T>
where
    C: Camera,
    D: Detector<C::Image>,
    T: Transport,
{
    pub fn new(camera: C, detector: D, transport: T, config: PipelineConfig) -> Self {
        let policy = match &config.report {
            ReportConfig::Markers { policy } => *policy,
            ReportConfig::Scene { .. } | ReportConfig::Skeleton => ReportPolicy::Always,
        };
        Self {
            camera,
            detector,
            transport,
            session: CalibrationSession::new(config.calibration.clone()),
            filter: ReportFilter::new(policy),
            config,
            last_cart: None,
            frames: 0,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn session(&self) -> &CalibrationSession {
        &self.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Frames processed so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Forget the committed transform and start collecting anchors again.
    pub fn reset_calibration(&mut self) {
        self.session.reset_calibration();
        self.filter.reset();
        self.last_cart = None;
    }

    /// Process a single frame.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self), fields(frame = self.frames))
    )]
    pub fn step(&mut self) -> Result<FrameOutcome, PipelineError> {
        let Some(frame) = self
            .camera
            .next_frame()
            .map_err(|e| PipelineError::Camera(Box::new(e)))?
        else {
            return Ok(FrameOutcome::EndOfStream);
        };
        self.frames += 1;

        let detections = self.detector.detect(&frame.image);
        let points = localize_detections(&detections, &frame.depth);
        debug!("frame {}: {} detections localized", self.frames, points.len());

        self.drain_remote()?;

        if let Some(transformer) = self.session.transformer() {
            return self.report(&points, &transformer);
        }
        let outcome = self.calibrate(&points);
        if let Some(transformer) = self.session.transformer() {
            self.report(&points, &transformer)?;
        }
        Ok(outcome)
    }

    /// Step until `stop` is set or the camera ends. Returns the number of frames processed.
    ///
    /// A calibration still being collected when the loop exits is discarded.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<u64, PipelineError> {
        let start = self.frames;
        let result = loop {
            if stop.load(Ordering::Relaxed) {
                info!("stop requested");
                break Ok(());
            }
            match self.step() {
                Ok(FrameOutcome::EndOfStream) => {
                    info!("camera stream ended");
                    break Ok(());
                }
                Ok(_) => {}
                Err(e) => break Err(e),
            }
        };
        if !self.session.is_calibrated() {
            debug!("discarding uncommitted calibration");
            self.reset_calibration();
        }
        result.map(|()| self.frames - start)
    }

    fn drain_remote(&mut self) -> Result<(), PipelineError> {
        loop {
            match self.transport.try_receive() {
                Ok(Some(msg)) => {
                    if self.session.is_calibrated() {
                        debug!("calibrated, ignoring peer message");
                        continue;
                    }
                    let params = self.session.params();
                    let anchors = msg.into_point_set().filtered(|id| params.is_anchor(id));
                    debug!("peer sent {} anchors", anchors.len());
                    self.session.submit_remote_anchors(&anchors);
                }
                Ok(None) => return Ok(()),
                Err(TransportError::Json(e)) => warn!("ignoring malformed peer message: {e}"),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn calibrate(&mut self, points: &PointSet) -> FrameOutcome {
        let params = self.session.params();
        let local = points.filtered(|id| params.is_anchor(id));
        self.session.submit_local_anchors(&local);
        match self.session.try_calibrate_default() {
            Ok(_) => FrameOutcome::Calibrated,
            Err(e) => FrameOutcome::Collecting(e),
        }
    }

    fn report(
        &mut self,
        points: &PointSet,
        transformer: &FrameTransformer,
    ) -> Result<FrameOutcome, PipelineError> {
        let (message, count) = match &self.config.report {
            ReportConfig::Markers { .. } => {
                let params = self.session.params();
                let selected = self.filter.select(points, |id| params.is_anchor(id));
                let target = transformer.apply_all(&selected);
                (OutputMessage::from(MarkerReport::from_points(&target)), target.len())
            }
            ReportConfig::Scene {
                cart_ids,
                refill_ids,
            } => {
                let report = scene_report(
                    points,
                    transformer,
                    cart_ids,
                    refill_ids,
                    &mut self.last_cart,
                );
                let count = usize::from(report.cart_position.is_some())
                    + if report.has_skeleton_data { Joint::ALL.len() } else { 0 };
                (OutputMessage::from(report), count)
            }
            ReportConfig::Skeleton => {
                let skeleton = skeleton_present(points)
                    .then(|| FlatSkeleton::from_points(&transformer.apply_all(points)))
                    .flatten();
                let Some(skeleton) = skeleton else {
                    debug!("no skeleton tracked, nothing to report");
                    return Ok(FrameOutcome::NothingToReport);
                };
                (OutputMessage::from(skeleton), Joint::ALL.len())
            }
        };

        match self.transport.send(&message) {
            Ok(()) => Ok(FrameOutcome::Reported { points: count }),
            Err(TransportError::Closed) => Err(TransportError::Closed.into()),
            Err(e) => {
                warn!("send failed: {e}");
                Ok(FrameOutcome::SendFailed)
            }
        }
    }
}

fn scene_report(
    points: &PointSet,
    transformer: &FrameTransformer,
    cart_ids: &[u32],
    refill_ids: &[u32],
    last_cart: &mut Option<Position>,
) -> SceneReport {
    let joint = |j: Joint| -> Option<Position> {
        points
            .get(&j.anchor_id())
            .map(|p| transformer.apply(p).into())
    };

    let mut report = SceneReport {
        has_skeleton_data: skeleton_present(points),
        ..Default::default()
    };
    if report.has_skeleton_data {
        report.head_position = joint(Joint::Head);
        report.left_hand_position = joint(Joint::LeftHand);
        report.right_hand_position = joint(Joint::RightHand);
        report.left_leg_position = joint(Joint::LeftLeg);
        report.right_leg_position = joint(Joint::RightLeg);
    }

    match find_marker(points, cart_ids) {
        Some(p) => *last_cart = Some(transformer.apply(p).into()),
        None if !cart_ids.is_empty() => {
            warn!("no cart marker {cart_ids:?} found, using previous position")
        }
        None => {}
    }
    report.cart_position = *last_cart;

    report.needs_refill = refill_ids
        .iter()
        .any(|&id| points.contains(&AnchorId::Marker(id)));
    report
}

/// First of `ids` localized with a valid depth read.
fn find_marker<'a>(points: &'a PointSet, ids: &[u32]) -> Option<&'a Point3<f64>> {
    ids.iter()
        .filter_map(|&id| points.get(&AnchorId::Marker(id)))
        .find(|p| !is_zero_sentinel(p))
}

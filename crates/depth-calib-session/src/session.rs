use std::collections::{BTreeMap, BTreeSet};

use depth_calib_core::{
    is_zero_sentinel, solve_affine, AffineFit, AffineTransform, AnchorId, PointSet,
};
use log::{debug, info, warn};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{CalibrationError, CalibrationParams, FrameTransformer};

/// Lifecycle of a [`CalibrationSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing submitted yet.
    Uncalibrated,
    /// Anchors are being gathered; attempts may fail and are retried.
    Collecting,
    /// A transform is committed and immutable until [`CalibrationSession::reset_calibration`].
    Calibrated,
}

/// Collects anchor correspondences from the local detector and the remote
/// peer, and commits a camera -> target affine transform once enough valid
/// anchors are available.
#[derive(Clone, Debug)]
pub struct CalibrationSession {
    params: CalibrationParams,
    state: SessionState,
    local: BTreeMap<AnchorId, Point3<f64>>,
    local_invalid: BTreeSet<AnchorId>,
    remote: BTreeMap<AnchorId, Point3<f64>>,
    committed: Option<AffineFit>,
    failed_attempts: usize,
    last_error: Option<CalibrationError>,
}

impl CalibrationSession {
    pub fn new(params: CalibrationParams) -> Self {
        Self {
            params,
            state: SessionState::Uncalibrated,
            local: BTreeMap::new(),
            local_invalid: BTreeSet::new(),
            remote: BTreeMap::new(),
            committed: None,
            failed_attempts: 0,
            last_error: None,
        }
    }

    #[inline]
    pub fn params(&self) -> &CalibrationParams {
        &self.params
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[inline]
    pub fn is_calibrated(&self) -> bool {
        self.state == SessionState::Calibrated
    }

    /// Committed transform, if any.
    pub fn transform(&self) -> Option<AffineTransform> {
        self.committed.map(|fit| fit.transform)
    }

    /// Committed fit with its residual, if any.
    pub fn fit(&self) -> Option<&AffineFit> {
        self.committed.as_ref()
    }

    pub fn transformer(&self) -> Option<FrameTransformer> {
        self.transform().map(FrameTransformer::new)
    }

    /// Number of failed calibration attempts since creation or the last reset.
    #[inline]
    pub fn failed_attempts(&self) -> usize {
        self.failed_attempts
    }

    #[inline]
    pub fn last_error(&self) -> Option<&CalibrationError> {
        self.last_error.as_ref()
    }

    /// Replace the camera-space anchors seen in the current frame.
    ///
    /// All-zero points (failed depth reads) are remembered as invalid and do
    /// not count toward sufficiency. Ignored once calibrated.
    pub fn submit_local_anchors(&mut self, anchors: &PointSet) {
        if self.is_calibrated() {
            debug!("session calibrated, ignoring {} local anchors", anchors.len());
            return;
        }
        self.local.clear();
        self.local_invalid.clear();
        for p in anchors {
            if self.params.reject_zero_sentinel && is_zero_sentinel(&p.position) {
                self.local_invalid.insert(p.id.clone());
            } else {
                self.local.insert(p.id.clone(), p.position);
            }
        }
        self.state = SessionState::Collecting;
    }

    /// Merge target-space anchors reported by the peer.
    ///
    /// Remote anchors accumulate across messages; a later value for an id
    /// replaces the earlier one. Ignored once calibrated.
    pub fn submit_remote_anchors(&mut self, anchors: &PointSet) {
        if self.is_calibrated() {
            debug!("session calibrated, ignoring {} remote anchors", anchors.len());
            return;
        }
        for p in anchors {
            self.remote.insert(p.id.clone(), p.position);
        }
        self.state = SessionState::Collecting;
    }

    /// Try to solve and commit the transform from the `required` anchors.
    ///
    /// Once calibrated this returns the committed transform without
    /// recomputing it. Failures are counted, logged and left for the caller
    /// to retry on a later frame.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, required), fields(required = required.len()))
    )]
    pub fn try_calibrate(
        &mut self,
        required: &[AnchorId],
    ) -> Result<AffineTransform, CalibrationError> {
        if let Some(fit) = &self.committed {
            return Ok(fit.transform);
        }

        match self.solve(required) {
            Ok(fit) => {
                info!(
                    "calibration committed from {} anchors (rms residual {:.4}, after {} failed attempts)",
                    required.len(),
                    fit.rms_residual,
                    self.failed_attempts
                );
                self.committed = Some(fit);
                self.state = SessionState::Calibrated;
                self.last_error = None;
                self.local.clear();
                self.local_invalid.clear();
                self.remote.clear();
                Ok(fit.transform)
            }
            Err(err) => {
                self.failed_attempts += 1;
                warn!("calibration attempt {} failed: {}", self.failed_attempts, err);
                self.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// [`Self::try_calibrate`] with the ids from [`CalibrationParams::required_ids`].
    pub fn try_calibrate_default(&mut self) -> Result<AffineTransform, CalibrationError> {
        let required = self.params.required_ids.clone();
        self.try_calibrate(&required)
    }

    /// Drop the committed transform and every stored anchor.
    pub fn reset_calibration(&mut self) {
        if self.committed.is_some() {
            info!("calibration reset");
        }
        self.state = SessionState::Uncalibrated;
        self.local.clear();
        self.local_invalid.clear();
        self.remote.clear();
        self.committed = None;
        self.failed_attempts = 0;
        self.last_error = None;
    }

    fn solve(&self, required: &[AnchorId]) -> Result<AffineFit, CalibrationError> {
        // Ascending id order pairs local and remote anchors.
        let required: BTreeSet<&AnchorId> = required.iter().collect();

        let missing_local: Vec<AnchorId> = required
            .iter()
            .filter(|id| !self.local.contains_key(**id) && !self.local_invalid.contains(**id))
            .map(|id| (*id).clone())
            .collect();
        let missing_remote: Vec<AnchorId> = required
            .iter()
            .filter(|id| !self.remote.contains_key(**id))
            .map(|id| (*id).clone())
            .collect();
        if !missing_local.is_empty() || !missing_remote.is_empty() {
            return Err(CalibrationError::MissingAnchors {
                local: missing_local,
                remote: missing_remote,
            });
        }

        let invalid: Vec<AnchorId> = required
            .iter()
            .filter(|id| self.local_invalid.contains(**id))
            .map(|id| (*id).clone())
            .collect();
        if !invalid.is_empty() {
            return Err(CalibrationError::InvalidAnchors { invalid });
        }

        let pairs: Vec<(Point3<f64>, Point3<f64>)> = required
            .iter()
            .filter_map(|id| Some((*self.local.get(*id)?, *self.remote.get(*id)?)))
            .collect();

        Ok(solve_affine(&pairs, &self.params.solver)?)
    }
}

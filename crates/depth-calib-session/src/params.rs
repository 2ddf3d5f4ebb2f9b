use depth_calib_core::{AffineSolveParams, AnchorId};
use serde::{Deserialize, Serialize};

/// Configuration for a calibration session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParams {
    /// Anchors that must be seen locally and reported by the peer before a
    /// transform is solved. Order does not matter; pairing is by ascending id.
    pub required_ids: Vec<AnchorId>,
    /// Treat all-zero local anchors as failed depth reads.
    ///
    /// Disable only when local anchors do not come from depth lookups and an
    /// anchor may legitimately sit at the camera origin.
    #[serde(default = "default_reject_zero_sentinel")]
    pub reject_zero_sentinel: bool,
    /// Solver settings.
    #[serde(default)]
    pub solver: AffineSolveParams,
}

fn default_reject_zero_sentinel() -> bool {
    true
}

impl CalibrationParams {
    pub fn new(required_ids: impl IntoIterator<Item = impl Into<AnchorId>>) -> Self {
        Self {
            required_ids: required_ids.into_iter().map(Into::into).collect(),
            reject_zero_sentinel: true,
            solver: AffineSolveParams::default(),
        }
    }

    /// True if `id` is one of the calibration anchors.
    pub fn is_anchor(&self, id: &AnchorId) -> bool {
        self.required_ids.contains(id)
    }
}

impl Default for CalibrationParams {
    /// Six floor markers, ids 1..=6.
    fn default() -> Self {
        Self::new(1..=6u32)
    }
}

use std::collections::BTreeSet;

use depth_calib_core::{is_zero_sentinel, AnchorId, PointSet};
use log::debug;
use serde::{Deserialize, Serialize};

/// How often a detected (non-anchor) marker is reported to the peer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportPolicy {
    /// Report on every frame it is visible (tracking moving objects).
    #[default]
    Always,
    /// Report the first sighting only (one-shot object discovery).
    OncePerSession,
}

/// Selects which camera-space detections go into an outgoing report.
#[derive(Clone, Debug, Default)]
pub struct ReportFilter {
    policy: ReportPolicy,
    reported: BTreeSet<AnchorId>,
}

impl ReportFilter {
    pub fn new(policy: ReportPolicy) -> Self {
        Self {
            policy,
            reported: BTreeSet::new(),
        }
    }

    #[inline]
    pub fn policy(&self) -> ReportPolicy {
        self.policy
    }

    /// Record a report of `id`; returns false if the policy suppresses it.
    pub fn admit(&mut self, id: &AnchorId) -> bool {
        match self.policy {
            ReportPolicy::Always => {
                self.reported.insert(id.clone());
                true
            }
            ReportPolicy::OncePerSession => self.reported.insert(id.clone()),
        }
    }

    /// Points to report from a camera-space detection set.
    ///
    /// Anchors and failed depth reads are skipped and never marked as reported.
    pub fn select(
        &mut self,
        camera_points: &PointSet,
        is_anchor: impl Fn(&AnchorId) -> bool,
    ) -> PointSet {
        let mut out = PointSet::new();
        for p in camera_points {
            if is_anchor(&p.id) || is_zero_sentinel(&p.position) {
                continue;
            }
            if self.admit(&p.id) {
                out.insert(p.id.clone(), p.position);
            } else {
                debug!("{} already reported, skipping", p.id);
            }
        }
        out
    }

    /// Ids reported so far.
    pub fn reported(&self) -> impl Iterator<Item = &AnchorId> {
        self.reported.iter()
    }

    pub fn reset(&mut self) {
        self.reported.clear();
    }
}

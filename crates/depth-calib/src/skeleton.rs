//! Human skeleton joints tracked from a pose-landmark model.
//!
//! Landmarks follow the MediaPipe pose topology (33 points, normalized image
//! coordinates). Only five joints are used: head, both hands and both feet.

use depth_calib_core::{AnchorId, PointSet};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::Detection;

/// A tracked skeleton joint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Joint {
    Head,
    LeftHand,
    RightHand,
    LeftLeg,
    RightLeg,
}

impl Joint {
    pub const ALL: [Joint; 5] = [
        Joint::Head,
        Joint::LeftHand,
        Joint::RightHand,
        Joint::LeftLeg,
        Joint::RightLeg,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Joint::Head => "Head",
            Joint::LeftHand => "LeftHand",
            Joint::RightHand => "RightHand",
            Joint::LeftLeg => "LeftLeg",
            Joint::RightLeg => "RightLeg",
        }
    }

    /// Id under which the joint appears in point sets and peer messages.
    pub fn anchor_id(self) -> AnchorId {
        AnchorId::named(self.name())
    }

    /// Index into a MediaPipe pose landmark list.
    pub fn pose_landmark_index(self) -> usize {
        match self {
            Joint::Head => 0,
            Joint::LeftHand => 15,
            Joint::RightHand => 16,
            Joint::LeftLeg => 27,
            Joint::RightLeg => 28,
        }
    }
}

/// Scale a normalized landmark to an image pixel, truncated and clamped into the image.
pub fn landmark_to_pixel(normalized: Point2<f32>, width: u32, height: u32) -> Point2<f32> {
    let max_x = width.saturating_sub(1) as f32;
    let max_y = height.saturating_sub(1) as f32;
    let x = (normalized.x * width as f32).trunc().clamp(0.0, max_x);
    let y = (normalized.y * height as f32).trunc().clamp(0.0, max_y);
    Point2::new(x, y)
}

/// Joint detections from a pose landmark list.
///
/// Returns nothing when the list is shorter than the pose topology needs.
pub fn skeleton_detections(landmarks: &[Point2<f32>], width: u32, height: u32) -> Vec<Detection> {
    let needed = Joint::ALL
        .iter()
        .map(|j| j.pose_landmark_index())
        .max()
        .unwrap_or(0);
    if landmarks.len() <= needed {
        return Vec::new();
    }
    Joint::ALL
        .iter()
        .map(|j| {
            Detection::point(
                j.anchor_id(),
                landmark_to_pixel(landmarks[j.pose_landmark_index()], width, height),
            )
        })
        .collect()
}

/// A skeleton counts only if every joint was localized with positive depth.
pub fn skeleton_present(points: &PointSet) -> bool {
    Joint::ALL
        .iter()
        .all(|j| points.get(&j.anchor_id()).is_some_and(|p| p.z > 0.0))
}

//! JSON records exchanged with the peer that owns the target frame.

use std::collections::BTreeMap;

use depth_calib_core::{AnchorId, PointSet};
use nalgebra::Point3;
use serde::{Deserialize, Deserializer, Serialize};

use crate::skeleton::Joint;

/// A 3D position as a `{"x", "y", "z"}` object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<Point3<f64>> for Position {
    fn from(p: Point3<f64>) -> Self {
        Self {
            x: p.x,
            y: p.y,
            z: p.z,
        }
    }
}

impl From<Position> for Point3<f64> {
    fn from(p: Position) -> Self {
        Point3::new(p.x, p.y, p.z)
    }
}

/// One identified point in list-form messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerEntry {
    pub id: AnchorId,
    pub position: Position,
}

/// List-form report: `{"messages": [{"id", "position"}, ...]}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkerReport {
    pub messages: Vec<MarkerEntry>,
}

impl MarkerReport {
    pub fn from_points(points: &PointSet) -> Self {
        Self {
            messages: points
                .iter()
                .map(|p| MarkerEntry {
                    id: p.id.clone(),
                    position: p.position.into(),
                })
                .collect(),
        }
    }
}

/// Flat scene report: tracked person joints, cart position and refill flag.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneReport {
    pub has_skeleton_data: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_hand_position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_hand_position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_leg_position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_leg_position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cart_position: Option<Position>,
    pub needs_refill: bool,
}

/// Five-joint skeleton on the wire as flat keys: `RHand_x`, `LLeg_z`, `Head_y`, ...
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "FlatSkeletonKeys", into = "FlatSkeletonKeys")]
pub struct FlatSkeleton {
    pub head: Position,
    pub left_hand: Position,
    pub right_hand: Position,
    pub left_leg: Position,
    pub right_leg: Position,
}

impl FlatSkeleton {
    pub fn joint(&self, joint: Joint) -> Position {
        match joint {
            Joint::Head => self.head,
            Joint::LeftHand => self.left_hand,
            Joint::RightHand => self.right_hand,
            Joint::LeftLeg => self.left_leg,
            Joint::RightLeg => self.right_leg,
        }
    }

    /// Skeleton from a point set keyed by joint ids; `None` unless every joint is present.
    pub fn from_points(points: &PointSet) -> Option<Self> {
        let at = |j: Joint| points.get(&j.anchor_id()).map(|p| Position::from(*p));
        Some(Self {
            head: at(Joint::Head)?,
            left_hand: at(Joint::LeftHand)?,
            right_hand: at(Joint::RightHand)?,
            left_leg: at(Joint::LeftLeg)?,
            right_leg: at(Joint::RightLeg)?,
        })
    }

    pub fn to_points(&self) -> PointSet {
        let mut points = PointSet::new();
        for j in Joint::ALL {
            points.insert(j.anchor_id(), self.joint(j).into());
        }
        points
    }
}

#[derive(Serialize, Deserialize)]
struct FlatSkeletonKeys {
    #[serde(rename = "RHand_x")]
    rhand_x: f64,
    #[serde(rename = "RHand_y")]
    rhand_y: f64,
    #[serde(rename = "RHand_z")]
    rhand_z: f64,
    #[serde(rename = "LHand_x")]
    lhand_x: f64,
    #[serde(rename = "LHand_y")]
    lhand_y: f64,
    #[serde(rename = "LHand_z")]
    lhand_z: f64,
    #[serde(rename = "RLeg_x")]
    rleg_x: f64,
    #[serde(rename = "RLeg_y")]
    rleg_y: f64,
    #[serde(rename = "RLeg_z")]
    rleg_z: f64,
    #[serde(rename = "LLeg_x")]
    lleg_x: f64,
    #[serde(rename = "LLeg_y")]
    lleg_y: f64,
    #[serde(rename = "LLeg_z")]
    lleg_z: f64,
    #[serde(rename = "Head_x")]
    head_x: f64,
    #[serde(rename = "Head_y")]
    head_y: f64,
    #[serde(rename = "Head_z")]
    head_z: f64,
}

impl From<FlatSkeletonKeys> for FlatSkeleton {
    fn from(k: FlatSkeletonKeys) -> Self {
        let pos = |x, y, z| Position { x, y, z };
        Self {
            head: pos(k.head_x, k.head_y, k.head_z),
            left_hand: pos(k.lhand_x, k.lhand_y, k.lhand_z),
            right_hand: pos(k.rhand_x, k.rhand_y, k.rhand_z),
            left_leg: pos(k.lleg_x, k.lleg_y, k.lleg_z),
            right_leg: pos(k.rleg_x, k.rleg_y, k.rleg_z),
        }
    }
}

impl From<FlatSkeleton> for FlatSkeletonKeys {
    fn from(s: FlatSkeleton) -> Self {
        Self {
            rhand_x: s.right_hand.x,
            rhand_y: s.right_hand.y,
            rhand_z: s.right_hand.z,
            lhand_x: s.left_hand.x,
            lhand_y: s.left_hand.y,
            lhand_z: s.left_hand.z,
            rleg_x: s.right_leg.x,
            rleg_y: s.right_leg.y,
            rleg_z: s.right_leg.z,
            lleg_x: s.left_leg.x,
            lleg_y: s.left_leg.y,
            lleg_z: s.left_leg.z,
            head_x: s.head.x,
            head_y: s.head.y,
            head_z: s.head.z,
        }
    }
}

/// Anything sent to the peer. Serializes without a wrapper tag.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutputMessage {
    Markers(MarkerReport),
    Scene(SceneReport),
    Skeleton(FlatSkeleton),
}

impl From<MarkerReport> for OutputMessage {
    fn from(r: MarkerReport) -> Self {
        OutputMessage::Markers(r)
    }
}

impl From<SceneReport> for OutputMessage {
    fn from(r: SceneReport) -> Self {
        OutputMessage::Scene(r)
    }
}

impl From<FlatSkeleton> for OutputMessage {
    fn from(s: FlatSkeleton) -> Self {
        OutputMessage::Skeleton(s)
    }
}

/// Target-frame points reported by the peer.
///
/// Accepted shapes:
/// - `{"messages": [{"id": 1, "position": {...}}, ...]}`
/// - a bare `[{"id": 1, "position": {...}}, ...]`
/// - a [`FlatSkeleton`] with all fifteen `<Joint>_<axis>` keys
/// - a named map `{"Head": {...}, "3": {...}}`; integer keys are marker ids.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RemoteMessage {
    points: PointSet,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRemote {
    List { messages: Vec<MarkerEntry> },
    Bare(Vec<MarkerEntry>),
    Skeleton(FlatSkeleton),
    Named(BTreeMap<String, Position>),
}

impl<'de> Deserialize<'de> for RemoteMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut points = PointSet::new();
        match RawRemote::deserialize(deserializer)? {
            RawRemote::List { messages } | RawRemote::Bare(messages) => {
                for entry in messages {
                    points.insert(entry.id, entry.position.into());
                }
            }
            RawRemote::Skeleton(skeleton) => points = skeleton.to_points(),
            RawRemote::Named(map) => {
                for (key, position) in map {
                    points.insert(AnchorId::from_key(&key), position.into());
                }
            }
        }
        Ok(Self { points })
    }
}

impl RemoteMessage {
    pub fn points(&self) -> &PointSet {
        &self.points
    }

    pub fn into_point_set(self) -> PointSet {
        self.points
    }
}

impl From<PointSet> for RemoteMessage {
    fn from(points: PointSet) -> Self {
        Self { points }
    }
}

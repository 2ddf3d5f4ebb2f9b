use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Identifier of a labeled point: a fiducial-marker id or a named joint.
///
/// Ordering puts every marker id (numeric ascending) before every name
/// (lexicographic ascending). Anchor pairing relies on this order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnchorId {
    Marker(u32),
    Named(String),
}

impl AnchorId {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Parse a JSON object key: unsigned integers become marker ids.
    pub fn from_key(key: &str) -> Self {
        key.parse::<u32>()
            .map(Self::Marker)
            .unwrap_or_else(|_| Self::Named(key.to_owned()))
    }

    #[inline]
    pub fn marker(&self) -> Option<u32> {
        match self {
            Self::Marker(id) => Some(*id),
            Self::Named(_) => None,
        }
    }
}

impl Ord for AnchorId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Marker(a), Self::Marker(b)) => a.cmp(b),
            (Self::Marker(_), Self::Named(_)) => Ordering::Less,
            (Self::Named(_), Self::Marker(_)) => Ordering::Greater,
            (Self::Named(a), Self::Named(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for AnchorId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<u32> for AnchorId {
    fn from(id: u32) -> Self {
        Self::Marker(id)
    }
}

impl From<&str> for AnchorId {
    fn from(name: &str) -> Self {
        Self::Named(name.to_owned())
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Marker(id) => write!(f, "#{id}"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// True for the all-zero point a depth camera yields when the depth read failed.
#[inline]
pub fn is_zero_sentinel(p: &Point3<f64>) -> bool {
    p.x == 0.0 && p.y == 0.0 && p.z == 0.0
}

/// A 3D point (meters) with its identifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabeledPoint3 {
    pub id: AnchorId,
    pub position: Point3<f64>,
}

impl LabeledPoint3 {
    pub fn new(id: impl Into<AnchorId>, position: Point3<f64>) -> Self {
        Self {
            id: id.into(),
            position,
        }
    }
}

/// Ordered set of labeled points with unique ids.
///
/// Insertion order is kept; inserting an id that is already present replaces
/// its position in place. The frame (camera or target) is implied by context.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointSet {
    points: Vec<LabeledPoint3>,
}

impl PointSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<AnchorId>, position: Point3<f64>) {
        let id = id.into();
        match self.points.iter_mut().find(|p| p.id == id) {
            Some(existing) => existing.position = position,
            None => self.points.push(LabeledPoint3 { id, position }),
        }
    }

    pub fn get(&self, id: &AnchorId) -> Option<&Point3<f64>> {
        self.points.iter().find(|p| &p.id == id).map(|p| &p.position)
    }

    #[inline]
    pub fn contains(&self, id: &AnchorId) -> bool {
        self.get(id).is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabeledPoint3> {
        self.points.iter()
    }

    /// Keep only the points whose id satisfies `keep`.
    pub fn filtered(&self, mut keep: impl FnMut(&AnchorId) -> bool) -> PointSet {
        self.points.iter().filter(|p| keep(&p.id)).cloned().collect()
    }

    /// Copy of the set ordered by ascending id.
    pub fn sorted_by_id(&self) -> PointSet {
        let mut points = self.points.clone();
        points.sort_by(|a, b| a.id.cmp(&b.id));
        PointSet { points }
    }
}

impl FromIterator<LabeledPoint3> for PointSet {
    fn from_iter<I: IntoIterator<Item = LabeledPoint3>>(iter: I) -> Self {
        let mut set = PointSet::new();
        for p in iter {
            set.insert(p.id, p.position);
        }
        set
    }
}

impl IntoIterator for PointSet {
    type Item = LabeledPoint3;
    type IntoIter = std::vec::IntoIter<LabeledPoint3>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.into_iter()
    }
}

impl<'a> IntoIterator for &'a PointSet {
    type Item = &'a LabeledPoint3;
    type IntoIter = std::slice::Iter<'a, LabeledPoint3>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

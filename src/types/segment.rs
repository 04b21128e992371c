//! Segment types.
//!
//! Segments are identified by the coordinates of their endpoints, never by
//! node ids: two node versions fetched from different snapshots describe the
//! same physical point whenever their positions are equal.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::element::{Node, VersionStamp};

/// OSM stores positions with 7 decimal places.
const COORD_SCALE: f64 = 10_000_000.0;

/// Mean earth radius in meters (haversine).
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Position in OSM's fixed 1e-7 degree precision.
///
/// Implements `Eq`, `Hash` and `Ord` so it can key maps exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coord {
    /// Latitude × 1e7.
    pub lat_e7: i64,
    /// Longitude × 1e7.
    pub lon_e7: i64,
}

impl Coord {
    /// Quantize a position given in degrees.
    pub fn from_degrees(lat: f64, lon: f64) -> Self {
        Self {
            lat_e7: (lat * COORD_SCALE).round() as i64,
            lon_e7: (lon * COORD_SCALE).round() as i64,
        }
    }

    /// Latitude in degrees.
    pub fn lat(&self) -> f64 {
        self.lat_e7 as f64 / COORD_SCALE
    }

    /// Longitude in degrees.
    pub fn lon(&self) -> f64 {
        self.lon_e7 as f64 / COORD_SCALE
    }

    /// Great-circle distance to another position, in meters.
    pub fn distance_m(&self, other: &Coord) -> f64 {
        let dlat = (other.lat() - self.lat()).to_radians();
        let dlon = (other.lon() - self.lon()).to_radians();
        let a = (dlat / 2.0).sin().powi(2)
            + self.lat().to_radians().cos() * other.lat().to_radians().cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.7},{:.7}", self.lat(), self.lon())
    }
}

/// Undirected identity of a physical edge.
///
/// The endpoints are stored in ascending order, so a segment and its
/// reverse share one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentKey(Coord, Coord);

impl SegmentKey {
    /// Key for the edge between two positions.
    pub fn new(a: Coord, b: Coord) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    /// Both endpoints, in canonical order.
    pub fn endpoints(&self) -> (Coord, Coord) {
        (self.0, self.1)
    }

    /// Whether this key denotes a single point rather than an edge.
    pub fn is_point(&self) -> bool {
        self.0 == self.1
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.0, self.1)
    }
}

/// One directed edge between two consecutive nodes.
///
/// A "point segment" has the same node at both ends and stands for a node
/// member of a relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start node.
    pub from: Node,
    /// End node.
    pub to: Node,
}

impl Segment {
    /// Create a directed segment.
    pub fn new(from: Node, to: Node) -> Self {
        Self { from, to }
    }

    /// Degenerate segment for a single node.
    pub fn point(node: Node) -> Self {
        Self { from: node.clone(), to: node }
    }

    /// Undirected identity.
    pub fn key(&self) -> SegmentKey {
        SegmentKey::new(self.from.coord(), self.to.coord())
    }

    /// Whether both endpoints coincide.
    pub fn is_point(&self) -> bool {
        self.from.coord() == self.to.coord()
    }

    /// Position of the start node.
    pub fn start(&self) -> Coord {
        self.from.coord()
    }

    /// Position of the end node.
    pub fn end(&self) -> Coord {
        self.to.coord()
    }

    /// The same edge traversed the other way.
    pub fn reversed(&self) -> Self {
        Self { from: self.to.clone(), to: self.from.clone() }
    }

    /// Length in meters.
    pub fn length_m(&self) -> f64 {
        self.start().distance_m(&self.end())
    }
}

/// One container on the way from the root feature down to a segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainLink {
    /// The container version.
    pub feature: VersionStamp,
    /// Role under which the container is a member of its parent (empty for the root).
    pub role: String,
}

impl ChainLink {
    /// Create a link.
    pub fn new(feature: VersionStamp, role: impl Into<String>) -> Self {
        Self { feature, role: role.into() }
    }
}

/// Ancestry of containers, root first.
pub type MembershipChain = Vec<ChainLink>;

/// A segment together with the membership chain it was reached through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainedSegment {
    /// The segment, with node versions of its snapshot.
    pub segment: Segment,
    /// Containers from the root feature down to the way holding the segment.
    pub chain: MembershipChain,
}

impl ChainedSegment {
    /// Create a chained segment.
    pub fn new(segment: Segment, chain: MembershipChain) -> Self {
        Self { segment, chain }
    }

    /// Undirected identity of the segment.
    pub fn key(&self) -> SegmentKey {
        self.segment.key()
    }
}

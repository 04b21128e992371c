//! Versioned OpenStreetMap elements and resolved features.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::segment::Coord;

/// Kind of OSM element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    /// A single point.
    Node,
    /// An ordered list of nodes.
    Way,
    /// An ordered list of typed, roled members.
    Relation,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node => write!(f, "node"),
            Self::Way => write!(f, "way"),
            Self::Relation => write!(f, "relation"),
        }
    }
}

/// Metadata shared by every element version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementInfo {
    /// Element id (unique per element type).
    pub id: i64,
    /// Version number, starting at 1.
    pub version: u32,
    /// When this version was uploaded.
    pub timestamp: DateTime<Utc>,
    /// Changeset that produced this version.
    pub changeset: u64,
    /// Display name of the uploading user.
    pub user: String,
    /// `false` if this version deletes the element.
    pub visible: bool,
    /// Tags of this version.
    pub tags: BTreeMap<String, String>,
}

impl ElementInfo {
    /// Create metadata for a visible, untagged version.
    pub fn new(id: i64, version: u32, timestamp: DateTime<Utc>, changeset: u64, user: impl Into<String>) -> Self {
        Self {
            id,
            version,
            timestamp,
            changeset,
            user: user.into(),
            visible: true,
            tags: BTreeMap::new(),
        }
    }

    /// Add a tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Mark this version as a deletion.
    pub fn deleted(mut self) -> Self {
        self.visible = false;
        self
    }
}

/// One version of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Version metadata.
    pub info: ElementInfo,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl Node {
    /// Create a node version.
    pub fn new(info: ElementInfo, lat: f64, lon: f64) -> Self {
        Self { info, lat, lon }
    }

    /// Fixed-precision position, used as the node's identity for matching.
    pub fn coord(&self) -> Coord {
        Coord::from_degrees(self.lat, self.lon)
    }
}

/// One version of a way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Way {
    /// Version metadata.
    pub info: ElementInfo,
    /// Ordered node ids.
    pub nodes: Vec<i64>,
}

impl Way {
    /// Create a way version.
    pub fn new(info: ElementInfo, nodes: Vec<i64>) -> Self {
        Self { info, nodes }
    }
}

/// Member entry of a relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Type of the referenced element.
    pub member_type: ElementType,
    /// Id of the referenced element.
    pub reference: i64,
    /// Role of the member (may be empty).
    pub role: String,
}

impl Member {
    /// Create a member entry.
    pub fn new(member_type: ElementType, reference: i64, role: impl Into<String>) -> Self {
        Self { member_type, reference, role: role.into() }
    }
}

/// One version of a relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    /// Version metadata.
    pub info: ElementInfo,
    /// Ordered members.
    pub members: Vec<Member>,
}

impl Relation {
    /// Create a relation version.
    pub fn new(info: ElementInfo, members: Vec<Member>) -> Self {
        Self { info, members }
    }
}

/// A raw element version as returned by the history collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Element {
    /// Node version.
    Node(Node),
    /// Way version.
    Way(Way),
    /// Relation version.
    Relation(Relation),
}

impl Element {
    /// Element type.
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::Node(_) => ElementType::Node,
            Self::Way(_) => ElementType::Way,
            Self::Relation(_) => ElementType::Relation,
        }
    }

    /// Version metadata.
    pub fn info(&self) -> &ElementInfo {
        match self {
            Self::Node(n) => &n.info,
            Self::Way(w) => &w.info,
            Self::Relation(r) => &r.info,
        }
    }

    /// Lightweight reference to this version.
    pub fn stamp(&self) -> VersionStamp {
        VersionStamp::new(self.element_type(), self.info())
    }
}

/// Compact, owned reference to one element version.
///
/// Used wherever a version has to be remembered without its payload:
/// membership chains, causes and previous-version lists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionStamp {
    /// Element type.
    pub element_type: ElementType,
    /// Element id.
    pub id: i64,
    /// Version number.
    pub version: u32,
    /// Upload time of this version.
    pub timestamp: DateTime<Utc>,
    /// Changeset of this version.
    pub changeset: u64,
    /// Uploading user.
    pub user: String,
}

impl VersionStamp {
    /// Build a stamp from element metadata.
    pub fn new(element_type: ElementType, info: &ElementInfo) -> Self {
        Self {
            element_type,
            id: info.id,
            version: info.version,
            timestamp: info.timestamp,
            changeset: info.changeset,
            user: info.user.clone(),
        }
    }
}

impl fmt::Display for VersionStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} v{}", self.element_type, self.id, self.version)
    }
}

/// A member of a resolved relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedMember {
    /// Role of the member inside its parent.
    pub role: String,
    /// The member, resolved at the same point in time as its parent.
    pub feature: Feature,
}

/// A feature resolved at one point in time, members included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Feature {
    /// A node.
    Node(Node),
    /// A way with its nodes resolved.
    Way {
        /// Way version.
        way: Way,
        /// Node versions in way order. Nodes that did not exist are left out.
        nodes: Vec<Node>,
    },
    /// A relation with its members resolved.
    Relation {
        /// Relation version.
        relation: Relation,
        /// Members that existed, in relation order.
        members: Vec<ResolvedMember>,
    },
}

impl Feature {
    /// Element type of the feature.
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::Node(_) => ElementType::Node,
            Self::Way { .. } => ElementType::Way,
            Self::Relation { .. } => ElementType::Relation,
        }
    }

    /// Version metadata of the feature itself.
    pub fn info(&self) -> &ElementInfo {
        match self {
            Self::Node(n) => &n.info,
            Self::Way { way, .. } => &way.info,
            Self::Relation { relation, .. } => &relation.info,
        }
    }

    /// Stamp of the feature itself.
    pub fn stamp(&self) -> VersionStamp {
        VersionStamp::new(self.element_type(), self.info())
    }

    /// Every node version reachable from this feature (with repetitions).
    pub fn all_nodes(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        self.collect_nodes(&mut out);
        out
    }

    fn collect_nodes<'a>(&'a self, out: &mut Vec<&'a Node>) {
        match self {
            Self::Node(n) => out.push(n),
            Self::Way { nodes, .. } => out.extend(nodes.iter()),
            Self::Relation { members, .. } => {
                for member in members {
                    member.feature.collect_nodes(out);
                }
            }
        }
    }
}

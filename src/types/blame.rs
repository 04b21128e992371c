//! Blame result types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::canonical::canonical_hash_hex;
use super::changeset::Changeset;
use super::element::{Feature, Node, VersionStamp};
use super::segment::{Coord, MembershipChain};

/// The single most recent revision responsible for a piece of geometry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CausingChange {
    /// The responsible element version.
    pub feature: VersionStamp,
    /// Containers through which the geometry belongs to the root feature.
    pub membership_chain: MembershipChain,
}

impl CausingChange {
    /// Create a causing change.
    pub fn new(feature: VersionStamp, membership_chain: MembershipChain) -> Self {
        Self { feature, membership_chain }
    }

    /// Changeset of the responsible version.
    pub fn changeset(&self) -> u64 {
        self.feature.changeset
    }

    /// Upload time of the responsible version.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.feature.timestamp
    }
}

/// RGB display colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Colour(pub [u8; 3]);

impl Colour {
    /// Create a colour from channels.
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b])
    }

    /// Lowercase six digit hex, e.g. `ff8000`.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// User responsible for a section, with their display colour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionUser {
    /// Display name.
    pub name: String,
    /// Colour assigned to this user for the whole result.
    pub colour: Colour,
}

/// Geometry attributed to one changeset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Disjoint paths (ordered node lists). Single-node paths stand for node members.
    pub paths: Vec<Vec<Node>>,
    /// Deduplicated causes, in first-seen order.
    pub causing_changes: Vec<CausingChange>,
    /// Responsible user.
    pub user: SectionUser,
    /// Full changeset metadata.
    pub changeset: Changeset,
    /// Most recent cause timestamp in this section.
    pub timestamp: DateTime<Utc>,
}

impl Section {
    /// Number of edges covered by this section.
    pub fn segment_count(&self) -> usize {
        self.paths.iter().map(|p| p.len().saturating_sub(1)).sum()
    }
}

/// Bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    /// Southern edge.
    pub min_lat: f64,
    /// Western edge.
    pub min_lon: f64,
    /// Northern edge.
    pub max_lat: f64,
    /// Eastern edge.
    pub max_lon: f64,
}

impl BBox {
    /// Smallest box containing all positions, or `None` for no positions.
    pub fn from_coords<I: IntoIterator<Item = Coord>>(coords: I) -> Option<Self> {
        coords.into_iter().fold(None, |acc, c| {
            let (lat, lon) = (c.lat(), c.lon());
            Some(match acc {
                None => Self { min_lat: lat, min_lon: lon, max_lat: lat, max_lon: lon },
                Some(b) => Self {
                    min_lat: b.min_lat.min(lat),
                    min_lon: b.min_lon.min(lon),
                    max_lat: b.max_lat.max(lat),
                    max_lon: b.max_lon.max(lon),
                },
            })
        })
    }
}

/// Blame of one way or relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsmFeatureBlame {
    /// The feature as it is now.
    pub feature: Feature,
    /// Sections, newest first.
    pub sections: Vec<Section>,
    /// Bounding box of the current geometry.
    pub bbox: BBox,
}

impl OsmFeatureBlame {
    /// Stable hash of the whole result.
    ///
    /// Identical histories produce identical fingerprints.
    pub fn fingerprint(&self) -> String {
        canonical_hash_hex(self)
    }

    /// Total number of edges over all sections.
    pub fn segment_count(&self) -> usize {
        self.sections.iter().map(Section::segment_count).sum()
    }
}

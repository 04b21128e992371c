//! # osm-blame
//!
//! Geographic feature blame for OpenStreetMap ways and relations.
//!
//! The blame answers one question:
//!
//! > For every piece of a feature's current geometry, which edit is the
//! > reason it is part of the feature today?
//!
//! ## Core Contract
//!
//! 1. Resolve the feature now, then at successively earlier points in time
//! 2. Track for every present-day segment the oldest snapshot it appears in
//! 3. Attribute it to the newest revision (node move, way edit or relation
//!    membership change) in that snapshot
//! 4. Export sections grouped by changeset, newest first, with user colours
//!
//! ## Architecture
//!
//! ```text
//! FeatureResolver → reconstruct → Topology → get_cause → group_by_changeset → ColourAssigner
//!        ↓
//!  HistoryAccess (API client or Memory)
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same history + same configuration → identical result and fingerprint
//! - Segments are matched by coordinates, never by node identity
//! - Sections are ordered by (timestamp, changeset id), descending

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod canonical;
pub mod config;
pub mod history;
pub mod progress;
pub mod resolver;
pub mod segments;
pub mod roundabout;
pub mod topology;
pub mod reconstruct;
pub mod cause;
pub mod sections;
pub mod colour;
pub mod blame;

// Re-exports
pub use types::{
    ElementType, ElementInfo, Node, Way, Member, Relation, Element, VersionStamp,
    Feature, ResolvedMember, Coord, Segment, SegmentKey, ChainLink, MembershipChain,
    ChainedSegment, Changeset, CausingChange, Colour, SectionUser, Section, BBox,
    OsmFeatureBlame,
};
pub use canonical::{to_canonical_bytes, canonical_hash, canonical_hash_hex};
pub use config::BlameConfig;
pub use history::{HistoryAccess, HistoryError, InMemoryHistory, InMemoryHistoryError};
pub use progress::{AbortSignal, BlameOptions};
pub use resolver::{FeatureResolver, Resolution, select_version};
pub use segments::{to_segments, feature_segments, build_paths, path_nodes};
pub use roundabout::{Roundabout, detect_roundabouts, fold_roundabouts};
pub use topology::Topology;
pub use reconstruct::{reconstruct, Reconstruction, SegmentSet, TrackedSegment};
pub use cause::get_cause;
pub use sections::{group_by_changeset, AttributedSegment, ChangesetGroup};
pub use colour::{ColourSequence, ColourAssigner};
pub use blame::{BlameError, FeatureBlamer, blame_osm_feature};

/// Schema version of the serialized blame result.
/// Increment on breaking changes to any result type.
pub const BLAME_SCHEMA_VERSION: &str = "1.0.0";

//! Core types for feature blame.

pub mod element;
pub mod segment;
pub mod changeset;
pub mod blame;

pub use element::{
    ElementType, ElementInfo, Element, Node, Way, Relation, Member,
    Feature, ResolvedMember, VersionStamp,
};
pub use segment::{Coord, SegmentKey, Segment, ChainLink, MembershipChain, ChainedSegment};
pub use changeset::Changeset;
pub use blame::{CausingChange, Colour, SectionUser, Section, BBox, OsmFeatureBlame};

//! Cause attribution.
//!
//! A segment is part of a feature because one of three things happened: a
//! node at either end moved there, the way holding it was created or
//! modified, or an ancestor relation gained the way as a member. The cause
//! is whichever of those revisions is the most recent.

use chrono::{DateTime, Utc};

use crate::reconstruct::TrackedSegment;
use crate::types::{CausingChange, ElementType, MembershipChain, Node, VersionStamp};

/// Pick the most recent revision among the two endpoints and the chain.
///
/// Revisions newer than `cutoff` are ignored. On equal timestamps containers
/// win over endpoints, and deeper containers over shallower ones. If every
/// candidate is newer than the cutoff, the start node is blamed.
pub fn get_cause(
    from: &Node,
    to: &Node,
    chain: &MembershipChain,
    cutoff: Option<DateTime<Utc>>,
) -> CausingChange {
    let from_stamp = VersionStamp::new(ElementType::Node, &from.info);
    let to_stamp = VersionStamp::new(ElementType::Node, &to.info);

    // (candidate, number of chain links describing its membership)
    let mut candidates: Vec<(&VersionStamp, usize)> = vec![(&from_stamp, chain.len())];
    if to_stamp != from_stamp {
        candidates.push((&to_stamp, chain.len()));
    }
    candidates.extend(chain.iter().enumerate().map(|(depth, link)| (&link.feature, depth)));

    let (feature, depth) = candidates
        .iter()
        .copied()
        .filter(|(stamp, _)| cutoff.map_or(true, |c| stamp.timestamp <= c))
        .max_by_key(|(stamp, _)| stamp.timestamp)
        .unwrap_or((&from_stamp, chain.len()));

    CausingChange::new(feature.clone(), chain[..depth].to_vec())
}

/// Attribute a tracked segment using its oldest snapshot.
pub fn attribute(tracked: &TrackedSegment) -> CausingChange {
    let oldest = &tracked.oldest;
    get_cause(&oldest.segment.from, &oldest.segment.to, &oldest.chain, tracked.snapshot)
}

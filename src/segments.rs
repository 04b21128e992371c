//! Segment extraction and path walking.
//!
//! A feature's geometry is broken into directed node-pair segments. The
//! [`SegmentIndex`] stores every segment in both directions keyed by its
//! start position, which lets [`PathWalk`] follow unbranched chains, and
//! [`build_paths`] cover every physical edge with exactly one maximal path.

use std::collections::{HashMap, HashSet};

use crate::types::{ChainLink, ChainedSegment, Coord, Feature, MembershipChain, Node, Segment, SegmentKey};

/// Adjacent node pairs, in order.
///
/// Pairs of nodes at the same position (duplicate nodes) are skipped.
pub fn to_segments(nodes: &[Node]) -> Vec<Segment> {
    nodes
        .windows(2)
        .filter(|pair| pair[0].coord() != pair[1].coord())
        .map(|pair| Segment::new(pair[0].clone(), pair[1].clone()))
        .collect()
}

/// Every segment of a resolved feature, with the chain it was reached through.
///
/// Node members become point segments. A way whose nodes all sit at one
/// position yields one point segment.
pub fn feature_segments(feature: &Feature) -> Vec<ChainedSegment> {
    let mut out = Vec::new();
    collect_segments(feature, "", &Vec::new(), &mut out);
    out
}

fn collect_segments(feature: &Feature, role: &str, chain: &MembershipChain, out: &mut Vec<ChainedSegment>) {
    match feature {
        Feature::Node(node) => out.push(ChainedSegment::new(Segment::point(node.clone()), chain.clone())),
        Feature::Way { nodes, .. } => {
            let mut chain = chain.clone();
            chain.push(ChainLink::new(feature.stamp(), role));
            let segments = to_segments(nodes);
            match nodes.first() {
                Some(first) if segments.is_empty() => {
                    out.push(ChainedSegment::new(Segment::point(first.clone()), chain));
                }
                _ => out.extend(segments.into_iter().map(|s| ChainedSegment::new(s, chain.clone()))),
            }
        }
        Feature::Relation { members, .. } => {
            let mut chain = chain.clone();
            chain.push(ChainLink::new(feature.stamp(), role));
            for member in members {
                collect_segments(&member.feature, &member.role, &chain, out);
            }
        }
    }
}

/// Segments keyed by start position, each stored in both directions.
///
/// Point segments are ignored; a physical edge is stored once per direction
/// no matter how often it is inserted.
#[derive(Debug, Clone, Default)]
pub struct SegmentIndex {
    by_start: HashMap<Coord, Vec<Segment>>,
}

impl SegmentIndex {
    /// Index a set of segments.
    pub fn new<'a, I: IntoIterator<Item = &'a Segment>>(segments: I) -> Self {
        let mut index = Self::default();
        for segment in segments {
            index.insert(segment);
        }
        index
    }

    /// Insert a segment and its reverse.
    pub fn insert(&mut self, segment: &Segment) {
        if segment.is_point() {
            return;
        }
        for directed in [segment.clone(), segment.reversed()] {
            let leaving = self.by_start.entry(directed.start()).or_default();
            if !leaving.iter().any(|s| s.end() == directed.end()) {
                leaving.push(directed);
            }
        }
    }

    /// Segments leaving a position, in either original direction.
    pub fn leaving(&self, start: &Coord) -> &[Segment] {
        self.by_start.get(start).map_or(&[], Vec::as_slice)
    }

    /// Segments that continue `segment` at its end, excluding its own reverse.
    pub fn continuations<'a>(&'a self, segment: &Segment) -> impl Iterator<Item = &'a Segment> + 'a {
        let key = segment.key();
        self.leaving(&segment.end()).iter().filter(move |s| s.key() != key)
    }

    /// Number of positions with at least one segment.
    pub fn len(&self) -> usize {
        self.by_start.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.by_start.is_empty()
    }
}

/// Lazy walk along an unbranched chain of segments.
///
/// Starts with the given segment and keeps going while the current end has
/// exactly one continuation. Stops at a branch point, a dead end, or when
/// the chain closes back onto the start segment. Finite: no segment is
/// yielded twice.
#[derive(Debug, Clone)]
pub struct PathWalk<'a> {
    index: &'a SegmentIndex,
    start: SegmentKey,
    next: Option<Segment>,
    walked: HashSet<SegmentKey>,
    closed: bool,
}

impl<'a> PathWalk<'a> {
    /// Whether the walk ended by returning to its start segment.
    ///
    /// Only meaningful once the walk is exhausted.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Iterator for PathWalk<'_> {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        let current = self.next.take()?;
        self.walked.insert(current.key());

        let mut continuations = self.index.continuations(&current);
        if let (Some(only), None) = (continuations.next(), continuations.next()) {
            let key = only.key();
            if key == self.start {
                self.closed = true;
            } else if !self.walked.contains(&key) {
                self.next = Some(only.clone());
            }
        }
        Some(current)
    }
}

/// Walk forward from `start`.
pub fn walk_path<'a>(start: &Segment, index: &'a SegmentIndex) -> PathWalk<'a> {
    PathWalk {
        index,
        start: start.key(),
        next: Some(start.clone()),
        walked: HashSet::new(),
        closed: false,
    }
}

/// Cover every edge with maximal unbranched paths.
///
/// For each edge not yet covered, walk backwards to the start of its chain
/// (a branch point or dead end, or the edge itself on a closed loop), then
/// walk forwards collecting the path. Each physical edge ends up in exactly
/// one path. Point segments are skipped.
pub fn build_paths(segments: &[Segment]) -> Vec<Vec<Segment>> {
    let index = SegmentIndex::new(segments);
    let mut visited: HashSet<SegmentKey> = HashSet::new();
    let mut paths = Vec::new();

    for segment in segments.iter().filter(|s| !s.is_point()) {
        if visited.contains(&segment.key()) {
            continue;
        }

        let mut backwards = walk_path(&segment.reversed(), &index);
        let furthest = backwards.by_ref().last();
        let start = match furthest {
            Some(last) if !backwards.is_closed() => last.reversed(),
            _ => segment.clone(),
        };

        let path: Vec<Segment> = walk_path(&start, &index).collect();
        visited.extend(path.iter().map(Segment::key));
        debug_assert!(visited.contains(&segment.key()));
        paths.push(path);
    }

    paths
}

/// Node list of a path: the start node followed by every segment's end node.
pub fn path_nodes(path: &[Segment]) -> Vec<Node> {
    let mut nodes = Vec::with_capacity(path.len() + 1);
    if let Some(first) = path.first() {
        nodes.push(first.from.clone());
    }
    nodes.extend(path.iter().map(|s| s.to.clone()));
    nodes
}

/// Total length of a path in meters.
pub fn path_length_m(path: &[Segment]) -> f64 {
    path.iter().map(Segment::length_m).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ElementInfo, ElementType, Member, Relation, ResolvedMember, Way};
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn n(id: i64, lat: f64, lon: f64) -> Node {
        let ts = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        Node::new(ElementInfo::new(id, 1, ts, 1, "alice"), lat, lon)
    }

    fn line(points: &[(f64, f64)]) -> Vec<Segment> {
        let nodes: Vec<Node> = points
            .iter()
            .enumerate()
            .map(|(i, (lat, lon))| n(i as i64 + 1, *lat, *lon))
            .collect();
        to_segments(&nodes)
    }

    #[test]
    fn test_to_segments() {
        let segs = line(&[(0.0, 0.0), (0.0, 1.0), (0.0, 2.0)]);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].end(), segs[1].start());
        assert!(to_segments(&[n(1, 0.0, 0.0)]).is_empty());
    }

    #[test]
    fn test_duplicate_nodes_make_no_point_segments() {
        // node 3 sits exactly on node 2
        let nodes = vec![n(1, 0.0, 0.0), n(2, 0.0, 1.0), n(3, 0.0, 1.0), n(4, 0.0, 2.0)];
        let segs = to_segments(&nodes);
        assert_eq!(segs.len(), 2);
        assert!(segs.iter().all(|s| !s.is_point()));
        assert_eq!(segs[1].from.info.id, 3);

        let ts = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let way = Way::new(ElementInfo::new(10, 1, ts, 1, "alice"), vec![1, 2, 3, 4]);
        let chained = feature_segments(&Feature::Way { way, nodes });
        assert_eq!(chained.len(), 2);
        assert!(chained.iter().all(|c| !c.segment.is_point()));
    }

    #[test]
    fn test_collapsed_way_is_one_point() {
        let ts = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let way = Way::new(ElementInfo::new(10, 1, ts, 1, "alice"), vec![1, 2]);
        let nodes = vec![n(1, 0.0, 1.0), n(2, 0.0, 1.0)];
        let chained = feature_segments(&Feature::Way { way, nodes });
        assert_eq!(chained.len(), 1);
        assert!(chained[0].segment.is_point());
    }

    #[test]
    fn test_index_both_directions() {
        let segs = line(&[(0.0, 0.0), (0.0, 1.0)]);
        let index = SegmentIndex::new(&segs);
        assert_eq!(index.leaving(&Coord::from_degrees(0.0, 0.0)).len(), 1);
        assert_eq!(index.leaving(&Coord::from_degrees(0.0, 1.0)).len(), 1);
    }

    #[test]
    fn test_index_deduplicates_edges() {
        let mut segs = line(&[(0.0, 0.0), (0.0, 1.0)]);
        segs.push(segs[0].reversed());
        let index = SegmentIndex::new(&segs);
        assert_eq!(index.leaving(&Coord::from_degrees(0.0, 0.0)).len(), 1);
    }

    #[test]
    fn test_walk_stops_at_branch() {
        // a - b - c with a spur b - d
        let mut segs = line(&[(0.0, 0.0), (0.0, 1.0), (0.0, 2.0)]);
        segs.push(Segment::new(n(9, 0.0, 1.0), n(10, 1.0, 1.0)));
        let index = SegmentIndex::new(&segs);

        let walked: Vec<_> = walk_path(&segs[0], &index).collect();
        assert_eq!(walked.len(), 1);
    }

    #[test]
    fn test_walk_closed_loop() {
        let segs = line(&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (0.0, 0.0)]);
        let index = SegmentIndex::new(&segs);
        let mut walk = walk_path(&segs[1], &index);
        let walked: Vec<_> = walk.by_ref().collect();
        assert_eq!(walked.len(), 3);
        assert!(walk.is_closed());
    }

    #[test]
    fn test_build_paths_single_line_from_middle() {
        let segs = line(&[(0.0, 0.0), (0.0, 1.0), (0.0, 2.0), (0.0, 3.0)]);
        // seed in the middle of the line
        let shuffled = vec![segs[1].clone(), segs[0].clone(), segs[2].clone()];
        let paths = build_paths(&shuffled);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].len(), 3);
        let nodes = path_nodes(&paths[0]);
        let ends = [nodes[0].coord(), nodes[3].coord()];
        assert!(ends.contains(&Coord::from_degrees(0.0, 0.0)));
        assert!(ends.contains(&Coord::from_degrees(0.0, 3.0)));
    }

    #[test]
    fn test_build_paths_splits_at_junction() {
        // T junction: a - b - c and b - d
        let mut segs = line(&[(0.0, 0.0), (0.0, 1.0), (0.0, 2.0)]);
        segs.push(Segment::new(n(9, 0.0, 1.0), n(10, 1.0, 1.0)));
        let paths = build_paths(&segs);
        assert_eq!(paths.len(), 3);
        assert!(paths.iter().all(|p| p.len() == 1));
    }

    #[test]
    fn test_build_paths_covers_each_edge_once() {
        let mut segs = line(&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0), (0.0, 0.0)]);
        segs.push(Segment::new(n(20, 1.0, 1.0), n(21, 2.0, 2.0)));
        segs.push(segs[0].reversed());

        let paths = build_paths(&segs);
        let keys: Vec<SegmentKey> = paths.iter().flatten().map(Segment::key).collect();
        let unique: HashSet<SegmentKey> = keys.iter().copied().collect();
        assert_eq!(keys.len(), unique.len());
        assert_eq!(unique.len(), 5);
    }

    #[test]
    fn test_feature_segments_chain() {
        let ts = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let way = Feature::Way {
            way: Way::new(ElementInfo::new(10, 1, ts, 1, "alice"), vec![1, 2, 3]),
            nodes: vec![n(1, 0.0, 0.0), n(2, 0.0, 1.0), n(3, 0.0, 2.0)],
        };
        let relation = Feature::Relation {
            relation: Relation::new(
                ElementInfo::new(100, 1, ts, 1, "alice"),
                vec![Member::new(ElementType::Way, 10, "outer"), Member::new(ElementType::Node, 4, "stop")],
            ),
            members: vec![
                ResolvedMember { role: "outer".into(), feature: way },
                ResolvedMember { role: "stop".into(), feature: Feature::Node(n(4, 5.0, 5.0)) },
            ],
        };

        let segs = feature_segments(&relation);
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[0].chain.len(), 2);
        assert_eq!(segs[0].chain[1].role, "outer");
        assert_eq!(segs[0].chain[1].feature.id, 10);
        assert!(segs[2].segment.is_point());
        assert_eq!(segs[2].chain.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_build_paths_covers_every_edge_once(
            points in proptest::collection::vec((0i32..4, 0i32..4), 2..24)
        ) {
            // polylines on a small grid cross and retrace each other often
            let segs = line(&points.iter().map(|(a, b)| (*a as f64 * 0.001, *b as f64 * 0.001)).collect::<Vec<_>>());
            let expected: HashSet<SegmentKey> = segs.iter().filter(|s| !s.is_point()).map(Segment::key).collect();

            let paths = build_paths(&segs);
            let keys: Vec<SegmentKey> = paths.iter().flatten().map(Segment::key).collect();
            let unique: HashSet<SegmentKey> = keys.iter().copied().collect();
            prop_assert_eq!(keys.len(), unique.len());
            prop_assert_eq!(unique, expected);

            for path in &paths {
                prop_assert!(path.windows(2).all(|w| w[0].end() == w[1].start()));
            }
        }
    }
}

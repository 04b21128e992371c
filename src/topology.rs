//! Present-day geometry of a feature: paths, roundabouts and path groups.

use serde::{Deserialize, Serialize};

use crate::config::BlameConfig;
use crate::roundabout::{detect_roundabouts, fold_roundabouts, Roundabout};
use crate::segments::build_paths;
use crate::types::Segment;

/// Paths of the current geometry and how they group together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topology {
    /// Maximal unbranched paths.
    pub paths: Vec<Vec<Segment>>,
    /// Path indices of each accepted roundabout.
    pub roundabouts: Vec<Vec<usize>>,
    /// Path indices of each group, roundabouts folded in.
    pub groups: Vec<Vec<usize>>,
}

impl Topology {
    /// Walk paths, detect roundabouts and fold them into groups.
    pub fn build(segments: &[Segment], config: &BlameConfig) -> Self {
        let paths = build_paths(segments);
        let roundabouts: Vec<Roundabout> = detect_roundabouts(&paths, config.roundabout_max_length_m);
        let groups = fold_roundabouts(&paths, &roundabouts);
        tracing::debug!(
            paths = paths.len(),
            roundabouts = roundabouts.len(),
            groups = groups.len(),
            "topology built"
        );
        Self {
            paths,
            roundabouts: roundabouts.into_iter().map(|r| r.paths).collect(),
            groups,
        }
    }

    /// Segments in group order, then path order, oriented along their path.
    pub fn ordered_segments(&self) -> impl Iterator<Item = &Segment> + '_ {
        self.groups
            .iter()
            .flatten()
            .filter_map(move |&p| self.paths.get(p))
            .flatten()
    }

    /// Number of edges covered.
    pub fn segment_count(&self) -> usize {
        self.paths.iter().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::to_segments;
    use crate::types::{ElementInfo, Node, SegmentKey};
    use chrono::{TimeZone, Utc};
    use std::collections::HashSet;

    fn line(points: &[(f64, f64)]) -> Vec<Segment> {
        let ts = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let nodes: Vec<Node> = points
            .iter()
            .map(|(lat, lon)| Node::new(ElementInfo::new(0, 1, ts, 1, "alice"), *lat, *lon))
            .collect();
        to_segments(&nodes)
    }

    #[test]
    fn test_ordered_segments_cover_geometry() {
        let mut segs = line(&[(0.0, -0.002), (0.0, 0.0)]);
        segs.extend(line(&[(0.0, 0.0), (0.0004, 0.0005), (0.0, 0.001), (-0.0004, 0.0005), (0.0, 0.0)]));
        segs.extend(line(&[(0.0, 0.001), (0.0, 0.003)]));

        let topology = Topology::build(&segs, &BlameConfig::default());
        assert_eq!(topology.groups.len(), 1);
        assert_eq!(topology.roundabouts.len(), 1);

        let ordered: HashSet<SegmentKey> = topology.ordered_segments().map(Segment::key).collect();
        let expected: HashSet<SegmentKey> = segs.iter().map(Segment::key).collect();
        assert_eq!(ordered, expected);
        assert_eq!(topology.segment_count(), segs.len());
    }

    #[test]
    fn test_zero_threshold_disables_roundabouts() {
        let segs = line(&[(0.0, 0.0), (0.0004, 0.0005), (0.0, 0.001), (0.0, 0.0)]);
        let topology = Topology::build(&segs, &BlameConfig::new(50, 0.0, 32));
        assert!(topology.roundabouts.is_empty());
        assert_eq!(topology.groups.len(), 1);
    }
}

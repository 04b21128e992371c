//! Roundabout detection.
//!
//! Paths are treated as nodes of a second-level graph, adjacent when they
//! share an endpoint. Short cycles in that graph (a closed path, or a chain
//! of paths returning to where it started) are roundabouts. They are folded
//! into the neighbouring path groups so a road passing through a roundabout
//! reads as one piece of geometry.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};

use crate::segments::path_length_m;
use crate::types::{Coord, Segment};

/// A cycle of paths.
#[derive(Debug, Clone, PartialEq)]
pub struct Roundabout {
    /// Indices of the paths forming the cycle, ascending.
    pub paths: Vec<usize>,
    /// Total length in meters.
    pub length_m: f64,
}

#[derive(Debug, Clone, Copy)]
struct PathEnds {
    start: Coord,
    end: Coord,
    length_m: f64,
}

impl PathEnds {
    fn of(path: &[Segment]) -> Option<Self> {
        Some(Self {
            start: path.first()?.start(),
            end: path.last()?.end(),
            length_m: path_length_m(path),
        })
    }

    fn is_closed(&self) -> bool {
        self.start == self.end
    }
}

/// Rounding allowance when comparing lengths summed in different orders.
const SLACK_M: f64 = 1e-6;

/// An open path, as an edge between two numbered junctions.
#[derive(Debug, Clone, Copy)]
struct Link {
    a: usize,
    b: usize,
    length_m: f64,
}

impl Link {
    fn other(&self, at: usize) -> usize {
        if self.a == at { self.b } else { self.a }
    }
}

/// Distance key for the return-distance heap.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Metres(f64);

impl Eq for Metres {}

impl PartialOrd for Metres {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Metres {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

struct CycleSearch<'a> {
    /// Links by path index; `None` for empty and closed paths.
    links: &'a [Option<Link>],
    /// Path indices by junction.
    incident: &'a [Vec<usize>],
    max_length_m: f64,
    /// Path the current search started from; only higher indices are used.
    first: usize,
    /// Shortest distance from each junction back to the search target, over
    /// paths with an index above `first`.
    remaining: Vec<f64>,
    found: HashSet<Vec<usize>>,
    candidates: Vec<Roundabout>,
}

impl CycleSearch<'_> {
    fn record(&mut self, chain: &[usize], length_m: f64) {
        let mut paths = chain.to_vec();
        paths.sort_unstable();
        if self.found.insert(paths.clone()) {
            self.candidates.push(Roundabout { paths, length_m });
        }
    }

    /// Find every cycle whose lowest path index is `first`.
    fn search_from(&mut self, first: usize, link: Link) {
        self.first = first;
        self.remaining = self.distances_to(link.a, link.length_m);
        self.grow(&mut vec![first], link.b, link.a, link.length_m);
    }

    /// Dijkstra from `target` over paths above `first`, bounded by what is
    /// left of the length budget after the first path.
    fn distances_to(&self, target: usize, used_m: f64) -> Vec<f64> {
        let budget = self.max_length_m - used_m + SLACK_M;
        let mut dist = vec![f64::INFINITY; self.incident.len()];
        let mut heap = BinaryHeap::new();
        dist[target] = 0.0;
        heap.push(Reverse((Metres(0.0), target)));

        while let Some(Reverse((Metres(d), at))) = heap.pop() {
            if d > dist[at] {
                continue;
            }
            for &next in self.incident[at].iter().filter(|&&p| p > self.first) {
                let Some(link) = self.links[next] else { continue };
                let reach = d + link.length_m;
                let other = link.other(at);
                if reach <= budget && reach < dist[other] {
                    dist[other] = reach;
                    heap.push(Reverse((Metres(reach), other)));
                }
            }
        }
        dist
    }

    /// Depth-first growth of `chain`, currently standing at junction `at`.
    fn grow(&mut self, chain: &mut Vec<usize>, at: usize, target: usize, length_m: f64) {
        let (links, incident) = (self.links, self.incident);
        for &next in &incident[at] {
            if next <= self.first || chain.contains(&next) {
                continue;
            }
            let Some(link) = links[next] else { continue };
            let total = length_m + link.length_m;
            if total > self.max_length_m {
                continue;
            }
            // no way back within the budget, even reusing paths already in the chain
            let other = link.other(at);
            if total + self.remaining[other] > self.max_length_m + SLACK_M {
                continue;
            }
            chain.push(next);
            if other == target {
                self.record(chain, total);
            } else {
                self.grow(chain, other, target, total);
            }
            chain.pop();
        }
    }
}

/// Find disjoint roundabouts no longer than `max_length_m`.
///
/// Candidates are accepted shortest first; a path belongs to at most one
/// accepted roundabout.
pub fn detect_roundabouts(paths: &[Vec<Segment>], max_length_m: f64) -> Vec<Roundabout> {
    let ends: Vec<Option<PathEnds>> = paths.iter().map(|p| PathEnds::of(p)).collect();

    let mut junctions: HashMap<Coord, usize> = HashMap::new();
    let mut junction = |c: Coord| {
        let next = junctions.len();
        *junctions.entry(c).or_insert(next)
    };
    let links: Vec<Option<Link>> = ends
        .iter()
        .map(|e| {
            e.filter(|e| !e.is_closed())
                .map(|e| Link { a: junction(e.start), b: junction(e.end), length_m: e.length_m })
        })
        .collect();
    let mut incident: Vec<Vec<usize>> = vec![Vec::new(); junctions.len()];
    for (i, link) in links.iter().enumerate() {
        if let Some(link) = link {
            incident[link.a].push(i);
            incident[link.b].push(i);
        }
    }

    let mut search = CycleSearch {
        links: &links,
        incident: &incident,
        max_length_m,
        first: 0,
        remaining: Vec::new(),
        found: HashSet::new(),
        candidates: Vec::new(),
    };

    for (i, e) in ends.iter().enumerate() {
        let Some(e) = e else { continue };
        if e.length_m > max_length_m {
            continue;
        }
        if e.is_closed() {
            search.record(&[i], e.length_m);
        } else if let Some(link) = links[i] {
            search.search_from(i, link);
        }
    }

    let mut candidates = search.candidates;
    candidates.sort_by(|a, b| {
        a.length_m
            .partial_cmp(&b.length_m)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.paths.cmp(&b.paths))
    });

    let mut claimed: HashSet<usize> = HashSet::new();
    let mut accepted = Vec::new();
    for candidate in candidates {
        if candidate.paths.iter().any(|p| claimed.contains(p)) {
            continue;
        }
        claimed.extend(candidate.paths.iter().copied());
        tracing::trace!(paths = ?candidate.paths, length_m = candidate.length_m, "roundabout accepted");
        accepted.push(candidate);
    }
    accepted
}

/// Group paths, folding each roundabout into the groups it touches.
///
/// Every path outside a roundabout starts as its own group. A roundabout
/// touching exactly one group is absorbed into it; one touching exactly two
/// joins them into one group; otherwise it forms a group of its own.
/// Groups are returned ordered by their lowest path index, and a roundabout
/// never ends up in more than one group.
pub fn fold_roundabouts(paths: &[Vec<Segment>], roundabouts: &[Roundabout]) -> Vec<Vec<usize>> {
    let in_roundabout: HashSet<usize> = roundabouts.iter().flat_map(|r| r.paths.iter().copied()).collect();

    let mut groups: Vec<Option<Vec<usize>>> = Vec::new();
    let mut group_of: Vec<Option<usize>> = vec![None; paths.len()];
    // groups that consist of a stand-alone roundabout only
    let mut standalone: HashSet<usize> = HashSet::new();

    for (i, path) in paths.iter().enumerate() {
        if !path.is_empty() && !in_roundabout.contains(&i) {
            group_of[i] = Some(groups.len());
            groups.push(Some(vec![i]));
        }
    }

    let mut by_endpoint: HashMap<Coord, Vec<usize>> = HashMap::new();
    for (i, ends) in paths.iter().enumerate().filter_map(|(i, p)| PathEnds::of(p).map(|e| (i, e))) {
        by_endpoint.entry(ends.start).or_default().push(i);
        by_endpoint.entry(ends.end).or_default().push(i);
    }

    for roundabout in roundabouts {
        let members: HashSet<usize> = roundabout.paths.iter().copied().collect();
        let touched: BTreeSet<usize> = roundabout
            .paths
            .iter()
            .filter_map(|&p| PathEnds::of(&paths[p]))
            .flat_map(|e| [e.start, e.end])
            .flat_map(|c| by_endpoint.get(&c).into_iter().flatten().copied())
            .filter(|p| !members.contains(p))
            .filter_map(|p| group_of[p])
            .filter(|g| !standalone.contains(g))
            .collect();

        let target = match touched.iter().copied().collect::<Vec<_>>().as_slice() {
            [only] => *only,
            [first, second] => {
                let moved = groups[*second].take().unwrap_or_default();
                for &p in &moved {
                    group_of[p] = Some(*first);
                }
                if let Some(group) = groups[*first].as_mut() {
                    group.extend(roundabout.paths.iter().copied());
                    group.extend(moved);
                }
                for &p in &roundabout.paths {
                    group_of[p] = Some(*first);
                }
                continue;
            }
            _ => {
                standalone.insert(groups.len());
                groups.push(Some(Vec::new()));
                groups.len() - 1
            }
        };
        if let Some(group) = groups[target].as_mut() {
            group.extend(roundabout.paths.iter().copied());
        }
        for &p in &roundabout.paths {
            group_of[p] = Some(target);
        }
    }

    let mut groups: Vec<Vec<usize>> = groups.into_iter().flatten().filter(|g| !g.is_empty()).collect();
    groups.sort_by_key(|g| g.iter().copied().min().unwrap_or(usize::MAX));
    groups
}

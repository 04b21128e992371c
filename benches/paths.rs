//! Performance benchmarks for the geometry stages of a blame.
//!
//! Run with: `cargo bench --bench paths`
//!
//! ## Performance Targets
//!
//! | Operation | Target | Notes |
//! |-----------|--------|-------|
//! | Path building | <10ms for 10k segments | Street grid, many junctions |
//! | Topology | <50ms for 10k segments | Includes roundabout search |
//! | Full blame | Linear in history length | In-memory history |

use criterion::{
    black_box, criterion_group, criterion_main,
    BenchmarkId, Criterion, Throughput,
};

use chrono::{Duration, TimeZone, Utc};
use osm_blame::{
    blame_osm_feature, build_paths, to_segments, BlameConfig, BlameOptions, Changeset,
    ElementInfo, ElementType, InMemoryHistory, Node, Segment, Topology, Way,
};

/// Spacing of the street grid in degrees (about 110 m).
const GRID_STEP: f64 = 0.001;

/// Create a test node.
fn make_node(id: i64, lat: f64, lon: f64) -> Node {
    let ts = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    Node::new(ElementInfo::new(id, 1, ts, 1, "bench"), lat, lon)
}

/// A `size` × `size` street grid: every row and column is one straight street.
fn make_grid(size: usize) -> Vec<Segment> {
    let mut segments = Vec::new();
    for i in 0..size {
        let row: Vec<Node> = (0..size)
            .map(|j| make_node((i * size + j) as i64, i as f64 * GRID_STEP, j as f64 * GRID_STEP))
            .collect();
        let column: Vec<Node> = (0..size)
            .map(|j| make_node((j * size + i) as i64, j as f64 * GRID_STEP, i as f64 * GRID_STEP))
            .collect();
        segments.extend(to_segments(&row));
        segments.extend(to_segments(&column));
    }
    segments
}

/// A way with `versions` versions, each one node longer than the last.
fn make_growing_way(versions: u32) -> InMemoryHistory {
    let start = Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap();
    let mut history = InMemoryHistory::new();
    history.add_node(Node::new(ElementInfo::new(1, 1, start, 1, "user1"), 0.0, 0.0));
    for k in 1..=versions {
        let ts = start + Duration::days(k as i64);
        let user = format!("user{}", k % 7);
        history.add_node(Node::new(
            ElementInfo::new(k as i64 + 1, 1, ts, k as u64, user.as_str()),
            0.0,
            k as f64 * GRID_STEP,
        ));
        history.add_way(Way::new(
            ElementInfo::new(10, k, ts, k as u64, user.as_str()),
            (1..=k as i64 + 1).collect(),
        ));
        history.add_changeset(Changeset::new(k as u64, user, ts));
    }
    history
}

/// Benchmark path building on street grids.
fn bench_build_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_paths");

    for size in [10, 30, 70] {
        let segments = make_grid(size);

        group.throughput(Throughput::Elements(segments.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("grid", size),
            &segments,
            |b, segments| b.iter(|| build_paths(black_box(segments))),
        );
    }

    group.finish();
}

/// Benchmark topology (paths, roundabouts, groups) on street grids.
fn bench_topology(c: &mut Criterion) {
    let config = BlameConfig::default();
    let mut group = c.benchmark_group("topology");

    for size in [10, 30] {
        let segments = make_grid(size);

        group.throughput(Throughput::Elements(segments.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("grid", size),
            &segments,
            |b, segments| {
                b.iter(|| {
                    let topology = Topology::build(black_box(segments), &config);
                    assert_eq!(topology.segment_count(), segments.len());
                    topology
                })
            },
        );
    }

    group.finish();
}

/// Benchmark a full blame against an in-memory history.
fn bench_blame(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("blame");

    for versions in [10, 50, 200] {
        let history = make_growing_way(versions);

        group.bench_with_input(
            BenchmarkId::new("versions", versions),
            &history,
            |b, history| {
                b.iter(|| {
                    runtime
                        .block_on(blame_osm_feature(history, ElementType::Way, 10, BlameOptions::new()))
                        .unwrap()
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_build_paths,
    bench_topology,
    bench_blame,
);

criterion_main!(benches);

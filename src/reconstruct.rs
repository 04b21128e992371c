//! Backward-in-time reconstruction.
//!
//! Starting from the feature's current geometry, the feature is resolved at
//! successively earlier points in time. Every snapshot segment that matches
//! (by coordinates) a present-day segment replaces the stored snapshot of
//! that segment, so each segment converges to the oldest snapshot in which
//! it is present. The loop ends once a snapshot shares no segment with the
//! current geometry, or no older revision is left.
//!
//! The candidate times are the timestamps of strictly older versions of the
//! elements involved; they are finite and strictly decreasing, so the loop
//! terminates.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::blame::BlameError;
use crate::history::HistoryAccess;
use crate::progress::Progress;
use crate::resolver::FeatureResolver;
use crate::segments::feature_segments;
use crate::types::{BBox, ChainedSegment, ElementType, Feature, Segment, SegmentKey};

/// A present-day segment and the oldest snapshot it was found in.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedSegment {
    /// The segment as it is now, oriented as in the current feature.
    pub current: Segment,
    /// The segment in the oldest matching snapshot, with that snapshot's chain.
    pub oldest: ChainedSegment,
    /// Time of the oldest matching snapshot; `None` if only the current state matched.
    pub snapshot: Option<DateTime<Utc>>,
}

/// Present-day segments keyed by coordinates, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct SegmentSet {
    entries: Vec<TrackedSegment>,
    by_key: HashMap<SegmentKey, usize>,
}

impl SegmentSet {
    /// Seed from the current geometry. Duplicate edges keep their first occurrence.
    pub fn from_current(segments: Vec<ChainedSegment>) -> Self {
        let mut set = Self::default();
        for chained in segments {
            let key = chained.key();
            if set.by_key.contains_key(&key) {
                continue;
            }
            set.by_key.insert(key, set.entries.len());
            set.entries.push(TrackedSegment {
                current: chained.segment.clone(),
                oldest: chained,
                snapshot: None,
            });
        }
        set
    }

    /// Overwrite every matching entry with its snapshot version.
    ///
    /// Returns the number of distinct present-day segments matched.
    pub fn overwrite(&mut self, snapshot: Vec<ChainedSegment>, at: DateTime<Utc>) -> usize {
        let mut matched = 0;
        let mut seen = vec![false; self.entries.len()];
        for chained in snapshot {
            let Some(&i) = self.by_key.get(&chained.key()) else { continue };
            if seen[i] {
                continue;
            }
            seen[i] = true;
            matched += 1;
            let entry = &mut self.entries[i];
            entry.oldest = chained;
            entry.snapshot = Some(at);
        }
        matched
    }

    /// Look up a present-day segment.
    pub fn get(&self, key: &SegmentKey) -> Option<&TrackedSegment> {
        self.by_key.get(key).map(|&i| &self.entries[i])
    }

    /// All entries, in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &TrackedSegment> {
        self.entries.iter()
    }

    /// Present-day segments, in first-seen order.
    pub fn current_segments(&self) -> Vec<Segment> {
        self.entries.iter().map(|e| e.current.clone()).collect()
    }

    /// Number of distinct segments.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of the reconstruction loop.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    /// The feature as it is now.
    pub feature: Feature,
    /// Bounding box of the current geometry.
    pub bbox: BBox,
    /// Present-day segments with their oldest snapshot.
    pub segments: SegmentSet,
    /// Number of point-in-time resolutions performed after the initial one.
    pub iterations: usize,
}

/// Run the reconstruction loop for one feature.
///
/// Reports into the caller's progress: the initial resolution in the current
/// phase, then fires the bounding box callback, then reports the loop by the
/// fraction of the history's time span covered.
pub async fn reconstruct<H: HistoryAccess>(
    resolver: &FeatureResolver<'_, H>,
    element_type: ElementType,
    id: i64,
    progress: &mut Progress,
) -> Result<Reconstruction, BlameError> {
    let current = resolver
        .resolve(element_type, id, None, Some(&mut *progress))
        .await?
        .ok_or(BlameError::NotFound { element_type, id })?;

    let bbox = BBox::from_coords(current.feature.all_nodes().into_iter().map(|n| n.coord()))
        .ok_or(BlameError::NoGeometry { element_type, id })?;
    progress.bbox(bbox)?;

    let mut segments = SegmentSet::from_current(feature_segments(&current.feature));
    let newest = current.latest_timestamp();
    let oldest = current
        .all_previous_versions
        .iter()
        .map(|s| s.timestamp)
        .min()
        .unwrap_or(newest)
        .min(newest);
    let span = (newest - oldest).num_seconds().max(1) as f64;

    progress.phase(0.1, 0.95);
    let mut date = Some(newest);
    let mut iterations = 0;

    while let Some(at) = date {
        progress.report((newest - at).num_seconds() as f64 / span)?;

        let Some(snapshot) = resolver.resolve(element_type, id, Some(at), None).await? else {
            tracing::debug!(%at, "feature absent, history exhausted");
            break;
        };
        iterations += 1;

        let matched = segments.overwrite(feature_segments(&snapshot.feature), at);
        tracing::debug!(%at, matched, total = segments.len(), "snapshot compared");
        if matched == 0 {
            break;
        }

        date = snapshot
            .all_previous_versions
            .iter()
            .map(|s| s.timestamp)
            .filter(|t| *t < at)
            .max();
    }

    tracing::info!(%element_type, id, iterations, segments = segments.len(), "reconstruction finished");
    progress.report(1.0)?;

    Ok(Reconstruction {
        feature: current.feature,
        bbox,
        segments,
        iterations,
    })
}

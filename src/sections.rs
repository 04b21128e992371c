//! Grouping attributed segments into per-changeset sections.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::types::{CausingChange, Node, Segment};

/// A present-day segment together with the change that caused it.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributedSegment {
    /// The segment, oriented as in the current geometry.
    pub segment: Segment,
    /// Responsible change.
    pub cause: CausingChange,
}

impl AttributedSegment {
    /// Pair a segment with its cause.
    pub fn new(segment: Segment, cause: CausingChange) -> Self {
        Self { segment, cause }
    }
}

/// All geometry attributed to one changeset, before changeset metadata and
/// colours are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangesetGroup {
    /// Changeset id.
    pub changeset: u64,
    /// User of the first cause seen for this changeset.
    pub user: String,
    /// Stitched paths.
    pub paths: Vec<Vec<Node>>,
    /// Deduplicated causes, in first-seen order.
    pub causing_changes: Vec<CausingChange>,
    /// Most recent cause timestamp.
    pub timestamp: DateTime<Utc>,
}

impl ChangesetGroup {
    fn new(cause: &CausingChange) -> Self {
        Self {
            changeset: cause.changeset(),
            user: cause.feature.user.clone(),
            paths: Vec::new(),
            causing_changes: Vec::new(),
            timestamp: cause.timestamp(),
        }
    }

    fn push(&mut self, attributed: AttributedSegment) {
        let AttributedSegment { segment, cause } = attributed;

        if segment.is_point() {
            self.paths.push(vec![segment.from]);
        } else {
            let extends = self
                .paths
                .last()
                .filter(|path| path.len() > 1)
                .and_then(|path| path.last())
                .is_some_and(|last| last.coord() == segment.start());
            match self.paths.last_mut() {
                Some(path) if extends => path.push(segment.to),
                _ => self.paths.push(vec![segment.from, segment.to]),
            }
        }

        self.timestamp = self.timestamp.max(cause.timestamp());
        if !self.causing_changes.contains(&cause) {
            self.causing_changes.push(cause);
        }
    }
}

/// Group segments by the changeset of their cause.
///
/// Within a group, consecutive segments that continue each other are
/// stitched into one path; any discontinuity starts a new path. Groups come
/// back newest first, ties broken by descending changeset id.
pub fn group_by_changeset<I>(segments: I) -> Vec<ChangesetGroup>
where
    I: IntoIterator<Item = AttributedSegment>,
{
    let mut groups: Vec<ChangesetGroup> = Vec::new();
    let mut by_changeset: HashMap<u64, usize> = HashMap::new();

    for attributed in segments {
        let i = *by_changeset.entry(attributed.cause.changeset()).or_insert_with(|| {
            groups.push(ChangesetGroup::new(&attributed.cause));
            groups.len() - 1
        });
        groups[i].push(attributed);
    }

    groups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.changeset.cmp(&a.changeset)));
    groups
}

//! Feature blame.
//!
//! Ties the pipeline together: reconstruct the history of every present-day
//! segment, attribute each one to a single revision, group the result by
//! changeset, attach changeset metadata and colour the users.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cause::attribute;
use crate::colour::ColourAssigner;
use crate::config::BlameConfig;
use crate::history::{HistoryAccess, HistoryError};
use crate::progress::{Aborted, BlameOptions, Progress};
use crate::reconstruct::{reconstruct, SegmentSet};
use crate::resolver::FeatureResolver;
use crate::sections::{group_by_changeset, AttributedSegment, ChangesetGroup};
use crate::topology::Topology;
use crate::types::{Changeset, ElementType, OsmFeatureBlame, Section, SectionUser};

/// Error type for blame operations.
#[derive(Debug, thiserror::Error)]
pub enum BlameError {
    /// The feature does not exist (or is deleted) now.
    #[error("{element_type}/{id} not found")]
    NotFound {
        /// Element type.
        element_type: ElementType,
        /// Element id.
        id: i64,
    },
    /// The feature exists but has no node positions to blame.
    #[error("{element_type}/{id} has no geometry")]
    NoGeometry {
        /// Element type.
        element_type: ElementType,
        /// Element id.
        id: i64,
    },
    /// Only ways and relations can be blamed.
    #[error("cannot blame a {0}")]
    UnsupportedType(ElementType),
    /// History backend error, kept as the backend reported it.
    #[error("History error: {0}")]
    History(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The abort signal fired.
    #[error("blame aborted")]
    Aborted,
}

impl BlameError {
    /// Wrap a backend error.
    pub fn from_history<E: HistoryError + 'static>(e: E) -> Self {
        Self::History(Box::new(e))
    }

    /// Whether this is a cancellation rather than a failure.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

impl From<Aborted> for BlameError {
    fn from(_: Aborted) -> Self {
        Self::Aborted
    }
}

/// Blames ways and relations against a history backend.
///
/// ## Algorithm
///
/// 1. Resolve the feature as it is now, publish its bounding box
/// 2. Walk back through the history, tracking for every present-day segment
///    the oldest snapshot it appears in
/// 3. Build the present-day topology (paths, roundabouts, groups)
/// 4. Attribute each segment to the newest revision of that oldest snapshot
/// 5. Stitch segments into per-changeset sections, newest first
/// 6. Fetch changeset metadata in one batch, assign user colours
///
/// Every call owns its cache; concurrent calls share nothing.
pub struct FeatureBlamer<H: HistoryAccess> {
    history: Arc<H>,
    config: BlameConfig,
}

impl<H: HistoryAccess> FeatureBlamer<H> {
    /// Create a blamer.
    pub fn new(history: Arc<H>, config: BlameConfig) -> Self {
        Self { history, config }
    }

    /// The configuration in use.
    pub fn config(&self) -> &BlameConfig {
        &self.config
    }

    /// Blame one way or relation.
    pub async fn blame(
        &self,
        element_type: ElementType,
        id: i64,
        options: BlameOptions,
    ) -> Result<OsmFeatureBlame, BlameError> {
        run(self.history.as_ref(), &self.config, element_type, id, options).await
    }
}

/// Blame one way or relation with the default configuration.
pub async fn blame_osm_feature<H: HistoryAccess>(
    history: &H,
    element_type: ElementType,
    id: i64,
    options: BlameOptions,
) -> Result<OsmFeatureBlame, BlameError> {
    run(history, &BlameConfig::default(), element_type, id, options).await
}

async fn run<H: HistoryAccess>(
    history: &H,
    config: &BlameConfig,
    element_type: ElementType,
    id: i64,
    options: BlameOptions,
) -> Result<OsmFeatureBlame, BlameError> {
    match pipeline(history, config, element_type, id, options).await {
        Err(BlameError::Aborted) => {
            tracing::debug!(%element_type, id, "blame aborted");
            Err(BlameError::Aborted)
        }
        Err(e) => {
            tracing::warn!(%element_type, id, error = %e, "blame failed");
            Err(e)
        }
        ok => ok,
    }
}

async fn pipeline<H: HistoryAccess>(
    history: &H,
    config: &BlameConfig,
    element_type: ElementType,
    id: i64,
    options: BlameOptions,
) -> Result<OsmFeatureBlame, BlameError> {
    let mut progress = Progress::new(options);
    progress.checkpoint()?;

    if element_type == ElementType::Node {
        return Err(BlameError::UnsupportedType(element_type));
    }

    let resolver = FeatureResolver::new(history, config.clone());
    progress.phase(0.0, 0.1);
    let reconstruction = reconstruct(&resolver, element_type, id, &mut progress).await?;

    progress.phase(0.95, 1.0);
    let topology = Topology::build(&reconstruction.segments.current_segments(), config);
    let groups = group_by_changeset(attributed_segments(&topology, &reconstruction.segments));
    progress.report(0.5)?;

    let ids: Vec<u64> = groups.iter().map(|g| g.changeset).collect();
    let changesets = history.list_changesets(&ids).await.map_err(BlameError::from_history)?;
    progress.checkpoint()?;

    let sections = into_sections(groups, changesets);
    progress.report(1.0)?;

    tracing::info!(
        %element_type,
        id,
        sections = sections.len(),
        iterations = reconstruction.iterations,
        cached = resolver.cache().fetched(),
        "blame finished"
    );

    Ok(OsmFeatureBlame {
        feature: reconstruction.feature,
        sections,
        bbox: reconstruction.bbox,
    })
}

/// Attribute every tracked segment, in topology order, point segments last.
fn attributed_segments(topology: &Topology, segments: &SegmentSet) -> Vec<AttributedSegment> {
    let mut out: Vec<AttributedSegment> = topology
        .ordered_segments()
        .filter_map(|segment| {
            segments
                .get(&segment.key())
                .map(|tracked| AttributedSegment::new(segment.clone(), attribute(tracked)))
        })
        .collect();
    out.extend(
        segments
            .iter()
            .filter(|tracked| tracked.current.is_point())
            .map(|tracked| AttributedSegment::new(tracked.current.clone(), attribute(tracked))),
    );
    out
}

/// Attach changeset metadata and user colours, keeping the group order.
fn into_sections(groups: Vec<ChangesetGroup>, changesets: Vec<Changeset>) -> Vec<Section> {
    let mut by_id: HashMap<u64, Changeset> = changesets.into_iter().map(|c| (c.id, c)).collect();
    let mut colours = ColourAssigner::new();

    groups
        .into_iter()
        .map(|group| {
            let changeset = by_id.remove(&group.changeset).unwrap_or_else(|| {
                tracing::warn!(changeset = group.changeset, "changeset metadata missing");
                Changeset::new(group.changeset, group.user.clone(), group.timestamp)
            });
            let name = if changeset.user.is_empty() { group.user } else { changeset.user.clone() };
            let colour = colours.colour_for(&name);
            Section {
                paths: group.paths,
                causing_changes: group.causing_changes,
                user: SectionUser { name, colour },
                changeset,
                timestamp: group.timestamp,
            }
        })
        .collect()
}

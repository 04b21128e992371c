//! Point-in-time feature resolution.
//!
//! Expands a way or relation, as of a given time, into a tree of member
//! versions. All history lookups go through a [`HistoryCache`] that lives
//! exactly as long as one blame run, so an element shared by many members is
//! fetched once.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::blame::BlameError;
use crate::config::BlameConfig;
use crate::history::{HistoryAccess, HistoryError};
use crate::progress::Progress;
use crate::types::{Element, ElementType, Feature, ResolvedMember, VersionStamp};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Versions of one element, ascending by version number.
type VersionList = Arc<Vec<Element>>;

/// Memoized history lookups of one blame run.
///
/// Keyed by (element type, id). Redacted versions are remembered too, so a
/// version is never probed twice.
#[derive(Debug, Default)]
pub struct HistoryCache {
    histories: Mutex<HashMap<(ElementType, i64), VersionList>>,
    redacted: Mutex<HashSet<(ElementType, i64, u32)>>,
}

impl HistoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of elements whose history has been fetched.
    pub fn fetched(&self) -> usize {
        self.histories.lock().len()
    }

    fn get(&self, element_type: ElementType, id: i64) -> Option<VersionList> {
        self.histories.lock().get(&(element_type, id)).cloned()
    }

    fn insert(&self, element_type: ElementType, id: i64, versions: Vec<Element>) -> VersionList {
        let versions = Arc::new(versions);
        self.histories.lock().insert((element_type, id), Arc::clone(&versions));
        versions
    }

    fn mark_redacted(&self, element_type: ElementType, id: i64, version: u32) {
        self.redacted.lock().insert((element_type, id, version));
    }

    fn is_redacted(&self, element_type: ElementType, id: i64, version: u32) -> bool {
        self.redacted.lock().contains(&(element_type, id, version))
    }
}

/// A feature resolved at one point in time.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The feature with all its members.
    pub feature: Feature,
    /// Versions of the feature itself strictly older than the selected one.
    pub previous_versions: Vec<VersionStamp>,
    /// Every element version that is part of the feature (root, members, nodes).
    pub all_members: Vec<VersionStamp>,
    /// Versions strictly older than the selected one, for every element encountered.
    pub all_previous_versions: Vec<VersionStamp>,
}

impl Resolution {
    /// Most recent timestamp among the feature and all its members.
    pub fn latest_timestamp(&self) -> DateTime<Utc> {
        self.all_members
            .iter()
            .map(|s| s.timestamp)
            .max()
            .unwrap_or_else(|| self.feature.info().timestamp)
    }
}

/// Accumulates per-resolution bookkeeping while the member tree is walked.
struct Walk<'p> {
    progress: Option<&'p mut Progress>,
    seen_versions: HashSet<(ElementType, i64, u32)>,
    seen_elements: HashSet<(ElementType, i64)>,
    all_members: Vec<VersionStamp>,
    all_previous_versions: Vec<VersionStamp>,
    root_previous_versions: Vec<VersionStamp>,
}

impl<'p> Walk<'p> {
    fn new(progress: Option<&'p mut Progress>) -> Self {
        Self {
            progress,
            seen_versions: HashSet::new(),
            seen_elements: HashSet::new(),
            all_members: Vec::new(),
            all_previous_versions: Vec::new(),
            root_previous_versions: Vec::new(),
        }
    }

    fn record_member(&mut self, stamp: VersionStamp) {
        if self.seen_versions.insert((stamp.element_type, stamp.id, stamp.version)) {
            self.all_members.push(stamp);
        }
    }

    fn report(&mut self, fraction: f64) -> Result<(), BlameError> {
        if let Some(progress) = self.progress.as_deref_mut() {
            progress.report(fraction)?;
        }
        Ok(())
    }
}

/// Resolves features against a [`HistoryAccess`] backend.
///
/// One resolver serves one blame run; its cache is dropped with it.
pub struct FeatureResolver<'h, H: HistoryAccess> {
    history: &'h H,
    cache: HistoryCache,
    config: BlameConfig,
}

impl<'h, H: HistoryAccess> FeatureResolver<'h, H> {
    /// Create a resolver with an empty cache.
    pub fn new(history: &'h H, config: BlameConfig) -> Self {
        Self { history, cache: HistoryCache::new(), config }
    }

    /// The cache of this run.
    pub fn cache(&self) -> &HistoryCache {
        &self.cache
    }

    /// Resolve a feature as of `as_of` (latest version if `None`).
    ///
    /// Returns `Ok(None)` if the feature did not exist (or was deleted) at
    /// that time. Progress is reported per member of the root, weighting
    /// ways by the configured assumed node count.
    pub async fn resolve(
        &self,
        element_type: ElementType,
        id: i64,
        as_of: Option<DateTime<Utc>>,
        progress: Option<&mut Progress>,
    ) -> Result<Option<Resolution>, BlameError> {
        let mut walk = Walk::new(progress);
        let feature = self.resolve_tree(element_type, id, as_of, Vec::new(), &mut walk).await?;
        Ok(feature.map(|feature| Resolution {
            feature,
            previous_versions: walk.root_previous_versions,
            all_members: walk.all_members,
            all_previous_versions: walk.all_previous_versions,
        }))
    }

    /// Newest accessible version strictly older than `version`.
    ///
    /// Answered from the memoized history, which already holds every
    /// accessible version. Returns `None` once every older version turned
    /// out to be inaccessible.
    pub async fn previous_version(
        &self,
        element_type: ElementType,
        id: i64,
        version: u32,
    ) -> Result<Option<Element>, BlameError> {
        let versions = self.versions(element_type, id).await?;
        Ok(versions.iter().rev().find(|e| e.info().version < version).cloned())
    }

    /// All known versions of an element, memoized.
    ///
    /// The history listing is completed by stepping down from the newest
    /// version to each previous one; version numbers missing from the listing
    /// are fetched individually and redacted ones are skipped.
    pub async fn versions(&self, element_type: ElementType, id: i64) -> Result<VersionList, BlameError> {
        if let Some(cached) = self.cache.get(element_type, id) {
            return Ok(cached);
        }

        let mut listed = self.history
            .get_feature_history(element_type, id)
            .await
            .map_err(BlameError::from_history)?;
        listed.sort_by_key(|e| e.info().version);
        listed.dedup_by_key(|e| e.info().version);

        let mut versions = Vec::with_capacity(listed.len());
        let mut next = listed.last().cloned();
        while let Some(element) = next {
            next = self.scan_below(&listed, element_type, id, element.info().version).await?;
            versions.push(element);
        }
        versions.reverse();

        Ok(self.cache.insert(element_type, id, versions))
    }

    /// Scan down from `version`, taking versions from `listed` where present
    /// and probing the gaps.
    async fn scan_below(
        &self,
        listed: &[Element],
        element_type: ElementType,
        id: i64,
        version: u32,
    ) -> Result<Option<Element>, BlameError> {
        for candidate in (1..version).rev() {
            if let Ok(i) = listed.binary_search_by_key(&candidate, |e| e.info().version) {
                return Ok(Some(listed[i].clone()));
            }
            if let Some(found) = self.probe_version(element_type, id, candidate).await? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    async fn probe_version(
        &self,
        element_type: ElementType,
        id: i64,
        version: u32,
    ) -> Result<Option<Element>, BlameError> {
        if self.cache.is_redacted(element_type, id, version) {
            return Ok(None);
        }
        match self.history.get_feature_at_version(element_type, id, version).await {
            Ok(element) => Ok(Some(element)),
            Err(e) if e.is_redacted() => {
                tracing::debug!(%element_type, id, version, "skipping redacted version");
                self.cache.mark_redacted(element_type, id, version);
                Ok(None)
            }
            Err(e) => Err(BlameError::from_history(e)),
        }
    }

    /// Select the version in effect at `as_of` and record previous versions.
    async fn select(
        &self,
        element_type: ElementType,
        id: i64,
        as_of: Option<DateTime<Utc>>,
        walk: &mut Walk<'_>,
    ) -> Result<Option<Element>, BlameError> {
        let versions = self.versions(element_type, id).await?;
        let selected = select_version(&versions, as_of);

        if walk.seen_elements.insert((element_type, id)) {
            let cutoff = selected.map(|e| e.info().timestamp);
            let older = versions
                .iter()
                .filter(|e| cutoff.is_some_and(|c| e.info().timestamp < c))
                .map(Element::stamp);
            if walk.seen_elements.len() == 1 {
                let older: Vec<_> = older.collect();
                walk.root_previous_versions.extend(older.iter().cloned());
                walk.all_previous_versions.extend(older);
            } else {
                walk.all_previous_versions.extend(older);
            }
        }

        Ok(selected.filter(|e| e.info().visible).cloned())
    }

    fn resolve_tree<'a>(
        &'a self,
        element_type: ElementType,
        id: i64,
        as_of: Option<DateTime<Utc>>,
        ancestors: Vec<i64>,
        walk: &'a mut Walk<'_>,
    ) -> BoxFuture<'a, Result<Option<Feature>, BlameError>> {
        Box::pin(async move {
            let is_root = ancestors.is_empty();
            let Some(element) = self.select(element_type, id, as_of, walk).await? else {
                return Ok(None);
            };
            walk.record_member(element.stamp());

            match element {
                Element::Node(node) => Ok(Some(Feature::Node(node))),
                Element::Way(way) => {
                    let total = way.nodes.len().max(1) as f64;
                    let mut nodes = Vec::with_capacity(way.nodes.len());
                    for (i, node_id) in way.nodes.iter().enumerate() {
                        match self.select(ElementType::Node, *node_id, as_of, walk).await? {
                            Some(Element::Node(node)) => {
                                walk.record_member(VersionStamp::new(ElementType::Node, &node.info));
                                nodes.push(node);
                            }
                            _ => tracing::trace!(way = id, node = node_id, "node missing at resolution time"),
                        }
                        if is_root {
                            walk.report((i + 1) as f64 / total)?;
                        }
                    }
                    Ok(Some(Feature::Way { way, nodes }))
                }
                Element::Relation(relation) => {
                    let mut branch = ancestors;
                    branch.push(id);
                    let weight = |t: ElementType| match t {
                        ElementType::Node => 1.0,
                        _ => self.config.assumed_way_node_count as f64,
                    };
                    let total: f64 = relation.members.iter().map(|m| weight(m.member_type)).sum::<f64>().max(1.0);
                    let mut done = 0.0;
                    let mut members = Vec::with_capacity(relation.members.len());

                    for member in &relation.members {
                        if member.member_type == ElementType::Relation && branch.contains(&member.reference) {
                            tracing::trace!(relation = id, member = member.reference, "skipping cyclic membership");
                        } else if branch.len() >= self.config.max_membership_depth {
                            tracing::warn!(
                                relation = id,
                                depth = branch.len(),
                                "membership depth limit reached, skipping member"
                            );
                        } else {
                            let resolved = self
                                .resolve_tree(member.member_type, member.reference, as_of, branch.clone(), walk)
                                .await?;
                            if let Some(feature) = resolved {
                                members.push(ResolvedMember { role: member.role.clone(), feature });
                            }
                        }
                        if is_root {
                            done += weight(member.member_type);
                            walk.report(done / total)?;
                        }
                    }
                    Ok(Some(Feature::Relation { relation, members }))
                }
            }
        })
    }
}

/// The latest version with a timestamp at or before `as_of` (any version if `None`).
pub fn select_version(versions: &[Element], as_of: Option<DateTime<Utc>>) -> Option<&Element> {
    versions
        .iter()
        .filter(|e| as_of.map_or(true, |t| e.info().timestamp <= t))
        .max_by_key(|e| (e.info().timestamp, e.info().version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::InMemoryHistory;
    use crate::types::{ElementInfo, Member, Node, Relation, Way};
    use chrono::{Duration, TimeZone};

    fn at(day: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap() + Duration::days(day)
    }

    fn info(id: i64, version: u32, day: i64) -> ElementInfo {
        ElementInfo::new(id, version, at(day), day as u64 + 1, "alice")
    }

    fn node(id: i64, version: u32, day: i64, lon: f64) -> Node {
        Node::new(info(id, version, day), 0.0, lon)
    }

    fn road_history() -> InMemoryHistory {
        let mut h = InMemoryHistory::new();
        h.add_node(node(1, 1, 0, 0.000));
        h.add_node(node(2, 1, 0, 0.001));
        h.add_node(node(3, 1, 0, 0.002));
        h.add_node(node(2, 2, 5, 0.0015));
        h.add_way(Way::new(info(10, 1, 1), vec![1, 2]));
        h.add_way(Way::new(info(10, 2, 3), vec![1, 2, 3]));
        h
    }

    #[tokio::test]
    async fn test_resolve_latest() {
        let history = road_history();
        let resolver = FeatureResolver::new(&history, BlameConfig::default());

        let resolution = resolver.resolve(ElementType::Way, 10, None, None).await.unwrap().unwrap();
        let Feature::Way { way, nodes } = &resolution.feature else { panic!("expected way") };
        assert_eq!(way.info.version, 2);
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[1].info.version, 2);
        assert_eq!(resolution.latest_timestamp(), at(5));

        // way v1 and node 2 v1
        assert_eq!(resolution.previous_versions.len(), 1);
        assert_eq!(resolution.all_previous_versions.len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_as_of() {
        let history = road_history();
        let resolver = FeatureResolver::new(&history, BlameConfig::default());

        let resolution = resolver.resolve(ElementType::Way, 10, Some(at(2)), None).await.unwrap().unwrap();
        let Feature::Way { way, nodes } = &resolution.feature else { panic!("expected way") };
        assert_eq!(way.info.version, 1);
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].info.version, 1);

        // nothing predates the versions in effect on day 2
        assert!(resolution.previous_versions.is_empty());
        assert!(resolution.all_previous_versions.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_before_creation() {
        let history = road_history();
        let resolver = FeatureResolver::new(&history, BlameConfig::default());
        let resolution = resolver.resolve(ElementType::Way, 10, Some(at(0)), None).await.unwrap();
        assert!(resolution.is_none());
    }

    #[tokio::test]
    async fn test_deleted_version_is_absent() {
        let mut history = road_history();
        history.add_way(Way::new(info(10, 3, 7).deleted(), vec![]));
        let resolver = FeatureResolver::new(&history, BlameConfig::default());
        assert!(resolver.resolve(ElementType::Way, 10, None, None).await.unwrap().is_none());
        assert!(resolver.resolve(ElementType::Way, 10, Some(at(6)), None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_history_is_memoized() {
        let mut history = road_history();
        history.add_relation(Relation::new(
            info(100, 1, 4),
            vec![
                Member::new(ElementType::Way, 10, "forward"),
                Member::new(ElementType::Way, 10, "backward"),
            ],
        ));
        let resolver = FeatureResolver::new(&history, BlameConfig::default());
        let resolution = resolver.resolve(ElementType::Relation, 100, None, None).await.unwrap().unwrap();

        // relation + way + 3 nodes, way fetched once
        assert_eq!(resolver.cache().fetched(), 5);
        let Feature::Relation { members, .. } = &resolution.feature else { panic!("expected relation") };
        assert_eq!(members.len(), 2);
        assert_eq!(members[1].role, "backward");
    }

    #[tokio::test]
    async fn test_cyclic_relations_terminate() {
        let mut history = road_history();
        history.add_relation(Relation::new(
            info(100, 1, 4),
            vec![Member::new(ElementType::Relation, 101, ""), Member::new(ElementType::Way, 10, "")],
        ));
        history.add_relation(Relation::new(info(101, 1, 4), vec![Member::new(ElementType::Relation, 100, "")]));

        let resolver = FeatureResolver::new(&history, BlameConfig::default());
        let resolution = resolver.resolve(ElementType::Relation, 100, None, None).await.unwrap().unwrap();
        let Feature::Relation { members, .. } = &resolution.feature else { panic!("expected relation") };
        let Feature::Relation { members: inner, .. } = &members[0].feature else { panic!("expected relation") };
        assert!(inner.is_empty());
    }

    #[tokio::test]
    async fn test_diamond_membership_is_expanded_twice() {
        let mut history = road_history();
        history.add_relation(Relation::new(info(200, 1, 4), vec![Member::new(ElementType::Way, 10, "")]));
        history.add_relation(Relation::new(info(201, 1, 4), vec![Member::new(ElementType::Relation, 200, "")]));
        history.add_relation(Relation::new(info(202, 1, 4), vec![Member::new(ElementType::Relation, 200, "")]));
        history.add_relation(Relation::new(
            info(100, 1, 4),
            vec![Member::new(ElementType::Relation, 201, ""), Member::new(ElementType::Relation, 202, "")],
        ));

        let resolver = FeatureResolver::new(&history, BlameConfig::default());
        let resolution = resolver.resolve(ElementType::Relation, 100, None, None).await.unwrap().unwrap();
        // both branches reach the way
        assert_eq!(resolution.feature.all_nodes().len(), 6);
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let mut history = road_history();
        history.add_relation(Relation::new(info(102, 1, 4), vec![Member::new(ElementType::Way, 10, "")]));
        history.add_relation(Relation::new(info(101, 1, 4), vec![Member::new(ElementType::Relation, 102, "")]));
        history.add_relation(Relation::new(info(100, 1, 4), vec![Member::new(ElementType::Relation, 101, "")]));

        let resolver = FeatureResolver::new(&history, BlameConfig::new(50, 1000.0, 2));
        let resolution = resolver.resolve(ElementType::Relation, 100, None, None).await.unwrap().unwrap();
        assert!(resolution.feature.all_nodes().is_empty());
    }

    #[tokio::test]
    async fn test_previous_version_skips_redacted() {
        let mut history = road_history();
        history.add_way(Way::new(info(10, 3, 6), vec![1, 3]));
        history.redact(ElementType::Way, 10, 2);

        let resolver = FeatureResolver::new(&history, BlameConfig::default());
        let previous = resolver.previous_version(ElementType::Way, 10, 3).await.unwrap().unwrap();
        assert_eq!(previous.info().version, 1);

        history.redact(ElementType::Way, 10, 1);
        let resolver = FeatureResolver::new(&history, BlameConfig::default());
        assert!(resolver.previous_version(ElementType::Way, 10, 3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unlisted_versions_are_recovered() {
        // listing drops v2, but the version endpoint still serves it
        struct Unlisted(InMemoryHistory);

        #[async_trait::async_trait]
        impl HistoryAccess for Unlisted {
            type Error = <InMemoryHistory as HistoryAccess>::Error;

            async fn get_feature_history(&self, t: ElementType, id: i64) -> Result<Vec<Element>, Self::Error> {
                let mut listed = self.0.get_feature_history(t, id).await?;
                listed.retain(|e| e.info().version != 2);
                Ok(listed)
            }
            async fn get_feature_at_version(&self, t: ElementType, id: i64, v: u32) -> Result<Element, Self::Error> {
                self.0.get_feature_at_version(t, id, v).await
            }
            async fn get_feature(&self, t: ElementType, id: i64, r: bool) -> Result<Vec<Element>, Self::Error> {
                self.0.get_feature(t, id, r).await
            }
            async fn get_ways_for_node(&self, node_id: i64) -> Result<Vec<Way>, Self::Error> {
                self.0.get_ways_for_node(node_id).await
            }
            async fn get_changeset(&self, id: u64) -> Result<crate::types::Changeset, Self::Error> {
                self.0.get_changeset(id).await
            }
            async fn list_changesets(&self, ids: &[u64]) -> Result<Vec<crate::types::Changeset>, Self::Error> {
                self.0.list_changesets(ids).await
            }
        }

        let mut history = road_history();
        history.add_way(Way::new(info(10, 3, 6), vec![1, 3]));
        let history = Unlisted(history);
        let resolver = FeatureResolver::new(&history, BlameConfig::default());

        let versions = resolver.versions(ElementType::Way, 10).await.unwrap();
        let numbers: Vec<u32> = versions.iter().map(|e| e.info().version).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        let previous = resolver.previous_version(ElementType::Way, 10, 3).await.unwrap().unwrap();
        assert_eq!(previous.info().version, 2);
    }

    #[test]
    fn test_select_version_prefers_latest_before_cutoff() {
        let versions = vec![
            Element::Node(node(1, 1, 0, 0.0)),
            Element::Node(node(1, 2, 2, 0.0)),
            Element::Node(node(1, 3, 4, 0.0)),
        ];
        assert_eq!(select_version(&versions, Some(at(3))).unwrap().info().version, 2);
        assert_eq!(select_version(&versions, None).unwrap().info().version, 3);
        assert!(select_version(&versions, Some(at(-1))).is_none());
    }
}

//! In-memory history for testing.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;

use crate::types::{Changeset, Element, ElementType, Node, Relation, Way};
use super::{HistoryAccess, HistoryError};

/// Error type for the in-memory history.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InMemoryHistoryError {
    /// Element (or the requested version) does not exist.
    #[error("{element_type}/{id} not found")]
    NotFound {
        /// Element type.
        element_type: ElementType,
        /// Element id.
        id: i64,
    },
    /// The requested version has been redacted.
    #[error("{element_type}/{id} v{version} is redacted")]
    Redacted {
        /// Element type.
        element_type: ElementType,
        /// Element id.
        id: i64,
        /// Redacted version.
        version: u32,
    },
    /// Changeset does not exist.
    #[error("changeset {0} not found")]
    ChangesetNotFound(u64),
}

impl HistoryError for InMemoryHistoryError {
    fn is_redacted(&self) -> bool {
        matches!(self, Self::Redacted { .. })
    }
}

type ElementKey = (ElementType, i64);

/// In-memory history for testing.
///
/// Uses BTreeMap/BTreeSet for deterministic iteration order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHistory {
    /// Versions by element, keyed by version number.
    versions: BTreeMap<ElementKey, BTreeMap<u32, Element>>,
    /// Versions that are inaccessible.
    redacted: BTreeSet<(ElementType, i64, u32)>,
    /// Changesets by id.
    changesets: BTreeMap<u64, Changeset>,
}

impl InMemoryHistory {
    /// Create a new empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element version.
    pub fn add(&mut self, element: Element) {
        let info = element.info();
        let key = (element.element_type(), info.id);
        let version = info.version;
        self.versions.entry(key).or_default().insert(version, element);
    }

    /// Add a node version.
    pub fn add_node(&mut self, node: Node) {
        self.add(Element::Node(node));
    }

    /// Add a way version.
    pub fn add_way(&mut self, way: Way) {
        self.add(Element::Way(way));
    }

    /// Add a relation version.
    pub fn add_relation(&mut self, relation: Relation) {
        self.add(Element::Relation(relation));
    }

    /// Add a changeset.
    pub fn add_changeset(&mut self, changeset: Changeset) {
        self.changesets.insert(changeset.id, changeset);
    }

    /// Make a version inaccessible: it disappears from history listings and
    /// direct lookups fail with [`InMemoryHistoryError::Redacted`].
    pub fn redact(&mut self, element_type: ElementType, id: i64, version: u32) {
        self.redacted.insert((element_type, id, version));
    }

    fn is_redacted(&self, element_type: ElementType, id: i64, version: u32) -> bool {
        self.redacted.contains(&(element_type, id, version))
    }

    fn current(&self, element_type: ElementType, id: i64) -> Result<&Element, InMemoryHistoryError> {
        self.versions
            .get(&(element_type, id))
            .and_then(|v| v.values().next_back())
            .filter(|e| e.info().visible)
            .ok_or(InMemoryHistoryError::NotFound { element_type, id })
    }

    fn collect_recursive(&self, element: &Element, seen: &mut BTreeSet<ElementKey>, out: &mut Vec<Element>) {
        if !seen.insert((element.element_type(), element.info().id)) {
            return;
        }
        out.push(element.clone());
        let children: Vec<ElementKey> = match element {
            Element::Node(_) => Vec::new(),
            Element::Way(w) => w.nodes.iter().map(|id| (ElementType::Node, *id)).collect(),
            Element::Relation(r) => r.members.iter().map(|m| (m.member_type, m.reference)).collect(),
        };
        for (element_type, id) in children {
            if let Ok(child) = self.current(element_type, id) {
                self.collect_recursive(child, seen, out);
            }
        }
    }
}

#[async_trait]
impl HistoryAccess for InMemoryHistory {
    type Error = InMemoryHistoryError;

    async fn get_feature_history(&self, element_type: ElementType, id: i64) -> Result<Vec<Element>, Self::Error> {
        let versions = self.versions
            .get(&(element_type, id))
            .ok_or(InMemoryHistoryError::NotFound { element_type, id })?;
        Ok(versions
            .iter()
            .filter(|(v, _)| !self.is_redacted(element_type, id, **v))
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn get_feature_at_version(&self, element_type: ElementType, id: i64, version: u32) -> Result<Element, Self::Error> {
        if self.is_redacted(element_type, id, version) {
            return Err(InMemoryHistoryError::Redacted { element_type, id, version });
        }
        self.versions
            .get(&(element_type, id))
            .and_then(|v| v.get(&version))
            .cloned()
            .ok_or(InMemoryHistoryError::NotFound { element_type, id })
    }

    async fn get_feature(&self, element_type: ElementType, id: i64, recursive: bool) -> Result<Vec<Element>, Self::Error> {
        let root = self.current(element_type, id)?;
        if !recursive {
            return Ok(vec![root.clone()]);
        }
        let mut out = Vec::new();
        self.collect_recursive(root, &mut BTreeSet::new(), &mut out);
        Ok(out)
    }

    async fn get_ways_for_node(&self, node_id: i64) -> Result<Vec<Way>, Self::Error> {
        Ok(self.versions
            .iter()
            .filter(|((t, _), _)| *t == ElementType::Way)
            .filter_map(|(_, v)| v.values().next_back())
            .filter_map(|e| match e {
                Element::Way(w) if w.info.visible && w.nodes.contains(&node_id) => Some(w.clone()),
                _ => None,
            })
            .collect())
    }

    async fn get_changeset(&self, id: u64) -> Result<Changeset, Self::Error> {
        self.changesets
            .get(&id)
            .cloned()
            .ok_or(InMemoryHistoryError::ChangesetNotFound(id))
    }

    async fn list_changesets(&self, ids: &[u64]) -> Result<Vec<Changeset>, Self::Error> {
        ids.iter()
            .map(|id| self.changesets.get(id).cloned().ok_or(InMemoryHistoryError::ChangesetNotFound(*id)))
            .collect()
    }
}

//! Changeset metadata.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A batch of edits uploaded by one user in one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Changeset {
    /// Changeset id.
    pub id: u64,
    /// Display name of the author.
    pub user: String,
    /// When the changeset was opened.
    pub created_at: DateTime<Utc>,
    /// When the changeset was closed, if it is closed.
    pub closed_at: Option<DateTime<Utc>>,
    /// Changeset tags (`comment`, `source`, `created_by`, ...).
    pub tags: BTreeMap<String, String>,
}

impl Changeset {
    /// Create an open changeset without tags.
    pub fn new(id: u64, user: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            user: user.into(),
            created_at,
            closed_at: None,
            tags: BTreeMap::new(),
        }
    }

    /// Add a tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// The `comment` tag, if any.
    pub fn comment(&self) -> Option<&str> {
        self.tags.get("comment").map(String::as_str)
    }
}

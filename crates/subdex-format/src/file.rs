//! The serialized index shape and the reconciled in-memory snapshot.
//!
//! [`IndexFile`] is what goes to disk: an ordered `subdirs` array and an
//! optional comment. [`IndexSnapshot`] is what the store holds: a
//! `BTreeMap` keyed by id, which is where id uniqueness is enforced. A
//! snapshot is never mutated in place; every change produces a new one so
//! it can be published behind an `Arc` and swapped in a single assignment.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::subdir::Subdir;

/// On-disk representation of the index.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IndexFile {
    /// Entries in the order they are written.
    pub subdirs: Vec<Subdir>,
    /// Free-text comment, omitted from the file when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Reconciled state of the index: entries keyed by id, plus the comment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexSnapshot {
    subdirs: BTreeMap<String, Subdir>,
    comment: Option<String>,
}

impl IndexSnapshot {
    /// An empty snapshot carrying the given comment.
    pub fn empty(comment: Option<String>) -> Self {
        Self {
            subdirs: BTreeMap::new(),
            comment,
        }
    }

    /// Build a snapshot from entries. When ids repeat, the later entry wins.
    pub fn from_entries(entries: impl IntoIterator<Item = Subdir>, comment: Option<String>) -> Self {
        let subdirs = entries
            .into_iter()
            .map(|subdir| (subdir.id.clone(), subdir))
            .collect();
        Self { subdirs, comment }
    }

    /// All entries, keyed by id.
    pub fn subdirs(&self) -> &BTreeMap<String, Subdir> {
        &self.subdirs
    }

    /// The free-text comment, if any.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Get an entry by id.
    pub fn get(&self, id: &str) -> Option<&Subdir> {
        self.subdirs.get(id)
    }

    /// Returns `true` if an entry with this id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.subdirs.contains_key(id)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.subdirs.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.subdirs.is_empty()
    }

    /// Entry ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.subdirs.keys().map(String::as_str)
    }

    /// A copy with every entry removed and the comment kept.
    pub fn cleared(&self) -> Self {
        Self::empty(self.comment.clone())
    }

    /// A copy with `entry` inserted, or `None` if its id is already taken.
    pub fn with_entry(&self, entry: Subdir) -> Option<Self> {
        if self.contains(&entry.id) {
            return None;
        }
        let mut next = self.clone();
        next.subdirs.insert(entry.id.clone(), entry);
        Some(next)
    }

    /// A copy without the entry `id`, or `None` if there is no such entry.
    pub fn without(&self, id: &str) -> Option<Self> {
        if !self.contains(id) {
            return None;
        }
        let mut next = self.clone();
        next.subdirs.remove(id);
        Some(next)
    }

    /// The file representation of this snapshot.
    pub fn to_file(&self) -> IndexFile {
        IndexFile {
            subdirs: self.subdirs.values().cloned().collect(),
            comment: self.comment.clone(),
        }
    }
}

impl From<IndexFile> for IndexSnapshot {
    fn from(file: IndexFile) -> Self {
        Self::from_entries(file.subdirs, file.comment)
    }
}

//! Write orders and how each one changes a snapshot.

use subdex_format::{IndexSnapshot, Subdir};

/// A mutation request for the index file.
///
/// Payloads are mandatory, so an add or delete without an entry cannot be
/// expressed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteOrder {
    /// Replace the file with an empty entry set, keeping the comment.
    Reset,
    /// Remove the entry with this entry's id, if present.
    DeleteEntry(Subdir),
    /// Insert this entry, unless its id is already present.
    AddEntry(Subdir),
}

/// Why an order produced no write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Skipped {
    /// Tried to add an id that already exists.
    AlreadyPresent(String),
    /// Tried to delete an id that does not exist.
    NotPresent(String),
}

impl std::fmt::Display for Skipped {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyPresent(id) => write!(f, "subdir {id} already exists"),
            Self::NotPresent(id) => write!(f, "subdir {id} does not exist"),
        }
    }
}

impl WriteOrder {
    /// Order a reset.
    pub fn reset() -> Self {
        Self::Reset
    }

    /// Order an entry to be added.
    pub fn add(entry: Subdir) -> Self {
        Self::AddEntry(entry)
    }

    /// Order an entry to be deleted.
    pub fn delete(entry: Subdir) -> Self {
        Self::DeleteEntry(entry)
    }

    /// The entry this order carries, if any.
    pub fn subdir(&self) -> Option<&Subdir> {
        match self {
            Self::Reset => None,
            Self::DeleteEntry(entry) | Self::AddEntry(entry) => Some(entry),
        }
    }

    /// Compute the snapshot this order produces from `current`.
    ///
    /// Adds of an existing id and deletes of a missing id are no-ops and
    /// return [`Skipped`]; nothing should be written for them.
    pub fn apply(&self, current: &IndexSnapshot) -> Result<IndexSnapshot, Skipped> {
        match self {
            Self::Reset => Ok(current.cleared()),
            Self::DeleteEntry(entry) => current
                .without(&entry.id)
                .ok_or_else(|| Skipped::NotPresent(entry.id.clone())),
            Self::AddEntry(entry) => current
                .with_entry(entry.clone())
                .ok_or_else(|| Skipped::AlreadyPresent(entry.id.clone())),
        }
    }
}

impl std::fmt::Display for WriteOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reset => write!(f, "reset"),
            Self::DeleteEntry(entry) => write!(f, "delete {}", entry.id),
            Self::AddEntry(entry) => write!(f, "add {}", entry.id),
        }
    }
}

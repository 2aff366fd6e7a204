use std::io;
use std::path::PathBuf;

/// Errors produced by the index store.
///
/// Structural problems with the file content never show up here: they are
/// healed by a reset. What remains are faults the store cannot fix itself.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading the index failed for a reason other than the file being absent.
    #[error("failed to read index file {location}: {source}")]
    Read {
        location: String,
        #[source]
        source: io::Error,
    },

    /// Other I/O error (creating directories, loading configuration).
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The file watcher could not be installed.
    #[error("file watch error: {0}")]
    Watch(#[from] notify::Error),

    /// The index path has no file name component.
    #[error("invalid index path: {0}")]
    InvalidPath(PathBuf),

    /// The configuration could not be parsed or is out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Pending writes and reconciliation did not converge.
    #[error("index did not settle after {attempts} attempts")]
    Unsettled { attempts: usize },
}

/// Convenience alias used throughout the store crate.
pub type StoreResult<T> = Result<T, StoreError>;

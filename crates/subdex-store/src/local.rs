//! On-disk backing file.
//!
//! Writes go to a temporary file in the same directory, which is then
//! renamed over the index. The watch is installed on the parent directory
//! rather than the file itself: an atomic rename replaces the file's inode,
//! and a watch on the old inode would go quiet after the first write.

use std::ffi::{OsStr, OsString};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tempfile::NamedTempFile;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::backing::{BackingFile, ChangeEvent, FileWatch, Subscription};
use crate::error::{StoreError, StoreResult};

/// The index as a file on the local filesystem.
#[derive(Clone, Debug)]
pub struct LocalFile {
    path: PathBuf,
    sync_on_write: bool,
}

impl LocalFile {
    /// Back the index with the file at `path`. Writes are synced by default.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sync_on_write: true,
        }
    }

    /// Choose whether to `fsync` before renaming a write into place.
    pub fn with_sync(mut self, sync_on_write: bool) -> Self {
        self.sync_on_write = sync_on_write;
        self
    }

    /// Path of the index file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> &Path {
        parent_dir(&self.path)
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn replace_blocking(path: &Path, bytes: &[u8], sync_on_write: bool) -> io::Result<()> {
    let dir = parent_dir(path);
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    if sync_on_write {
        tmp.as_file().sync_all()?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl BackingFile for LocalFile {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    async fn read_all(&self) -> io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }

    async fn replace_all(&self, bytes: &[u8]) -> io::Result<()> {
        let path = self.path.clone();
        let bytes = bytes.to_vec();
        let sync_on_write = self.sync_on_write;
        tokio::task::spawn_blocking(move || replace_blocking(&path, &bytes, sync_on_write))
            .await
            .map_err(io::Error::other)??;
        debug!(path = %self.path.display(), "index file replaced");
        Ok(())
    }
}

/// Map a raw watcher event to a change of the file named `name`.
fn classify(event: &Event, name: &OsStr) -> Option<ChangeEvent> {
    if !event.paths.iter().any(|p| p.file_name() == Some(name)) {
        return None;
    }
    match event.kind {
        EventKind::Create(_) => Some(ChangeEvent::Created),
        EventKind::Modify(_) => Some(ChangeEvent::Modified),
        EventKind::Remove(_) => Some(ChangeEvent::Removed),
        _ => None,
    }
}

impl FileWatch for LocalFile {
    fn subscribe(&self) -> StoreResult<Subscription> {
        let name: OsString = self
            .path
            .file_name()
            .ok_or_else(|| StoreError::InvalidPath(self.path.clone()))?
            .to_os_string();
        let dir = self.parent_dir().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if let Some(change) = classify(&event, &name) {
                        let _ = tx.send(change);
                    }
                }
                Err(e) => warn!(error = %e, "file watch error"),
            },
            notify::Config::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        debug!(dir = %dir.display(), "watching index directory");
        Ok(Subscription::new(rx, watcher))
    }
}

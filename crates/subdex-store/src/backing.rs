//! Collaborator interfaces: the backing file and its change watch.
//!
//! The store never touches the filesystem directly. It reads and replaces
//! the index through a [`BackingFile`] and learns about changes through a
//! [`FileWatch`] subscription. Any backend (disk, memory) implements both.

use std::any::Any;
use std::io;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::StoreResult;

/// Whole-file access to the index.
///
/// Implementations must make `replace_all` atomic: a concurrent reader sees
/// either the previous content or the new content, never a mix.
#[async_trait]
pub trait BackingFile: Send + Sync {
    /// Human-readable location, used in log messages.
    fn location(&self) -> String;

    /// Read the full content.
    ///
    /// An absent file is reported as an error of kind
    /// [`io::ErrorKind::NotFound`].
    async fn read_all(&self) -> io::Result<Vec<u8>>;

    /// Replace the full content with `bytes`.
    async fn replace_all(&self, bytes: &[u8]) -> io::Result<()>;
}

/// Source of change notifications for one file.
pub trait FileWatch: Send + Sync {
    /// Start watching. Events flow until the subscription is torn down.
    fn subscribe(&self) -> StoreResult<Subscription>;
}

/// What happened to the watched file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeEvent {
    /// Synthesized once when the store starts, to force the first read.
    Started,
    /// Synthesized by an explicit refresh.
    Requested,
    /// The file was created.
    Created,
    /// The file content or metadata changed, or it was renamed into place.
    Modified,
    /// The file was removed.
    Removed,
}

impl std::fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Started => "started",
            Self::Requested => "requested",
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Removed => "removed",
        };
        write!(f, "{s}")
    }
}

/// An owned, active watch on a file.
///
/// Holds the event receiver and whatever keeps the underlying watch alive
/// (an OS watcher handle, for example). Call [`unsubscribe`] to tear it down
/// explicitly; dropping the subscription has the same effect.
///
/// [`unsubscribe`]: Subscription::unsubscribe
pub struct Subscription {
    events: mpsc::UnboundedReceiver<ChangeEvent>,
    guard: Option<Box<dyn Any + Send>>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.guard.is_some())
            .finish()
    }
}

impl Subscription {
    /// Wrap a receiver together with the handle that keeps it fed.
    pub fn new(events: mpsc::UnboundedReceiver<ChangeEvent>, guard: impl Any + Send) -> Self {
        Self {
            events,
            guard: Some(Box::new(guard)),
        }
    }

    /// Wait for the next change. Returns `None` once the watch has ended.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    /// Stop watching and release the underlying watch.
    pub fn unsubscribe(mut self) {
        self.events.close();
        self.guard.take();
    }
}

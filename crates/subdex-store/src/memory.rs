//! In-memory backing file for tests and ephemeral use.
//!
//! [`MemoryFile`] keeps the index bytes in a `Mutex` and implements both
//! [`BackingFile`] and [`FileWatch`]: every replace notifies subscribers the
//! way an OS watcher would. It can also simulate another process editing or
//! deleting the file, inject read and write failures, and slow I/O down.

use std::io;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::backing::{BackingFile, ChangeEvent, FileWatch, Subscription};
use crate::error::StoreResult;

#[derive(Default)]
struct MemoryInner {
    contents: Option<Vec<u8>>,
    read_failure: Option<io::ErrorKind>,
    write_failure: Option<io::ErrorKind>,
    latency: Option<Duration>,
    writes: usize,
    subscribers: Vec<mpsc::UnboundedSender<ChangeEvent>>,
}

impl MemoryInner {
    /// Deliver `event` to every live subscriber, pruning closed ones.
    fn notify(&mut self, event: ChangeEvent) {
        self.subscribers.retain(|tx| tx.send(event).is_ok());
    }

    fn store(&mut self, bytes: Vec<u8>) {
        let event = if self.contents.is_some() {
            ChangeEvent::Modified
        } else {
            ChangeEvent::Created
        };
        self.contents = Some(bytes);
        self.notify(event);
    }
}

/// An index file held in memory.
#[derive(Default)]
pub struct MemoryFile {
    inner: Mutex<MemoryInner>,
}

impl std::fmt::Debug for MemoryFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("MemoryFile")
            .field("len", &inner.contents.as_ref().map(Vec::len))
            .field("writes", &inner.writes)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

impl MemoryFile {
    /// A file that does not exist yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// A file that already holds `bytes`.
    pub fn with_contents(bytes: impl Into<Vec<u8>>) -> Self {
        let file = Self::default();
        file.lock().contents = Some(bytes.into());
        file
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().expect("memory file lock poisoned")
    }

    /// Current content, or `None` if the file does not exist.
    pub fn contents(&self) -> Option<Vec<u8>> {
        self.lock().contents.clone()
    }

    /// Number of successful `replace_all` calls.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    /// Number of subscriptions still listening.
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.lock();
        inner.subscribers.retain(|tx| !tx.is_closed());
        inner.subscribers.len()
    }

    /// Overwrite the content as another process would. Not counted as a write.
    pub fn write_external(&self, bytes: impl Into<Vec<u8>>) {
        self.lock().store(bytes.into());
    }

    /// Delete the file as another process would.
    pub fn remove(&self) {
        let mut inner = self.lock();
        inner.contents = None;
        inner.notify(ChangeEvent::Removed);
    }

    /// Make every read fail with `kind` until [`heal`](Self::heal).
    pub fn fail_reads(&self, kind: io::ErrorKind) {
        self.lock().read_failure = Some(kind);
    }

    /// Make every write fail with `kind` until [`heal`](Self::heal).
    pub fn fail_writes(&self, kind: io::ErrorKind) {
        self.lock().write_failure = Some(kind);
    }

    /// Clear injected failures.
    pub fn heal(&self) {
        let mut inner = self.lock();
        inner.read_failure = None;
        inner.write_failure = None;
    }

    /// Delay every read and write by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = Some(latency);
    }

    async fn pause(&self) {
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl BackingFile for MemoryFile {
    fn location(&self) -> String {
        "memory".to_string()
    }

    async fn read_all(&self) -> io::Result<Vec<u8>> {
        self.pause().await;
        let inner = self.lock();
        if let Some(kind) = inner.read_failure {
            return Err(io::Error::new(kind, "injected read failure"));
        }
        inner
            .contents
            .clone()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "memory file does not exist"))
    }

    async fn replace_all(&self, bytes: &[u8]) -> io::Result<()> {
        self.pause().await;
        let mut inner = self.lock();
        if let Some(kind) = inner.write_failure {
            return Err(io::Error::new(kind, "injected write failure"));
        }
        inner.writes += 1;
        inner.store(bytes.to_vec());
        Ok(())
    }
}

impl FileWatch for MemoryFile {
    fn subscribe(&self) -> StoreResult<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().subscribers.push(tx);
        Ok(Subscription::new(rx, ()))
    }
}

//! The reconciling reader.
//!
//! [`IndexStore`] watches the backing file and, on every change, re-reads
//! it in full and replaces its snapshot. At most one reconciliation runs at
//! a time; a notification that arrives while one is in progress is dropped,
//! since the next real change will re-read the whole file anyway.
//!
//! Content problems never escape: an absent, undecodable, unparsable or
//! misshapen file is answered with a [`WriteOrder::Reset`], whose write in
//! turn triggers the next reconciliation. Only a read failure other than
//! "not found" is returned to the caller.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use subdex_format::{codec, FormatError, IndexSnapshot, Subdir};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info, warn};

use crate::backing::{BackingFile, ChangeEvent, FileWatch, Subscription};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::local::LocalFile;
use crate::order::WriteOrder;
use crate::queue::WriteQueue;
use crate::state::{BusyFlag, SnapshotCell, StateView};

/// How many reconcile rounds [`IndexStore::settle`] tries before giving up.
const SETTLE_ATTEMPTS: usize = 16;

/// Pause between settle rounds when another reconciliation holds the store.
const SETTLE_BACKOFF: Duration = Duration::from_millis(5);

/// Notification published to store subscribers.
///
/// Events carry no state. Read the store after receiving one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreEvent {
    /// The snapshot was replaced.
    SubdirsChanged,
    /// A watch-triggered read failed in a way the store cannot heal.
    Faulted(String),
}

/// Why a reconciliation asked for a reset.
#[derive(Debug)]
pub enum ResetCause {
    /// The file does not exist.
    Missing,
    /// The file exists but its content is not a valid index.
    Malformed(FormatError),
}

impl std::fmt::Display for ResetCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "index file not found"),
            Self::Malformed(e) => write!(f, "{e}"),
        }
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug)]
pub enum Reconciliation {
    /// The snapshot now reflects the file.
    Updated,
    /// Another reconciliation was in progress; this one was dropped.
    Busy,
    /// The file could not be used; a reset was ordered.
    ResetRequested(ResetCause),
}

struct StoreInner {
    file: Arc<dyn BackingFile>,
    state: Arc<SnapshotCell>,
    writer: WriteQueue,
    busy: BusyFlag,
    events: broadcast::Sender<StoreEvent>,
}

/// Watched, self-healing view of the index file.
///
/// Dropping the store (or calling [`close`](Self::close)) tears down the
/// file watch.
pub struct IndexStore {
    inner: Arc<StoreInner>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl std::fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore")
            .field("file", &self.inner.file.location())
            .field("subdirs", &self.len())
            .field("writer", &self.inner.writer)
            .finish()
    }
}

impl IndexStore {
    /// Open a store over `file` and start watching it.
    ///
    /// The snapshot starts empty; call [`start`](Self::start) to read the
    /// file for the first time. Must be called within a tokio runtime.
    pub fn open<F>(file: Arc<F>, config: &StoreConfig) -> StoreResult<Self>
    where
        F: BackingFile + FileWatch + 'static,
    {
        config.validate()?;
        let subscription = file.subscribe()?;
        let file: Arc<dyn BackingFile> = file;
        info!(index = %file.location(), "index store opened");

        let state = Arc::new(SnapshotCell::default());
        let writer = WriteQueue::new(
            Arc::clone(&file),
            StateView::new(Arc::clone(&state)),
            config.pretty,
        );
        let (events, _) = broadcast::channel(config.event_capacity);

        let inner = Arc::new(StoreInner {
            file,
            state,
            writer,
            busy: BusyFlag::default(),
            events,
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(listen(Arc::clone(&inner), subscription, shutdown_rx));

        Ok(Self {
            inner,
            shutdown: Mutex::new(Some(shutdown_tx)),
        })
    }

    /// Open a store over the file at `path` on the local filesystem.
    pub fn open_path(path: impl Into<std::path::PathBuf>, config: &StoreConfig) -> StoreResult<Self> {
        let file = LocalFile::new(path).with_sync(config.sync_on_write);
        Self::open(Arc::new(file), config)
    }

    /// Force the initial read, as if the file had just changed.
    pub async fn start(&self) -> StoreResult<Reconciliation> {
        self.inner.on_change(ChangeEvent::Started).await
    }

    /// Run one reconciliation pass now.
    pub async fn refresh(&self) -> StoreResult<Reconciliation> {
        self.inner.on_change(ChangeEvent::Requested).await
    }

    /// Wait for pending writes, then reconcile until the snapshot matches a
    /// valid file with nothing left to write.
    pub async fn settle(&self) -> StoreResult<()> {
        for _ in 0..SETTLE_ATTEMPTS {
            self.inner.writer.settled().await;
            match self.refresh().await? {
                Reconciliation::Updated if self.inner.writer.is_idle() => return Ok(()),
                Reconciliation::Updated | Reconciliation::ResetRequested(_) => {}
                Reconciliation::Busy => tokio::time::sleep(SETTLE_BACKOFF).await,
            }
        }
        Err(StoreError::Unsettled {
            attempts: SETTLE_ATTEMPTS,
        })
    }

    /// The current reconciled snapshot.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.inner.state.load()
    }

    /// All entries, ordered by id.
    pub fn subdirs(&self) -> Vec<Subdir> {
        self.snapshot().subdirs().values().cloned().collect()
    }

    /// Entry with the given id, if present.
    pub fn get(&self, id: &str) -> Option<Subdir> {
        self.snapshot().get(id).cloned()
    }

    /// Returns `true` if an entry with this id is present.
    pub fn contains(&self, id: &str) -> bool {
        self.snapshot().contains(id)
    }

    /// The current comment.
    pub fn comment(&self) -> Option<String> {
        self.snapshot().comment().map(str::to_string)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// The queue all writes to the index go through.
    pub fn writer(&self) -> &WriteQueue {
        &self.inner.writer
    }

    /// Shorthand for `writer().order(order)`.
    pub fn order(&self, order: WriteOrder) {
        self.inner.writer.order(order);
    }

    /// Receive a [`StoreEvent`] for every change from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    /// Stop watching the file. The snapshot stays readable.
    pub fn close(&self) {
        let sender = self.shutdown.lock().expect("store lock poisoned").take();
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }
}

impl StoreInner {
    async fn on_change(&self, event: ChangeEvent) -> StoreResult<Reconciliation> {
        let Some(_guard) = self.busy.try_acquire() else {
            warn!(%event, "index read is busy, dropping change notification");
            return Ok(Reconciliation::Busy);
        };
        debug!(%event, "index is being read");

        let bytes = match self.file.read_all().await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("index file not found, requested a reset");
                self.writer.order(WriteOrder::Reset);
                return Ok(Reconciliation::ResetRequested(ResetCause::Missing));
            }
            Err(source) => {
                return Err(StoreError::Read {
                    location: self.file.location(),
                    source,
                });
            }
        };

        let snapshot = match codec::decode(&bytes) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "index file is malformed, requested a reset");
                self.writer.order(WriteOrder::Reset);
                return Ok(Reconciliation::ResetRequested(ResetCause::Malformed(e)));
            }
        };

        let count = snapshot.len();
        self.state.replace(snapshot);
        debug!(subdirs = count, "index has finished reading");
        // No receivers is fine.
        let _ = self.events.send(StoreEvent::SubdirsChanged);
        Ok(Reconciliation::Updated)
    }
}

/// Forward watch events to reconciliations until shut down.
async fn listen(
    inner: Arc<StoreInner>,
    mut subscription: Subscription,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = subscription.recv() => match event {
                Some(event) => {
                    let inner = Arc::clone(&inner);
                    tokio::spawn(async move {
                        if let Err(e) = inner.on_change(event).await {
                            error!(error = %e, "index reconciliation failed");
                            let _ = inner.events.send(StoreEvent::Faulted(e.to_string()));
                        }
                    });
                }
                None => {
                    debug!("change stream ended");
                    break;
                }
            },
        }
    }
    subscription.unsubscribe();
    debug!("index watch torn down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use subdex_format::IndexFile;

    use crate::memory::MemoryFile;

    fn open(file: &Arc<MemoryFile>) -> IndexStore {
        IndexStore::open(Arc::clone(file), &StoreConfig::default()).unwrap()
    }

    fn memory(value: serde_json::Value) -> Arc<MemoryFile> {
        Arc::new(MemoryFile::with_contents(value.to_string()))
    }

    fn empty_index_bytes(comment: Option<&str>) -> Vec<u8> {
        let file = IndexFile {
            subdirs: Vec::new(),
            comment: comment.map(str::to_string),
        };
        codec::encode(&file, StoreConfig::default().pretty).unwrap()
    }

    fn ids(store: &IndexStore) -> Vec<String> {
        store.subdirs().into_iter().map(|subdir| subdir.id).collect()
    }

    async fn next_event(rx: &mut broadcast::Receiver<StoreEvent>) -> StoreEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no store event within timeout")
            .expect("store event channel closed")
    }

    #[tokio::test]
    async fn start_reads_existing_file() {
        let file = memory(json!({"subdirs": [{"id": "a"}, {"id": "b"}], "comment": "hi"}));
        let store = open(&file);
        let mut rx = store.subscribe();
        assert!(store.is_empty());

        let outcome = store.start().await.unwrap();
        assert!(matches!(outcome, Reconciliation::Updated));
        assert_eq!(ids(&store), vec!["a", "b"]);
        assert_eq!(store.comment().as_deref(), Some("hi"));
        assert_eq!(next_event(&mut rx).await, StoreEvent::SubdirsChanged);
        assert_eq!(file.write_count(), 0);
    }

    #[tokio::test]
    async fn missing_file_is_initialized() {
        let file = Arc::new(MemoryFile::new());
        let store = open(&file);

        let outcome = store.start().await.unwrap();
        assert!(matches!(outcome, Reconciliation::ResetRequested(ResetCause::Missing)));

        store.settle().await.unwrap();
        assert!(store.is_empty());
        assert_eq!(file.contents().unwrap(), empty_index_bytes(None));
    }

    #[tokio::test]
    async fn malformed_content_converges_to_empty_index() {
        let cases: Vec<Vec<u8>> = vec![
            Vec::new(),
            b"definitely not json".to_vec(),
            json!({"comment": "no subdirs"}).to_string().into_bytes(),
            json!({"subdirs": "a,b"}).to_string().into_bytes(),
            vec![0xc3, 0x28],
        ];

        for bytes in cases {
            let file = Arc::new(MemoryFile::with_contents(bytes.clone()));
            let store = open(&file);

            let outcome = store.start().await.unwrap();
            assert!(
                matches!(outcome, Reconciliation::ResetRequested(ResetCause::Malformed(_))),
                "expected a reset for {bytes:?}"
            );

            store.settle().await.unwrap();
            assert!(store.is_empty());
            assert!(store.comment().is_none());
            assert_eq!(file.contents().unwrap(), empty_index_bytes(None));
        }
    }

    #[tokio::test]
    async fn idless_entries_are_dropped_on_read() {
        let file = memory(json!({"subdirs": [{"id": "a"}, {"foo": "bar"}]}));
        let store = open(&file);
        store.start().await.unwrap();
        assert_eq!(ids(&store), vec!["a"]);
    }

    #[tokio::test]
    async fn external_edit_is_picked_up() {
        let file = memory(json!({"subdirs": []}));
        let store = open(&file);
        store.start().await.unwrap();
        let mut rx = store.subscribe();

        file.write_external(json!({"subdirs": [{"id": "new"}]}).to_string());
        assert_eq!(next_event(&mut rx).await, StoreEvent::SubdirsChanged);
        assert!(store.contains("new"));
    }

    #[tokio::test]
    async fn removed_file_is_recreated_with_comment() {
        let file = memory(json!({"subdirs": [{"id": "a"}], "comment": "kept"}));
        let store = open(&file);
        store.start().await.unwrap();

        file.remove();
        store.settle().await.unwrap();

        assert!(store.is_empty());
        assert_eq!(store.comment().as_deref(), Some("kept"));
        assert_eq!(file.contents().unwrap(), empty_index_bytes(Some("kept")));
    }

    #[tokio::test]
    async fn read_failure_is_returned_to_caller() {
        let file = memory(json!({"subdirs": []}));
        file.fail_reads(io::ErrorKind::PermissionDenied);
        let store = open(&file);

        let result = store.start().await;
        assert!(matches!(result, Err(StoreError::Read { .. })));
        assert_eq!(file.write_count(), 0);

        // The busy flag was released on the error path.
        file.heal();
        assert!(matches!(store.refresh().await.unwrap(), Reconciliation::Updated));
    }

    #[tokio::test]
    async fn read_failure_during_watch_is_published() {
        let file = memory(json!({"subdirs": []}));
        let store = open(&file);
        store.start().await.unwrap();
        let mut rx = store.subscribe();

        file.fail_reads(io::ErrorKind::PermissionDenied);
        file.write_external("{}");

        assert!(matches!(next_event(&mut rx).await, StoreEvent::Faulted(_)));
    }

    #[tokio::test]
    async fn overlapping_reconciliation_is_dropped() {
        let file = memory(json!({"subdirs": [{"id": "a"}]}));
        file.set_latency(Duration::from_millis(20));
        let store = open(&file);

        let (first, second) = tokio::join!(store.refresh(), store.refresh());
        assert!(matches!(first.unwrap(), Reconciliation::Updated));
        assert!(matches!(second.unwrap(), Reconciliation::Busy));
        assert_eq!(ids(&store), vec!["a"]);
    }

    #[tokio::test]
    async fn writes_round_trip_through_the_watch() {
        let file = memory(json!({"subdirs": [], "comment": "c"}));
        let store = open(&file);
        store.start().await.unwrap();

        store.order(WriteOrder::add(Subdir::new("a").with_field("title", "A")));
        store.settle().await.unwrap();
        assert_eq!(ids(&store), vec!["a"]);
        assert_eq!(store.get("a").unwrap().field("title"), Some(&json!("A")));
        assert_eq!(store.comment().as_deref(), Some("c"));

        store.order(WriteOrder::delete(Subdir::new("a")));
        store.settle().await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn duplicate_add_leaves_file_untouched() {
        let file = memory(json!({"subdirs": [{"id": "a"}]}));
        let store = open(&file);
        store.start().await.unwrap();
        let before = file.contents();

        store.order(WriteOrder::add(Subdir::new("a")));
        store.settle().await.unwrap();

        assert_eq!(file.write_count(), 0);
        assert_eq!(file.contents(), before);
    }

    #[tokio::test]
    async fn one_drain_serves_overlapping_batches() {
        let file = memory(json!({"subdirs": []}));
        file.set_latency(Duration::from_millis(10));
        let store = open(&file);
        store.start().await.unwrap();

        store.writer().order_all([
            WriteOrder::add(Subdir::new("x")),
            WriteOrder::add(Subdir::new("y")),
        ]);
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.writer().order_all([WriteOrder::delete(Subdir::new("x"))]);

        store.settle().await.unwrap();
        assert_eq!(ids(&store), vec!["y"]);
    }

    #[tokio::test]
    async fn failed_write_keeps_previous_content() {
        let file = memory(json!({"subdirs": [{"id": "a"}]}));
        let store = open(&file);
        store.start().await.unwrap();
        let before = file.contents();

        file.fail_writes(io::ErrorKind::PermissionDenied);
        store.order(WriteOrder::add(Subdir::new("b")));
        store.settle().await.unwrap();

        assert_eq!(file.contents(), before);
        assert_eq!(ids(&store), vec!["a"]);
    }

    #[tokio::test]
    async fn settle_gives_up_when_reset_cannot_be_written() {
        let file = Arc::new(MemoryFile::new());
        file.fail_writes(io::ErrorKind::PermissionDenied);
        let store = open(&file);

        let result = store.settle().await;
        assert!(matches!(result, Err(StoreError::Unsettled { .. })));
    }

    #[tokio::test]
    async fn close_tears_down_the_watch() {
        let file = memory(json!({"subdirs": []}));
        let store = open(&file);
        store.start().await.unwrap();
        assert_eq!(file.subscriber_count(), 1);

        store.close();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(file.subscriber_count(), 0);

        file.write_external(json!({"subdirs": [{"id": "late"}]}).to_string());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!store.contains("late"));
    }

    #[test]
    fn zero_event_capacity_is_rejected() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let _enter = runtime.enter();
        let config = StoreConfig {
            event_capacity: 0,
            ..StoreConfig::default()
        };
        let result = IndexStore::open(Arc::new(MemoryFile::new()), &config);
        assert!(matches!(result, Err(StoreError::Config(_))));
    }

    #[tokio::test]
    async fn local_file_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let config = StoreConfig {
            sync_on_write: false,
            ..StoreConfig::default()
        };
        let store = IndexStore::open_path(&path, &config).unwrap();

        assert!(matches!(
            store.start().await.unwrap(),
            Reconciliation::ResetRequested(ResetCause::Missing)
        ));
        store.settle().await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), empty_index_bytes(None));

        store.order(WriteOrder::add(Subdir::new("maps")));
        store.settle().await.unwrap();
        assert_eq!(ids(&store), vec!["maps"]);

        let on_disk = codec::decode(&std::fs::read(&path).unwrap()).unwrap();
        assert!(on_disk.contains("maps"));
    }
}

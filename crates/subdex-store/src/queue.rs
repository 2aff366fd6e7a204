//! The serialized write queue.
//!
//! Callers append batches of [`WriteOrder`]s; a single drain task applies
//! them to the backing file one at a time. The drain takes every pending
//! batch at once, walks the batches in arrival order and each batch from
//! its last order to its first, then checks for batches that arrived in the
//! meantime before going idle. A second drain is never started while one is
//! in flight.
//!
//! The drain computes each order against the store's reconciled snapshot
//! as it was when the drain started, advanced by every write the drain has
//! made since. Each successful order replaces the whole file.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use subdex_format::{codec, IndexSnapshot};
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::backing::BackingFile;
use crate::order::WriteOrder;
use crate::state::{BusyFlag, BusyGuard, StateView};

/// Single-writer queue of orders against the index file.
///
/// Cloning yields another handle on the same queue. Ordering spawns the
/// drain on the current tokio runtime, so it must be called from within one.
#[derive(Clone)]
pub struct WriteQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    file: Arc<dyn BackingFile>,
    state: StateView,
    pending: Mutex<VecDeque<Vec<WriteOrder>>>,
    busy: BusyFlag,
    idle: Notify,
    pretty: bool,
}

impl std::fmt::Debug for WriteQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteQueue")
            .field("file", &self.inner.file.location())
            .field("pending", &self.pending())
            .field("draining", &self.inner.busy.is_set())
            .finish()
    }
}

impl WriteQueue {
    pub(crate) fn new(file: Arc<dyn BackingFile>, state: StateView, pretty: bool) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                file,
                state,
                pending: Mutex::new(VecDeque::new()),
                busy: BusyFlag::default(),
                idle: Notify::new(),
                pretty,
            }),
        }
    }

    /// Queue a single order.
    pub fn order(&self, order: WriteOrder) {
        self.order_all([order]);
    }

    /// Queue a batch of orders. Within the batch, the last order is applied
    /// first.
    pub fn order_all(&self, orders: impl IntoIterator<Item = WriteOrder>) {
        let batch: Vec<WriteOrder> = orders.into_iter().collect();
        if batch.is_empty() {
            return;
        }
        debug!(count = batch.len(), "write orders queued");
        self.inner.lock_pending().push_back(batch);

        if let Some(guard) = self.inner.busy.try_acquire() {
            tokio::spawn(Arc::clone(&self.inner).drain(guard));
        }
    }

    /// Number of orders not yet taken by a drain.
    pub fn pending(&self) -> usize {
        self.inner.lock_pending().iter().map(Vec::len).sum()
    }

    /// Returns `true` if no drain is running and nothing is pending.
    pub fn is_idle(&self) -> bool {
        self.inner.is_idle()
    }

    /// Wait until the queue is idle.
    ///
    /// This is not a per-order completion signal: orders may have been
    /// skipped or their writes may have failed.
    pub async fn settled(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.is_idle() {
                return;
            }
            notified.await;
        }
    }
}

impl QueueInner {
    fn lock_pending(&self) -> MutexGuard<'_, VecDeque<Vec<WriteOrder>>> {
        self.pending.lock().expect("write queue lock poisoned")
    }

    fn is_idle(&self) -> bool {
        !self.busy.is_set() && self.lock_pending().is_empty()
    }

    async fn drain(self: Arc<Self>, mut guard: BusyGuard) {
        let mut view = self.state.load();
        loop {
            let batches = std::mem::take(&mut *self.lock_pending());
            if batches.is_empty() {
                drop(guard);
                // A batch can land between the take above and the release.
                if !self.lock_pending().is_empty() {
                    if let Some(reacquired) = self.busy.try_acquire() {
                        guard = reacquired;
                        continue;
                    }
                }
                self.idle.notify_waiters();
                return;
            }

            for mut batch in batches {
                while let Some(order) = batch.pop() {
                    view = self.handle(order, view).await;
                }
            }
        }
    }

    /// Apply one order and return the snapshot later orders build on.
    async fn handle(&self, order: WriteOrder, view: Arc<IndexSnapshot>) -> Arc<IndexSnapshot> {
        debug!(%order, "handling write order");

        let next = match order.apply(&view) {
            Ok(next) => next,
            Err(skipped) => {
                warn!(%order, reason = %skipped, "skipping write order");
                return view;
            }
        };

        let bytes = match codec::encode(&next.to_file(), self.pretty) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(%order, error = %e, "could not serialize index, this is a programming error");
                return view;
            }
        };

        if let Err(e) = self.file.replace_all(&bytes).await {
            warn!(
                %order,
                location = %self.file.location(),
                error = %e,
                "could not write index file, must be resolved manually"
            );
            return view;
        }

        debug!(%order, subdirs = next.len(), "write order applied");
        Arc::new(next)
    }
}

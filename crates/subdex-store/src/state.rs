//! Shared state between the store and its write queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use subdex_format::IndexSnapshot;

/// Holder of the reconciled snapshot.
///
/// Only the store replaces the snapshot; the replacement is a single `Arc`
/// swap, so readers see either the old or the new state in full.
#[derive(Debug, Default)]
pub(crate) struct SnapshotCell {
    current: RwLock<Arc<IndexSnapshot>>,
}

impl SnapshotCell {
    pub(crate) fn load(&self) -> Arc<IndexSnapshot> {
        Arc::clone(&self.current.read().expect("snapshot lock poisoned"))
    }

    pub(crate) fn replace(&self, next: IndexSnapshot) {
        *self.current.write().expect("snapshot lock poisoned") = Arc::new(next);
    }
}

/// Read-only handle on the store's reconciled snapshot.
#[derive(Clone, Debug)]
pub struct StateView(Arc<SnapshotCell>);

impl StateView {
    pub(crate) fn new(cell: Arc<SnapshotCell>) -> Self {
        Self(cell)
    }

    /// The last reconciled snapshot.
    pub fn load(&self) -> Arc<IndexSnapshot> {
        self.0.load()
    }
}

/// At-most-one flag. Acquiring hands out a guard that clears it on drop.
#[derive(Clone, Debug, Default)]
pub(crate) struct BusyFlag(Arc<AtomicBool>);

impl BusyFlag {
    pub(crate) fn try_acquire(&self) -> Option<BusyGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(Arc::clone(&self.0)))
    }

    pub(crate) fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub(crate) struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subdex_format::Subdir;

    #[test]
    fn busy_flag_admits_one_holder() {
        let flag = BusyFlag::default();
        let guard = flag.try_acquire().unwrap();
        assert!(flag.is_set());
        assert!(flag.try_acquire().is_none());

        drop(guard);
        assert!(!flag.is_set());
        assert!(flag.try_acquire().is_some());
    }

    #[test]
    fn view_sees_replaced_snapshot() {
        let cell = Arc::new(SnapshotCell::default());
        let view = StateView::new(Arc::clone(&cell));
        let before = view.load();
        assert!(before.is_empty());

        cell.replace(IndexSnapshot::from_entries(vec![Subdir::new("a")], None));
        assert!(view.load().contains("a"));
        // Earlier loads keep the state they saw.
        assert!(before.is_empty());
    }
}

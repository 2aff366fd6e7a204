//! Watched, self-healing index store.
//!
//! The store persists a small collection of [`Subdir`] entries to a single
//! JSON file. Two cooperating parts share that file:
//!
//! - [`WriteQueue`] is the only writer. It accepts [`WriteOrder`]s, drains
//!   them one at a time (at most one drain in flight), and replaces the
//!   whole file on every successful order.
//! - [`IndexStore`] is the reader. It watches the file, re-reads it on every
//!   change, and publishes the reconciled [`IndexSnapshot`]. Any structural
//!   problem with the file content is healed by ordering a reset.
//!
//! The file itself is reached through the [`BackingFile`] and [`FileWatch`]
//! traits, implemented for disk by [`LocalFile`] and for tests by
//! [`MemoryFile`].
//!
//! # Modules
//!
//! - [`backing`] -- Collaborator traits, change events, subscriptions
//! - [`local`] -- On-disk file with atomic replace and OS file watching
//! - [`memory`] -- In-memory file with failure injection
//! - [`order`] -- Write orders and how they apply to a snapshot
//! - [`queue`] -- The serialized write queue
//! - [`store`] -- The reconciling reader
//! - [`config`] -- [`StoreConfig`]
//! - [`error`] -- [`StoreError`]

pub mod backing;
pub mod config;
pub mod error;
pub mod local;
pub mod memory;
pub mod order;
pub mod queue;
mod state;
pub mod store;

pub use backing::{BackingFile, ChangeEvent, FileWatch, Subscription};
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use local::LocalFile;
pub use memory::MemoryFile;
pub use order::{Skipped, WriteOrder};
pub use queue::WriteQueue;
pub use state::StateView;
pub use store::{IndexStore, Reconciliation, ResetCause, StoreEvent};

pub use subdex_format::{IndexFile, IndexSnapshot, Subdir};

//! On-disk format of the subdex index.
//!
//! The index is a single UTF-8 JSON document holding an array of subdir
//! entries and an optional free-text comment. This crate owns the entry
//! type, the in-memory snapshot the store reconciles into, and the codec
//! that turns one into the other.
//!
//! # Key Types
//!
//! - [`Subdir`] -- A named entry; only `id` is interpreted
//! - [`IndexFile`] -- The serialized shape (`subdirs` + `comment`)
//! - [`IndexSnapshot`] -- The reconciled mapping of `id` to [`Subdir`]
//! - [`FormatError`] -- Why a file could not be decoded

pub mod codec;
pub mod error;
pub mod file;
pub mod subdir;

pub use codec::{decode, encode};
pub use error::{FormatError, FormatResult};
pub use file::{IndexFile, IndexSnapshot};
pub use subdir::Subdir;

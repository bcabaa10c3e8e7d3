//! Storage layer
//!
//! Local, on-device persistence of planning document snapshots.
//!
//! ## Architecture
//!
//! - **Local snapshot store**: latest snapshot per owner, used while offline
//!   and as a safety net whenever a remote write fails
//!
//! The remote (hosted) store lives in [`crate::sync`].

pub mod error;
pub mod local;

pub use error::{StorageError, StorageResult, WriteCause};
pub use local::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};

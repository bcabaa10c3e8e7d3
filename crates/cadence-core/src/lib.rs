//! Cadence Core Library
//!
//! This crate provides the core functionality for Cadence, a monthly
//! content planner whose document is kept durable while it is edited.
//!
//! # Architecture
//!
//! - **Remote store**: one row per owner, hosted REST or SQLite
//! - **Local snapshots**: on-device backup used offline and after failures
//! - **Autosave controller**: debounce, offline queue, retry with backoff
//!
//! # Quick Start
//!
//! ```text
//! let session = Session::open(config, owner, true).await?;
//!
//! let mut doc = session.document().clone();
//! doc.add_month(MonthSection::new("January"));
//!
//! let handle = session.start_autosave();
//! handle.edit(doc).await;
//! let (status, _events) = handle.shutdown().await;
//! ```
//!
//! # Modules
//!
//! - `session`: Wires configuration to stores (main entry point)
//! - `document`: Planning document model
//! - `storage`: Local snapshot persistence
//! - `sync`: Autosave controller and remote stores
//! - `config`: Application configuration

pub mod config;
pub mod document;
pub mod session;
pub mod storage;
pub mod sync;

pub use config::Config;
pub use document::{
    ContentHash, DocumentError, DocumentSnapshot, MonthSection, OwnerId, PlanDocument,
    WeekEntry, WeekField,
};
pub use session::{open_remote, RemoteTarget, Session, SyncReport};
pub use storage::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore, StorageError};
pub use sync::{
    AutosaveController, AutosaveEvent, AutosaveHandle, DocumentSource, SaveNotice, SaveStatus,
    SyncError,
};

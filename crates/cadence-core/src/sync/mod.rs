//! Autosave and remote sync
//!
//! Keeps the planning document durable while it is being edited.
//!
//! ## Flow
//!
//! 1. Edits reset a debounce timer
//! 2. When the timer fires the snapshot is written to the remote store, or
//!    queued and written locally when offline
//! 3. Failed remote writes are mirrored locally and retried with exponential
//!    backoff
//! 4. Coming back online drains the queued snapshot
//!
//! ## Usage
//!
//! ```ignore
//! let controller = AutosaveController::new(owner, remote, local, settings, true);
//! let handle = spawn_autosave_task(controller, &monitor);
//! handle.edit(document).await;
//! let (status, events) = handle.shutdown().await;
//! ```

pub mod connectivity;
pub mod controller;
pub mod error;
pub mod http;
pub mod loader;
pub mod queue;
pub mod remote;
pub mod schema;
pub mod sqlite;
pub mod task;

pub use connectivity::{ConnectivityMonitor, Transition};
pub use controller::{
    AutosaveController, AutosaveEvent, AutosaveSettings, FlushOutcome, Phase, SaveNotice,
    SaveStatus,
};
pub use error::{SyncError, SyncResult};
pub use http::HttpRemoteStore;
pub use loader::{load_document, DocumentSource, LoadedDocument};
pub use queue::SaveQueue;
pub use remote::{RemoteReceipt, RemoteStore, DOCUMENT_SLOT};
pub use sqlite::SqliteRemoteStore;
pub use task::{spawn_autosave_task, AutosaveCommand, AutosaveHandle};

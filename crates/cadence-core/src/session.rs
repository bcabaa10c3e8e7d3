//! Editing session
//!
//! A `Session` wires configuration to concrete stores and loads the
//! document to edit:
//! - Remote store (hosted REST or SQLite, per `remote_url`)
//! - Local snapshot store (on-device backup)
//! - Connectivity monitor
//!
//! ## Usage
//!
//! ```ignore
//! let session = Session::open(config, owner, true).await?;
//! let mut doc = session.document().clone();
//! doc.add_month(MonthSection::new("January"));
//!
//! let handle = session.start_autosave();
//! handle.edit(doc).await;
//! handle.shutdown().await;
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::time::Instant;
use tracing::info;

use crate::config::Config;
use crate::document::{DocumentSnapshot, OwnerId, PlanDocument};
use crate::storage::{FileSnapshotStore, SnapshotStore};
use crate::sync::{
    load_document, spawn_autosave_task, AutosaveController, AutosaveEvent, AutosaveHandle,
    AutosaveSettings, ConnectivityMonitor, DocumentSource, FlushOutcome, HttpRemoteStore,
    LoadedDocument, RemoteStore, SaveNotice, SaveStatus, SqliteRemoteStore, SyncError,
};

/// Controller type used by sessions
pub type SessionController = AutosaveController<Arc<dyn RemoteStore>, Arc<FileSnapshotStore>>;

/// Which backend a configuration selects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteTarget {
    Http(String),
    Sqlite(PathBuf),
}

impl RemoteTarget {
    /// Resolve the backend from `remote_url`
    pub fn from_config(config: &Config) -> Result<Self> {
        let Some(url) = config.remote_url.as_deref() else {
            return Ok(RemoteTarget::Sqlite(config.sqlite_path()));
        };

        if url.starts_with("http://") || url.starts_with("https://") {
            Ok(RemoteTarget::Http(url.to_string()))
        } else if let Some(path) = url.strip_prefix("sqlite://") {
            if path.is_empty() {
                bail!("sqlite:// URL needs a database path");
            }
            Ok(RemoteTarget::Sqlite(PathBuf::from(path)))
        } else {
            bail!(
                "Unsupported remote_url '{}': expected http(s):// or sqlite://",
                url
            )
        }
    }

    pub fn describe(&self) -> String {
        match self {
            RemoteTarget::Http(url) => url.clone(),
            RemoteTarget::Sqlite(path) => format!("sqlite://{}", path.display()),
        }
    }
}

/// Build the remote store a configuration selects
pub fn open_remote(config: &Config) -> Result<Arc<dyn RemoteStore>> {
    let store: Arc<dyn RemoteStore> = match RemoteTarget::from_config(config)? {
        RemoteTarget::Http(url) => Arc::new(
            HttpRemoteStore::new(
                &url,
                &config.remote_table,
                config.remote_api_key.clone(),
            )
            .context("Failed to create REST client")?,
        ),
        RemoteTarget::Sqlite(path) => Arc::new(
            SqliteRemoteStore::open(&path)
                .with_context(|| format!("Failed to open SQLite backend at {:?}", path))?,
        ),
    };
    Ok(store)
}

/// Result of a manual sync
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub outcome: FlushOutcome,
    pub status: SaveStatus,
    pub notices: Vec<SaveNotice>,
}

/// One editing session for one owner
pub struct Session {
    config: Config,
    owner: OwnerId,
    remote: Arc<dyn RemoteStore>,
    local: Arc<FileSnapshotStore>,
    monitor: ConnectivityMonitor,
    loaded: LoadedDocument,
}

impl Session {
    /// Open stores and load the owner's document
    pub async fn open(config: Config, owner: OwnerId, online: bool) -> Result<Self> {
        let remote = open_remote(&config)?;
        let local = Arc::new(FileSnapshotStore::new(config.snapshots_dir()));
        Self::open_with_stores(config, owner, remote, local, online).await
    }

    /// Open with explicit stores
    pub async fn open_with_stores(
        config: Config,
        owner: OwnerId,
        remote: Arc<dyn RemoteStore>,
        local: Arc<FileSnapshotStore>,
        online: bool,
    ) -> Result<Self> {
        let loaded = load_document(owner, remote.as_ref(), local.as_ref(), online).await;
        info!(
            "Session opened for {} ({})",
            owner,
            loaded.source.as_str()
        );

        Ok(Self {
            config,
            owner,
            remote,
            local,
            monitor: ConnectivityMonitor::new(online),
            loaded,
        })
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn document(&self) -> &PlanDocument {
        &self.loaded.snapshot.document
    }

    pub fn snapshot(&self) -> &DocumentSnapshot {
        &self.loaded.snapshot
    }

    pub fn source(&self) -> DocumentSource {
        self.loaded.source
    }

    /// Error from the remote store during load, if any
    pub fn remote_error(&self) -> Option<&SyncError> {
        self.loaded.remote_error.as_ref()
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    pub fn local(&self) -> &FileSnapshotStore {
        &self.local
    }

    /// Latest on-device backup
    pub fn local_backup(&self) -> Result<Option<DocumentSnapshot>> {
        self.local
            .read(&self.owner)
            .context("Failed to read local backup")
    }

    /// Controller seeded with the loaded document
    pub fn controller(&self) -> SessionController {
        AutosaveController::new(
            self.owner,
            self.remote.clone(),
            self.local.clone(),
            AutosaveSettings::from_config(&self.config),
            self.monitor.is_online(),
        )
        .with_snapshot(
            self.loaded.snapshot.clone(),
            self.loaded.source == DocumentSource::Remote,
        )
    }

    /// Start the background autosave task
    pub fn start_autosave(&self) -> AutosaveHandle {
        spawn_autosave_task(self.controller(), &self.monitor)
    }

    /// Push the local backup to the remote store
    ///
    /// Used after a notice asked for a manual sync. Does nothing when the
    /// backup matches what was loaded from the remote store.
    pub async fn sync_backup(&self) -> Result<SyncReport> {
        let backup = self.local_backup()?;

        let mut controller = match backup {
            Some(snapshot)
                if self.loaded.source == DocumentSource::Remote
                    && snapshot.content_hash() == self.loaded.snapshot.content_hash() =>
            {
                info!("Local backup already matches remote");
                return Ok(SyncReport {
                    outcome: FlushOutcome::Skipped,
                    status: SaveStatus::Saved,
                    notices: Vec::new(),
                });
            }
            Some(snapshot) => AutosaveController::new(
                self.owner,
                self.remote.clone(),
                self.local.clone(),
                AutosaveSettings::from_config(&self.config),
                self.monitor.is_online(),
            )
            .with_snapshot(snapshot, false),
            None => self.controller(),
        };

        let mut events = controller.take_events();
        let outcome = controller.save_now(Instant::now()).await;

        let mut notices = Vec::new();
        if let Some(rx) = events.as_mut() {
            while let Ok(event) = rx.try_recv() {
                if let AutosaveEvent::Notice(notice) = event {
                    notices.push(notice);
                }
            }
        }

        Ok(SyncReport {
            outcome,
            status: controller.status(),
            notices,
        })
    }
}

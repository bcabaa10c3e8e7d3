//! Session start
//!
//! Resolves the document to edit: the remote copy when reachable, then the
//! on-device backup, then an empty plan. A backup that differs from the
//! remote row and is newer than it holds edits made offline in an earlier
//! run; it wins so those edits are pushed instead of being overwritten.

use tracing::{info, warn};

use super::error::SyncError;
use super::remote::RemoteStore;
use crate::document::{DocumentSnapshot, OwnerId, PlanDocument};
use crate::storage::SnapshotStore;

/// Where the loaded document came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentSource {
    Remote,
    LocalBackup,
    New,
}

impl DocumentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentSource::Remote => "remote",
            DocumentSource::LocalBackup => "local backup",
            DocumentSource::New => "new",
        }
    }
}

/// Result of [`load_document`]
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub snapshot: DocumentSnapshot,
    pub source: DocumentSource,
    /// Set when the remote store was tried and failed
    pub remote_error: Option<SyncError>,
}

/// Load the owner's planning document
pub async fn load_document<R, S>(
    owner: OwnerId,
    remote: &R,
    local: &S,
    online: bool,
) -> LoadedDocument
where
    R: RemoteStore + ?Sized,
    S: SnapshotStore + ?Sized,
{
    let mut remote_error = None;

    if online {
        match remote.fetch(&owner).await {
            Ok(Some(snapshot)) => {
                if let Some(backup) = newer_backup(&owner, &snapshot, local) {
                    info!("Local backup is newer than the remote document, resuming from it");
                    return LoadedDocument {
                        snapshot: backup,
                        source: DocumentSource::LocalBackup,
                        remote_error: None,
                    };
                }
                info!("Loaded planning document from remote store");
                return LoadedDocument {
                    snapshot,
                    source: DocumentSource::Remote,
                    remote_error: None,
                };
            }
            Ok(None) => info!("No remote document for {}", owner),
            Err(e) => {
                warn!("Remote load failed: {}", e);
                remote_error = Some(e);
            }
        }
    }

    match local.read(&owner) {
        Ok(Some(snapshot)) => {
            info!("Loaded planning document from local backup");
            return LoadedDocument {
                snapshot,
                source: DocumentSource::LocalBackup,
                remote_error,
            };
        }
        Ok(None) => {}
        Err(e) => warn!("Local backup unreadable: {}", e),
    }

    LoadedDocument {
        snapshot: DocumentSnapshot::new(owner, PlanDocument::new()),
        source: DocumentSource::New,
        remote_error,
    }
}

/// The local backup, if it carries unsynced edits on top of `remote`
fn newer_backup<S>(
    owner: &OwnerId,
    remote: &DocumentSnapshot,
    local: &S,
) -> Option<DocumentSnapshot>
where
    S: SnapshotStore + ?Sized,
{
    match local.read(owner) {
        Ok(Some(backup))
            if backup.updated_at > remote.updated_at
                && backup.content_hash() != remote.content_hash() =>
        {
            Some(backup)
        }
        Ok(_) => None,
        Err(e) => {
            warn!("Local backup unreadable: {}", e);
            None
        }
    }
}

//! Remote store contract
//!
//! The hosted backend keeps one row per owner, addressed by
//! `(owner, slot = 0)`. Writes are full-document upserts with a
//! server-recorded timestamp. Conflicts resolve as last-write-wins: there is
//! no version check, so a concurrent session for the same owner can overwrite
//! a newer row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::SyncResult;
use crate::document::{DocumentSnapshot, OwnerId};

/// The single logical slot every owner's planning document lives in
pub const DOCUMENT_SLOT: i64 = 0;

/// Acknowledgement of a successful upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteReceipt {
    /// Owner the row belongs to
    pub owner: OwnerId,
    /// Timestamp recorded by the server
    pub updated_at: DateTime<Utc>,
}

/// Remote persistence for planning documents
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Insert or replace the owner's document
    async fn upsert(&self, snapshot: &DocumentSnapshot) -> SyncResult<RemoteReceipt>;

    /// Fetch the owner's document, if one was ever written
    async fn fetch(&self, owner: &OwnerId) -> SyncResult<Option<DocumentSnapshot>>;
}

#[async_trait]
impl<T: RemoteStore + ?Sized> RemoteStore for std::sync::Arc<T> {
    async fn upsert(&self, snapshot: &DocumentSnapshot) -> SyncResult<RemoteReceipt> {
        (**self).upsert(snapshot).await
    }

    async fn fetch(&self, owner: &OwnerId) -> SyncResult<Option<DocumentSnapshot>> {
        (**self).fetch(owner).await
    }
}

//! Relational backend on SQLite
//!
//! Implements [`RemoteStore`] against a SQLite database using the same
//! row layout as the hosted backend.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::error::{SyncError, SyncResult};
use super::remote::{RemoteReceipt, RemoteStore, DOCUMENT_SLOT};
use super::schema::{init_schema, needs_init};
use crate::document::{DocumentSnapshot, OwnerId, PlanDocument};

/// [`RemoteStore`] backed by a SQLite database
pub struct SqliteRemoteStore {
    conn: Mutex<Connection>,
}

impl SqliteRemoteStore {
    /// Open (or create) the database at `path`
    pub fn open(path: &Path) -> SyncResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::Backend(format!("{:?}: {}", parent, e)))?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> SyncResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> SyncResult<Self> {
        if needs_init(&conn) {
            init_schema(&conn)?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    fn document_count(&self) -> SyncResult<i64> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let count = conn.query_row("SELECT COUNT(*) FROM planning_documents", [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }
}

#[async_trait]
impl RemoteStore for SqliteRemoteStore {
    async fn upsert(&self, snapshot: &DocumentSnapshot) -> SyncResult<RemoteReceipt> {
        let payload = serde_json::to_string(&snapshot.document)?;
        let updated_at = Utc::now();

        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            r#"
            INSERT INTO planning_documents (owner_id, slot, payload, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(owner_id, slot) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
            params![
                snapshot.owner.to_string(),
                DOCUMENT_SLOT,
                payload,
                updated_at.timestamp_millis()
            ],
        )?;

        debug!("Upserted planning document for {}", snapshot.owner);

        Ok(RemoteReceipt {
            owner: snapshot.owner,
            updated_at,
        })
    }

    async fn fetch(&self, owner: &OwnerId) -> SyncResult<Option<DocumentSnapshot>> {
        let row: Option<(String, i64)> = {
            let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
            conn.query_row(
                "SELECT payload, updated_at FROM planning_documents WHERE owner_id = ?1 AND slot = ?2",
                params![owner.to_string(), DOCUMENT_SLOT],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
        };

        let Some((payload, millis)) = row else {
            return Ok(None);
        };

        let document: PlanDocument = serde_json::from_str(&payload)?;
        let updated_at = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| SyncError::Decode(format!("invalid timestamp {}", millis)))?;

        Ok(Some(DocumentSnapshot {
            owner: *owner,
            updated_at,
            document,
        }))
    }
}

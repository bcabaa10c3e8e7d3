//! Hosted backend over REST
//!
//! Talks to a PostgREST-style endpoint:
//!
//! - upsert: `POST {base}/rest/v1/{table}?on_conflict=owner_id,slot`
//!   with `Prefer: resolution=merge-duplicates`
//! - fetch: `GET {base}/rest/v1/{table}?owner_id=eq.{owner}&slot=eq.0`
//!
//! 401/403 responses surface as [`SyncError::Unauthorized`] so the caller can
//! prompt for re-authentication instead of retrying.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{SyncError, SyncResult};
use super::remote::{RemoteReceipt, RemoteStore, DOCUMENT_SLOT};
use crate::document::{DocumentSnapshot, OwnerId, PlanDocument};

/// Request timeout for a single call
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Row layout shared with the hosted table
#[derive(Debug, Serialize, Deserialize)]
struct DocumentRow {
    owner_id: OwnerId,
    slot: i64,
    payload: PlanDocument,
    updated_at: DateTime<Utc>,
}

/// [`RemoteStore`] backed by the hosted REST API
pub struct HttpRemoteStore {
    client: Client,
    base_url: String,
    table: String,
    api_key: Option<String>,
}

impl HttpRemoteStore {
    /// Create a client for `base_url` (e.g. `https://xyz.example.co`)
    pub fn new(base_url: &str, table: &str, api_key: Option<String>) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            table: table.to_string(),
            api_key,
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }
}

/// Map an error response to a [`SyncError`]
fn classify_status(status: StatusCode, body: String) -> SyncError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        SyncError::Unauthorized(if body.is_empty() {
            status.to_string()
        } else {
            body
        })
    } else {
        SyncError::Rejected {
            status: status.as_u16(),
            message: body,
        }
    }
}

async fn check_status(response: reqwest::Response) -> SyncResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, body))
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn upsert(&self, snapshot: &DocumentSnapshot) -> SyncResult<RemoteReceipt> {
        let row = DocumentRow {
            owner_id: snapshot.owner,
            slot: DOCUMENT_SLOT,
            payload: snapshot.document.clone(),
            updated_at: Utc::now(),
        };

        let request = self
            .client
            .post(self.table_url())
            .query(&[("on_conflict", "owner_id,slot")])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&[&row]);

        let response = check_status(self.authorize(request).send().await?).await?;
        let rows: Vec<DocumentRow> = response.json().await?;

        debug!("Upserted planning document for {} over REST", snapshot.owner);

        // The server echoes the stored row; fall back to our timestamp if not
        let updated_at = rows
            .into_iter()
            .next()
            .map(|r| r.updated_at)
            .unwrap_or(row.updated_at);

        Ok(RemoteReceipt {
            owner: snapshot.owner,
            updated_at,
        })
    }

    async fn fetch(&self, owner: &OwnerId) -> SyncResult<Option<DocumentSnapshot>> {
        let request = self.client.get(self.table_url()).query(&[
            ("owner_id", format!("eq.{}", owner)),
            ("slot", format!("eq.{}", DOCUMENT_SLOT)),
            ("select", "owner_id,slot,payload,updated_at".to_string()),
        ]);

        let response = check_status(self.authorize(request).send().await?).await?;
        let rows: Vec<DocumentRow> = response.json().await?;

        Ok(rows.into_iter().next().map(|row| DocumentSnapshot {
            owner: row.owner_id,
            updated_at: row.updated_at,
            document: row.payload,
        }))
    }
}

//! Single-slot save queue
//!
//! Holds the newest snapshot waiting for the remote store while offline.
//! Only the latest snapshot matters, so enqueueing replaces whatever was
//! queued before.

use crate::document::DocumentSnapshot;

/// Queue of depth one
#[derive(Debug, Default)]
pub struct SaveQueue {
    slot: Option<DocumentSnapshot>,
}

impl SaveQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a snapshot, returning the one it replaced
    pub fn enqueue(&mut self, snapshot: DocumentSnapshot) -> Option<DocumentSnapshot> {
        self.slot.replace(snapshot)
    }

    /// Take the queued snapshot
    pub fn drain(&mut self) -> Option<DocumentSnapshot> {
        self.slot.take()
    }

    pub fn peek(&self) -> Option<&DocumentSnapshot> {
        self.slot.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }
}

//! Autosave controller
//!
//! Decides when and how the in-memory planning document reaches durable
//! storage. Every input carries the current instant, so the controller is a
//! deterministic state machine: the async driver in [`super::task`] only
//! feeds it commands, connectivity changes and expired deadlines.
//!
//! ## Phases
//!
//! | phase          | entered when                                   |
//! |----------------|------------------------------------------------|
//! | `Idle`         | nothing pending                                |
//! | `Debouncing`   | an edit armed the debounce deadline            |
//! | `Saving`       | a remote write is in flight                    |
//! | `Syncing`      | a queued offline snapshot is being drained     |
//! | `RetryWaiting` | a remote write failed and a retry is scheduled |
//! | `Failed`       | retries exhausted or authentication required   |
//! | `Local`        | the last flush happened offline                |
//!
//! ## Flush
//!
//! Offline, the snapshot is queued (replacing any queued one) and written to
//! the local store. Online, the snapshot is upserted unless its content hash
//! equals the last confirmed one and the flush was not forced. A failed
//! write is always mirrored locally, then retried after `base^n` seconds for
//! `n = 1..=max_retries`. After that the controller waits for a manual save.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::error::SyncError;
use super::queue::SaveQueue;
use super::remote::{RemoteReceipt, RemoteStore};
use crate::config::Config;
use crate::document::{ContentHash, DocumentSnapshot, OwnerId, PlanDocument};
use crate::storage::SnapshotStore;

/// Outcome of the most recent save, for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveStatus {
    Saved,
    Saving,
    Syncing,
    Local,
    Failed,
}

impl fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SaveStatus::Saved => "saved",
            SaveStatus::Saving => "saving",
            SaveStatus::Syncing => "syncing",
            SaveStatus::Local => "local",
            SaveStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// State machine phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Debouncing,
    Saving,
    RetryWaiting,
    Failed,
    Local,
    Syncing,
}

/// User-facing notification raised by a flush
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveNotice {
    /// The session expired; the user has to sign in again
    AuthenticationRequired(String),
    /// Automatic retries are exhausted; a manual sync is needed
    ManualSyncRequired(String),
    /// The on-device backup could not be written
    LocalWriteFailed(String),
}

/// Events emitted by the controller
#[derive(Debug, Clone, PartialEq)]
pub enum AutosaveEvent {
    StatusChanged(SaveStatus),
    Notice(SaveNotice),
}

/// What a flush did
#[derive(Debug, Clone, PartialEq)]
pub enum FlushOutcome {
    /// Nothing to write: no document, or content already saved
    Skipped,
    /// Offline: queued and written locally
    Queued,
    /// Written to the remote store
    Saved(RemoteReceipt),
    /// Remote write failed; `retry_in` is set when a retry was scheduled
    Failed {
        error: SyncError,
        retry_in: Option<Duration>,
    },
}

/// Why a flush runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushKind {
    Debounced,
    Retry,
    Manual,
}

impl FlushKind {
    fn is_forced(self) -> bool {
        !matches!(self, FlushKind::Debounced)
    }
}

/// Longest debounce or backoff delay the controller will schedule
pub const MAX_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Timing policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveSettings {
    /// Quiet period after the last edit
    pub debounce: Duration,
    /// Automatic retries after a failed remote write
    pub max_retries: u32,
    /// Backoff base in seconds
    pub backoff_base_secs: u64,
}

impl Default for AutosaveSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(crate::config::DEFAULT_DEBOUNCE_MS),
            max_retries: crate::config::DEFAULT_MAX_RETRIES,
            backoff_base_secs: crate::config::DEFAULT_BACKOFF_BASE_SECS,
        }
    }
}

impl AutosaveSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            debounce: config.debounce().min(MAX_DELAY),
            max_retries: config.max_retries,
            backoff_base_secs: config.backoff_base_secs,
        }
    }

    /// Delay before retry number `attempt` (1-based), capped at [`MAX_DELAY`]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.backoff_base_secs.saturating_pow(attempt)).min(MAX_DELAY)
    }
}

/// `now + delay`, clamped so far-off deadlines cannot overflow
fn deadline_after(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay.min(MAX_DELAY)).unwrap_or(now)
}

/// Orchestrates debounce, offline queueing, remote writes and retries
pub struct AutosaveController<R, S> {
    owner: OwnerId,
    remote: R,
    local: S,
    settings: AutosaveSettings,
    queue: SaveQueue,
    /// Latest in-memory snapshot
    current: Option<DocumentSnapshot>,
    /// Hash of the last snapshot the remote store confirmed
    last_saved: Option<ContentHash>,
    unsaved: bool,
    online: bool,
    phase: Phase,
    attempt: u32,
    debounce_at: Option<Instant>,
    retry_at: Option<Instant>,
    status: watch::Sender<SaveStatus>,
    status_rx: watch::Receiver<SaveStatus>,
    event_tx: mpsc::UnboundedSender<AutosaveEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<AutosaveEvent>>,
}

impl<R: RemoteStore, S: SnapshotStore> AutosaveController<R, S> {
    /// Create a controller for one document session
    pub fn new(
        owner: OwnerId,
        remote: R,
        local: S,
        settings: AutosaveSettings,
        online: bool,
    ) -> Self {
        let (status, status_rx) = watch::channel(SaveStatus::Saved);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            owner,
            remote,
            local,
            settings,
            queue: SaveQueue::new(),
            current: None,
            last_saved: None,
            unsaved: false,
            online,
            phase: Phase::Idle,
            attempt: 0,
            debounce_at: None,
            retry_at: None,
            status,
            status_rx,
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    /// Seed the controller with the document loaded at session start
    ///
    /// `confirmed` marks a snapshot that came from the remote store; anything
    /// else counts as unsaved until written.
    pub fn with_snapshot(mut self, snapshot: DocumentSnapshot, confirmed: bool) -> Self {
        if confirmed {
            self.last_saved = Some(snapshot.content_hash());
        }
        self.unsaved = !confirmed;
        self.current = Some(snapshot);
        self
    }

    // ==================== Inputs ====================

    /// Replace the in-memory document and (re)arm the debounce
    ///
    /// While a retry is scheduled the deadline is left alone; the retry
    /// writes whatever document is current when it fires.
    pub fn edit(&mut self, document: PlanDocument, now: Instant) {
        let snapshot = DocumentSnapshot::new(self.owner, document);
        self.unsaved = self.last_saved != Some(snapshot.content_hash());
        self.current = Some(snapshot);

        if self.phase == Phase::RetryWaiting {
            debug!("Edit during retry backoff, carried by the next attempt");
            return;
        }

        self.debounce_at = Some(deadline_after(now, self.settings.debounce));
        self.phase = Phase::Debouncing;
    }

    /// Fire any deadline that has expired
    pub async fn tick(&mut self, now: Instant) -> Option<FlushOutcome> {
        if self.retry_at.is_some_and(|at| now >= at) {
            self.retry_at = None;
            debug!("Retry attempt {} due", self.attempt);
            return Some(self.flush(now, FlushKind::Retry).await);
        }

        if self.debounce_at.is_some_and(|at| now >= at) {
            self.debounce_at = None;
            return Some(self.flush(now, FlushKind::Debounced).await);
        }

        None
    }

    /// Apply a connectivity change
    ///
    /// Going online with a queued snapshot drains it straight to the remote
    /// store, ahead of any pending debounced edit.
    pub async fn set_online(&mut self, online: bool, now: Instant) -> Option<FlushOutcome> {
        let was_online = self.online;
        self.online = online;

        if was_online || !online {
            return None;
        }

        let queued = self.queue.drain()?;
        info!("Back online, syncing queued snapshot");
        self.phase = Phase::Syncing;
        self.set_status(SaveStatus::Syncing);
        Some(self.write_remote(queued, now).await)
    }

    /// Manual "save now" / "sync now"
    ///
    /// Flushes immediately, bypassing the debounce and the idempotence check,
    /// and restarts the backoff sequence.
    pub async fn save_now(&mut self, now: Instant) -> FlushOutcome {
        self.debounce_at = None;
        self.retry_at = None;
        self.attempt = 0;
        self.flush(now, FlushKind::Manual).await
    }

    // ==================== Accessors ====================

    pub fn status(&self) -> SaveStatus {
        *self.status_rx.borrow()
    }

    /// Subscribe to status changes
    pub fn subscribe_status(&self) -> watch::Receiver<SaveStatus> {
        self.status_rx.clone()
    }

    /// Take the event receiver (can only be called once)
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<AutosaveEvent>> {
        self.event_rx.take()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Pending-save marker
    pub fn has_unsaved_changes(&self) -> bool {
        self.unsaved
    }

    /// Retry attempts made since the last success
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn document(&self) -> Option<&PlanDocument> {
        self.current.as_ref().map(|s| &s.document)
    }

    pub fn snapshot(&self) -> Option<&DocumentSnapshot> {
        self.current.as_ref()
    }

    /// Snapshot waiting for connectivity
    pub fn queued(&self) -> Option<&DocumentSnapshot> {
        self.queue.peek()
    }

    pub fn last_saved_hash(&self) -> Option<ContentHash> {
        self.last_saved
    }

    /// Earliest instant at which [`tick`](Self::tick) has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.debounce_at, self.retry_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Whether anything would be lost if the session ended now
    pub fn needs_flush(&self) -> bool {
        self.unsaved || self.debounce_at.is_some() || self.retry_at.is_some()
    }

    // ==================== Flush ====================

    async fn flush(&mut self, now: Instant, kind: FlushKind) -> FlushOutcome {
        let Some(snapshot) = self.current.clone() else {
            return FlushOutcome::Skipped;
        };

        if !self.online {
            return self.flush_offline(snapshot);
        }

        let hash = snapshot.content_hash();
        if !kind.is_forced() && self.last_saved == Some(hash) {
            debug!("Content {} already saved, skipping remote write", hash.short());
            self.unsaved = false;
            self.phase = Phase::Idle;
            self.set_status(SaveStatus::Saved);
            return FlushOutcome::Skipped;
        }

        self.phase = Phase::Saving;
        self.set_status(SaveStatus::Saving);
        self.write_remote(snapshot, now).await
    }

    fn flush_offline(&mut self, snapshot: DocumentSnapshot) -> FlushOutcome {
        debug!("Offline, queueing snapshot {}", snapshot.content_hash().short());

        let written = self.write_local(&snapshot);
        self.queue.enqueue(snapshot);
        if written {
            self.unsaved = false;
        }
        self.attempt = 0;
        self.retry_at = None;
        self.phase = Phase::Local;
        self.set_status(SaveStatus::Local);
        FlushOutcome::Queued
    }

    async fn write_remote(&mut self, snapshot: DocumentSnapshot, now: Instant) -> FlushOutcome {
        let hash = snapshot.content_hash();

        match self.remote.upsert(&snapshot).await {
            Ok(receipt) => {
                info!("Saved planning document {}", hash.short());
                self.last_saved = Some(hash);
                self.unsaved = self
                    .current
                    .as_ref()
                    .is_some_and(|c| c.content_hash() != hash);
                self.attempt = 0;
                self.retry_at = None;
                self.write_local(self.current.as_ref().unwrap_or(&snapshot));
                self.phase = if self.debounce_at.is_some() {
                    Phase::Debouncing
                } else {
                    Phase::Idle
                };
                self.set_status(SaveStatus::Saved);
                FlushOutcome::Saved(receipt)
            }
            Err(error) => {
                warn!("Remote save failed: {}", error);
                // A drained queue entry may be older than the current document
                let latest = self.current.clone().unwrap_or(snapshot);
                self.write_local(&latest);
                self.unsaved = self.last_saved != Some(latest.content_hash());
                self.set_status(SaveStatus::Failed);
                let retry_in = self.schedule_retry(&error, now);
                FlushOutcome::Failed { error, retry_in }
            }
        }
    }

    fn schedule_retry(&mut self, error: &SyncError, now: Instant) -> Option<Duration> {
        if error.is_auth() {
            self.attempt = 0;
            self.retry_at = None;
            self.phase = Phase::Failed;
            self.emit(AutosaveEvent::Notice(SaveNotice::AuthenticationRequired(
                error.to_string(),
            )));
            return None;
        }

        if self.attempt < self.settings.max_retries {
            self.attempt += 1;
            let delay = self.settings.backoff_delay(self.attempt);
            self.retry_at = Some(deadline_after(now, delay));
            // The retry picks up the newest document, no separate debounce
            self.debounce_at = None;
            self.phase = Phase::RetryWaiting;
            info!(
                "Retrying save in {:?} (attempt {}/{})",
                delay, self.attempt, self.settings.max_retries
            );
            return Some(delay);
        }

        warn!("Giving up after {} retries", self.attempt);
        self.attempt = 0;
        self.retry_at = None;
        self.phase = Phase::Failed;
        self.emit(AutosaveEvent::Notice(SaveNotice::ManualSyncRequired(
            error.to_string(),
        )));
        None
    }

    /// Returns whether the local write succeeded
    fn write_local(&self, snapshot: &DocumentSnapshot) -> bool {
        match self.local.write(&self.owner, snapshot) {
            Ok(()) => true,
            Err(e) => {
                warn!("Local snapshot write failed: {}", e);
                let detail = match e.recovery_suggestion() {
                    Some(hint) => format!("{}. {}", e, hint),
                    None => e.to_string(),
                };
                self.emit(AutosaveEvent::Notice(SaveNotice::LocalWriteFailed(detail)));
                false
            }
        }
    }

    fn set_status(&self, status: SaveStatus) {
        let changed = self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            self.emit(AutosaveEvent::StatusChanged(status));
        }
    }

    fn emit(&self, event: AutosaveEvent) {
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::document::MonthSection;
    use crate::storage::{MemorySnapshotStore, StorageError, StorageResult};
    use crate::sync::error::SyncResult;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    /// Remote store that records calls and fails on demand
    #[derive(Default)]
    pub(crate) struct ScriptedRemote {
        script: Mutex<VecDeque<SyncError>>,
        calls: Mutex<Vec<DocumentSnapshot>>,
        stored: Mutex<Option<DocumentSnapshot>>,
    }

    impl ScriptedRemote {
        /// Fail the next `n` upserts with a transport error
        pub(crate) fn fail_next(&self, n: usize) {
            let mut script = self.script.lock().unwrap();
            for _ in 0..n {
                script.push_back(SyncError::Transport("connection reset".into()));
            }
        }

        pub(crate) fn fail_next_with(&self, error: SyncError) {
            self.script.lock().unwrap().push_back(error);
        }

        pub(crate) fn calls(&self) -> Vec<DocumentSnapshot> {
            self.calls.lock().unwrap().clone()
        }

        pub(crate) fn stored(&self) -> Option<DocumentSnapshot> {
            self.stored.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteStore for ScriptedRemote {
        async fn upsert(&self, snapshot: &DocumentSnapshot) -> SyncResult<RemoteReceipt> {
            self.calls.lock().unwrap().push(snapshot.clone());
            if let Some(error) = self.script.lock().unwrap().pop_front() {
                return Err(error);
            }
            *self.stored.lock().unwrap() = Some(snapshot.clone());
            Ok(RemoteReceipt {
                owner: snapshot.owner,
                updated_at: Utc::now(),
            })
        }

        async fn fetch(&self, _owner: &OwnerId) -> SyncResult<Option<DocumentSnapshot>> {
            Ok(self.stored())
        }
    }

    type TestController = AutosaveController<Arc<ScriptedRemote>, Arc<MemorySnapshotStore>>;

    fn doc(title: &str) -> PlanDocument {
        let mut doc = PlanDocument::new();
        doc.add_month(MonthSection::new(title));
        doc
    }

    fn title(snapshot: &DocumentSnapshot) -> &str {
        &snapshot.document.months()[0].title
    }

    fn controller(online: bool) -> (TestController, Arc<ScriptedRemote>, Arc<MemorySnapshotStore>) {
        let remote = Arc::new(ScriptedRemote::default());
        let local = Arc::new(MemorySnapshotStore::new());
        let controller = AutosaveController::new(
            Uuid::new_v4(),
            remote.clone(),
            local.clone(),
            AutosaveSettings::default(),
            online,
        );
        (controller, remote, local)
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn statuses(rx: &mut mpsc::UnboundedReceiver<AutosaveEvent>) -> Vec<SaveStatus> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let AutosaveEvent::StatusChanged(s) = event {
                out.push(s);
            }
        }
        out
    }

    fn notices(rx: &mut mpsc::UnboundedReceiver<AutosaveEvent>) -> Vec<SaveNotice> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let AutosaveEvent::Notice(n) = event {
                out.push(n);
            }
        }
        out
    }

    #[test]
    fn test_backoff_delays() {
        let settings = AutosaveSettings::default();
        assert_eq!(settings.backoff_delay(1), secs(2));
        assert_eq!(settings.backoff_delay(2), secs(4));
        assert_eq!(settings.backoff_delay(3), secs(8));
    }

    #[tokio::test]
    async fn test_extreme_timing_is_capped() {
        let config = Config {
            debounce_ms: u64::MAX,
            backoff_base_secs: u64::MAX,
            max_retries: u32::MAX,
            ..Config::default()
        };
        let settings = AutosaveSettings::from_config(&config);
        assert_eq!(settings.debounce, MAX_DELAY);
        assert_eq!(settings.backoff_delay(1), MAX_DELAY);
        assert_eq!(settings.backoff_delay(u32::MAX), MAX_DELAY);

        // Hand-built settings bypass from_config and are clamped on use
        let remote = Arc::new(ScriptedRemote::default());
        remote.fail_next(1);
        let mut c = AutosaveController::new(
            Uuid::new_v4(),
            remote,
            Arc::new(MemorySnapshotStore::new()),
            AutosaveSettings {
                debounce: Duration::MAX,
                ..settings
            },
            true,
        );
        let t0 = Instant::now();

        c.edit(doc("later"), t0);
        assert_eq!(c.next_deadline(), Some(t0 + MAX_DELAY));

        let outcome = c.save_now(t0).await;
        assert!(matches!(
            outcome,
            FlushOutcome::Failed { retry_in: Some(d), .. } if d == MAX_DELAY
        ));
        assert_eq!(c.next_deadline(), Some(t0 + MAX_DELAY));
    }

    #[tokio::test]
    async fn test_edits_within_window_coalesce() {
        let (mut c, remote, _) = controller(true);
        let t0 = Instant::now();

        c.edit(doc("one"), t0);
        c.edit(doc("two"), t0 + ms(500));
        c.edit(doc("three"), t0 + ms(1500));
        assert!(c.has_unsaved_changes());
        assert_eq!(c.phase(), Phase::Debouncing);

        // The first edit's window has passed but the timer was reset
        assert!(c.tick(t0 + ms(2000)).await.is_none());
        assert!(remote.calls().is_empty());

        assert_eq!(c.next_deadline(), Some(t0 + ms(3500)));
        let outcome = c.tick(t0 + ms(3500)).await.unwrap();
        assert!(matches!(outcome, FlushOutcome::Saved(_)));

        let calls = remote.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(title(&calls[0]), "three");
        assert!(!c.has_unsaved_changes());
        assert_eq!(c.status(), SaveStatus::Saved);
        assert_eq!(c.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_offline_flush_writes_locally_only() {
        let (mut c, remote, local) = controller(false);
        let t0 = Instant::now();

        c.edit(doc("Month A"), t0);
        let outcome = c.tick(t0 + secs(2)).await.unwrap();

        assert_eq!(outcome, FlushOutcome::Queued);
        assert!(remote.calls().is_empty());
        assert_eq!(c.status(), SaveStatus::Local);
        assert_eq!(c.phase(), Phase::Local);
        assert!(!c.has_unsaved_changes());

        let stored = local.read(c.owner()).unwrap().unwrap();
        assert_eq!(title(&stored), "Month A");
        assert_eq!(title(c.queued().unwrap()), "Month A");
    }

    #[tokio::test]
    async fn test_offline_queue_keeps_only_newest() {
        let (mut c, _, _) = controller(false);
        let t0 = Instant::now();

        c.edit(doc("first"), t0);
        c.tick(t0 + secs(2)).await;
        c.edit(doc("second"), t0 + secs(3));
        c.tick(t0 + secs(5)).await;

        assert_eq!(title(c.queued().unwrap()), "second");
    }

    #[tokio::test]
    async fn test_reconnect_drains_queue_before_newer_edit() {
        let (mut c, remote, _) = controller(false);
        let mut events = c.take_events().unwrap();
        let t0 = Instant::now();

        c.edit(doc("queued"), t0);
        c.tick(t0 + secs(2)).await;
        // Newer edit still inside its debounce window
        c.edit(doc("newer"), t0 + secs(3));
        statuses(&mut events);

        let outcome = c.set_online(true, t0 + secs(4)).await.unwrap();
        assert!(matches!(outcome, FlushOutcome::Saved(_)));
        assert!(c.queued().is_none());
        assert_eq!(statuses(&mut events), vec![SaveStatus::Syncing, SaveStatus::Saved]);

        let calls = remote.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(title(&calls[0]), "queued");

        // The newer edit is still pending and flushes on its own deadline
        assert!(c.has_unsaved_changes());
        assert_eq!(c.phase(), Phase::Debouncing);
        c.tick(t0 + secs(5)).await.unwrap();

        let calls = remote.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(title(&calls[1]), "newer");
        assert!(!c.has_unsaved_changes());
    }

    #[tokio::test]
    async fn test_failed_reconnect_drain_retries_current_document() {
        let (mut c, remote, local) = controller(false);
        let mut events = c.take_events().unwrap();
        let t0 = Instant::now();

        c.edit(doc("offline"), t0);
        c.tick(t0 + secs(2)).await;
        assert!(!c.has_unsaved_changes());
        statuses(&mut events);

        remote.fail_next(1);
        let outcome = c.set_online(true, t0 + secs(10)).await.unwrap();
        assert!(matches!(
            outcome,
            FlushOutcome::Failed { retry_in: Some(d), .. } if d == secs(2)
        ));
        assert_eq!(statuses(&mut events), vec![SaveStatus::Syncing, SaveStatus::Failed]);
        assert!(c.queued().is_none());
        assert!(c.has_unsaved_changes());
        assert_eq!(c.phase(), Phase::RetryWaiting);
        assert_eq!(title(&local.read(c.owner()).unwrap().unwrap()), "offline");

        // The retry writes the current document
        c.tick(t0 + secs(12)).await.unwrap();
        let calls = remote.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(title(&calls[1]), "offline");
        assert_eq!(c.status(), SaveStatus::Saved);
        assert!(!c.has_unsaved_changes());
    }

    #[tokio::test]
    async fn test_auth_failure_during_drain_keeps_pending_marker() {
        let (mut c, remote, local) = controller(false);
        let mut events = c.take_events().unwrap();
        let t0 = Instant::now();

        c.edit(doc("offline"), t0);
        c.tick(t0 + secs(2)).await;
        // Newer edit still debouncing when the connection returns
        c.edit(doc("newer"), t0 + secs(3));

        remote.fail_next_with(SyncError::Unauthorized("JWT expired".into()));
        let outcome = c.set_online(true, t0 + secs(4)).await.unwrap();

        assert!(matches!(outcome, FlushOutcome::Failed { retry_in: None, .. }));
        assert_eq!(c.phase(), Phase::Failed);
        assert_eq!(c.status(), SaveStatus::Failed);
        assert!(c.queued().is_none());
        assert!(c.has_unsaved_changes());
        assert!(c.needs_flush());
        // The backup holds the newest document, not the drained one
        assert_eq!(title(&local.read(c.owner()).unwrap().unwrap()), "newer");
        assert!(matches!(
            notices(&mut events).as_slice(),
            [SaveNotice::AuthenticationRequired(_)]
        ));
    }

    #[tokio::test]
    async fn test_reconnect_without_queue_is_noop() {
        let (mut c, remote, _) = controller(false);
        assert!(c.set_online(true, Instant::now()).await.is_none());
        assert!(c.set_online(true, Instant::now()).await.is_none());
        assert!(remote.calls().is_empty());
        assert!(c.is_online());
    }

    #[tokio::test]
    async fn test_unchanged_content_is_not_rewritten() {
        let (mut c, remote, _) = controller(true);
        let t0 = Instant::now();

        let same = doc("same");
        c.edit(same.clone(), t0);
        c.tick(t0 + secs(2)).await;
        c.edit(same, t0 + secs(3));
        assert!(!c.has_unsaved_changes());

        let outcome = c.tick(t0 + secs(5)).await.unwrap();
        assert_eq!(outcome, FlushOutcome::Skipped);
        assert_eq!(remote.calls().len(), 1);
        assert_eq!(c.status(), SaveStatus::Saved);

        // A manual save is forced through
        let outcome = c.save_now(t0 + secs(6)).await;
        assert!(matches!(outcome, FlushOutcome::Saved(_)));
        assert_eq!(remote.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_backoff_sequence_then_stop() {
        let (mut c, remote, _) = controller(true);
        let mut events = c.take_events().unwrap();
        remote.fail_next(4);
        let t0 = Instant::now();

        c.edit(doc("doomed"), t0);
        let mut now = t0 + secs(2);
        let outcome = c.tick(now).await.unwrap();
        assert!(matches!(
            outcome,
            FlushOutcome::Failed { retry_in: Some(d), .. } if d == secs(2)
        ));
        assert_eq!(c.phase(), Phase::RetryWaiting);
        assert_eq!(c.status(), SaveStatus::Failed);

        for (attempt, delay) in [(1, 2), (2, 4), (3, 8)] {
            assert_eq!(c.attempt(), attempt);
            assert_eq!(c.next_deadline(), Some(now + secs(delay)));
            // Not yet due
            assert!(c.tick(now + secs(delay) - ms(1)).await.is_none());
            now += secs(delay);
            c.tick(now).await.unwrap();
        }

        assert_eq!(remote.calls().len(), 4);
        assert_eq!(c.attempt(), 0);
        assert_eq!(c.phase(), Phase::Failed);
        assert_eq!(c.status(), SaveStatus::Failed);
        assert!(c.next_deadline().is_none());
        assert!(c.has_unsaved_changes());
        assert!(matches!(
            notices(&mut events).as_slice(),
            [SaveNotice::ManualSyncRequired(_)]
        ));

        // Nothing more happens on its own
        assert!(c.tick(now + secs(60)).await.is_none());
        assert_eq!(remote.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_backoff_restarts_after_exhaustion() {
        let (mut c, remote, _) = controller(true);
        remote.fail_next(5);
        let t0 = Instant::now();

        c.edit(doc("x"), t0);
        let mut now = t0 + secs(2);
        c.tick(now).await;
        for delay in [2, 4, 8] {
            now += secs(delay);
            c.tick(now).await;
        }
        assert_eq!(c.phase(), Phase::Failed);

        c.edit(doc("y"), now);
        let outcome = c.tick(now + secs(2)).await.unwrap();
        assert!(matches!(
            outcome,
            FlushOutcome::Failed { retry_in: Some(d), .. } if d == secs(2)
        ));
        assert_eq!(c.attempt(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_is_kept_locally() {
        let (mut c, remote, local) = controller(true);
        remote.fail_next(1);
        let t0 = Instant::now();

        c.edit(doc("precious"), t0);
        c.tick(t0 + secs(2)).await;

        assert!(remote.stored().is_none());
        let stored = local.read(c.owner()).unwrap().unwrap();
        assert_eq!(title(&stored), "precious");
        assert!(c.has_unsaved_changes());
    }

    struct ReadOnlyDisk;

    impl SnapshotStore for ReadOnlyDisk {
        fn write(&self, _owner: &OwnerId, _snapshot: &DocumentSnapshot) -> StorageResult<()> {
            Err(StorageError::write(
                "/data/snapshots/backup.json",
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            ))
        }

        fn read(&self, _owner: &OwnerId) -> StorageResult<Option<DocumentSnapshot>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_local_write_failure_notice_suggests_fix() {
        let mut c = AutosaveController::new(
            Uuid::new_v4(),
            Arc::new(ScriptedRemote::default()),
            ReadOnlyDisk,
            AutosaveSettings::default(),
            false,
        );
        let mut events = c.take_events().unwrap();
        let t0 = Instant::now();

        c.edit(doc("x"), t0);
        assert_eq!(c.tick(t0 + secs(2)).await, Some(FlushOutcome::Queued));
        // Still queued in memory, so the marker stays set
        assert!(c.has_unsaved_changes());

        let notices = notices(&mut events);
        let [SaveNotice::LocalWriteFailed(detail)] = notices.as_slice() else {
            panic!("expected one local write notice, got {:?}", notices);
        };
        assert!(detail.contains("backup.json"));
        assert!(detail.contains("permissions"));
    }

    #[tokio::test]
    async fn test_successful_write_is_mirrored_locally() {
        let (mut c, _, local) = controller(true);
        let t0 = Instant::now();

        c.edit(doc("backup"), t0);
        c.tick(t0 + secs(2)).await;

        let stored = local.read(c.owner()).unwrap().unwrap();
        assert_eq!(title(&stored), "backup");
        assert_eq!(c.last_saved_hash(), Some(stored.content_hash()));
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let (mut c, remote, _) = controller(true);
        let mut events = c.take_events().unwrap();
        remote.fail_next_with(SyncError::Unauthorized("JWT expired".into()));
        let t0 = Instant::now();

        c.edit(doc("x"), t0);
        let outcome = c.tick(t0 + secs(2)).await.unwrap();

        assert!(matches!(outcome, FlushOutcome::Failed { retry_in: None, .. }));
        assert_eq!(c.phase(), Phase::Failed);
        assert!(c.next_deadline().is_none());
        assert!(matches!(
            notices(&mut events).as_slice(),
            [SaveNotice::AuthenticationRequired(_)]
        ));
    }

    #[tokio::test]
    async fn test_edit_during_backoff_rides_on_retry() {
        let (mut c, remote, _) = controller(true);
        remote.fail_next(1);
        let t0 = Instant::now();

        c.edit(doc("old"), t0);
        c.tick(t0 + secs(2)).await;
        let retry_at = c.next_deadline().unwrap();

        c.edit(doc("new"), t0 + secs(3));
        // Retry deadline untouched, no debounce armed
        assert_eq!(c.next_deadline(), Some(retry_at));
        assert_eq!(c.phase(), Phase::RetryWaiting);

        c.tick(retry_at).await.unwrap();
        let calls = remote.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(title(&calls[1]), "new");
        assert_eq!(c.status(), SaveStatus::Saved);
        assert_eq!(c.attempt(), 0);
    }

    #[tokio::test]
    async fn test_save_now_skips_debounce() {
        let (mut c, remote, _) = controller(true);
        let t0 = Instant::now();

        c.edit(doc("now"), t0);
        let outcome = c.save_now(t0 + ms(10)).await;

        assert!(matches!(outcome, FlushOutcome::Saved(_)));
        assert_eq!(remote.calls().len(), 1);
        assert!(c.next_deadline().is_none());
        // The cancelled debounce does not fire later
        assert!(c.tick(t0 + secs(5)).await.is_none());
    }

    #[tokio::test]
    async fn test_save_now_without_document() {
        let (mut c, remote, _) = controller(true);
        assert_eq!(c.save_now(Instant::now()).await, FlushOutcome::Skipped);
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_seeded_snapshot() {
        let (c, _, _) = controller(true);
        let owner = *c.owner();
        let confirmed = c.with_snapshot(DocumentSnapshot::new(owner, doc("remote")), true);
        assert!(!confirmed.has_unsaved_changes());
        assert!(!confirmed.needs_flush());
        assert!(confirmed.last_saved_hash().is_some());

        let (c, _, _) = controller(true);
        let owner = *c.owner();
        let backup = c.with_snapshot(DocumentSnapshot::new(owner, doc("backup")), false);
        assert!(backup.has_unsaved_changes());
        assert!(backup.needs_flush());
    }

    #[tokio::test]
    async fn test_offline_then_online_scenario() {
        let (mut c, remote, local) = controller(false);
        let mut events = c.take_events().unwrap();
        let t0 = Instant::now();

        // Offline edit
        c.edit(doc("Month A"), t0);
        c.tick(t0 + secs(2)).await;
        assert_eq!(c.status(), SaveStatus::Local);
        assert_eq!(title(&local.read(c.owner()).unwrap().unwrap()), "Month A");

        // Reconnect
        statuses(&mut events);
        c.set_online(true, t0 + secs(10)).await;
        assert_eq!(statuses(&mut events), vec![SaveStatus::Syncing, SaveStatus::Saved]);
        assert_eq!(title(&remote.stored().unwrap()), "Month A");

        // Online edit that fails twice, then succeeds
        remote.fail_next(2);
        let t1 = t0 + secs(20);
        c.edit(doc("Month B"), t1);
        c.tick(t1 + secs(2)).await;
        c.tick(t1 + secs(4)).await;
        c.tick(t1 + secs(8)).await;

        assert_eq!(remote.calls().len(), 4);
        assert_eq!(title(&remote.stored().unwrap()), "Month B");
        assert_eq!(c.status(), SaveStatus::Saved);
        assert_eq!(c.attempt(), 0);
        assert!(!c.has_unsaved_changes());
    }
}

//! Background autosave task
//!
//! Owns an [`AutosaveController`] and drives it from three sources: editor
//! commands, connectivity changes and the controller's own deadlines. The
//! controller never sees wall-clock time except through the instants passed
//! in here.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use super::connectivity::ConnectivityMonitor;
use super::controller::{AutosaveController, AutosaveEvent, SaveStatus};
use super::remote::RemoteStore;
use crate::document::PlanDocument;
use crate::storage::SnapshotStore;

/// Commands sent to the autosave task
#[derive(Debug, Clone)]
pub enum AutosaveCommand {
    /// The editor produced a new document
    Edit(PlanDocument),
    /// Flush now, ignoring the debounce
    SaveNow,
    /// Flush anything pending and stop
    Shutdown,
}

/// Handle to control the autosave task
pub struct AutosaveHandle {
    /// Send commands to the task
    pub command_tx: mpsc::Sender<AutosaveCommand>,
    /// Receive status changes and notices
    pub event_rx: mpsc::UnboundedReceiver<AutosaveEvent>,
    /// Watch the save status
    pub status_rx: watch::Receiver<SaveStatus>,
    task: JoinHandle<()>,
}

impl AutosaveHandle {
    /// Report an edit
    pub async fn edit(&self, document: PlanDocument) -> bool {
        self.command_tx
            .send(AutosaveCommand::Edit(document))
            .await
            .is_ok()
    }

    pub async fn save_now(&self) -> bool {
        self.command_tx.send(AutosaveCommand::SaveNow).await.is_ok()
    }

    pub fn status(&self) -> SaveStatus {
        *self.status_rx.borrow()
    }

    /// Stop the task after it flushes, returning the final status and any
    /// events not yet consumed
    pub async fn shutdown(mut self) -> (SaveStatus, Vec<AutosaveEvent>) {
        let _ = self.command_tx.send(AutosaveCommand::Shutdown).await;
        let _ = self.task.await;

        let mut events = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            events.push(event);
        }
        (*self.status_rx.borrow(), events)
    }
}

/// Spawn the autosave task
pub fn spawn_autosave_task<R, S>(
    mut controller: AutosaveController<R, S>,
    monitor: &ConnectivityMonitor,
) -> AutosaveHandle
where
    R: RemoteStore + 'static,
    S: SnapshotStore + 'static,
{
    let (command_tx, command_rx) = mpsc::channel(32);
    let event_rx = controller
        .take_events()
        .unwrap_or_else(|| mpsc::unbounded_channel().1);
    let status_rx = controller.subscribe_status();
    let online_rx = monitor.subscribe();

    let task = tokio::spawn(autosave_loop(controller, command_rx, online_rx));

    AutosaveHandle {
        command_tx,
        event_rx,
        status_rx,
        task,
    }
}

async fn autosave_loop<R, S>(
    mut controller: AutosaveController<R, S>,
    mut command_rx: mpsc::Receiver<AutosaveCommand>,
    mut online_rx: watch::Receiver<bool>,
) where
    R: RemoteStore,
    S: SnapshotStore,
{
    let initial = *online_rx.borrow_and_update();
    if initial != controller.is_online() {
        controller.set_online(initial, Instant::now()).await;
    }
    let mut monitor_alive = true;

    loop {
        let deadline = controller.next_deadline();

        tokio::select! {
            cmd = command_rx.recv() => {
                match cmd {
                    Some(AutosaveCommand::Edit(document)) => {
                        controller.edit(document, Instant::now());
                    }
                    Some(AutosaveCommand::SaveNow) => {
                        controller.save_now(Instant::now()).await;
                    }
                    Some(AutosaveCommand::Shutdown) | None => {
                        if controller.needs_flush() {
                            debug!("Flushing before shutdown");
                            controller.save_now(Instant::now()).await;
                        }
                        break;
                    }
                }
            }
            changed = online_rx.changed(), if monitor_alive => {
                if changed.is_err() {
                    // Monitor dropped; keep the last known state
                    monitor_alive = false;
                    continue;
                }
                let online = *online_rx.borrow_and_update();
                controller.set_online(online, Instant::now()).await;
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                controller.tick(Instant::now()).await;
            }
        }
    }

    info!("Autosave task stopped ({})", controller.status());
}

//! Sync command handler

use anyhow::{bail, Result};

use cadence_core::sync::FlushOutcome;
use cadence_core::Session;

use crate::output::{notice_text, Output};

/// Push the local backup to the remote store
pub async fn sync(session: &Session, output: &Output) -> Result<()> {
    if !session.monitor().is_online() {
        bail!("Cannot sync while offline. Run without --offline.");
    }

    output.message("Syncing local backup...");
    let report = session.sync_backup().await?;

    for notice in &report.notices {
        eprintln!("⚠ {}", notice_text(notice));
    }

    match report.outcome {
        FlushOutcome::Skipped => output.success("Already up to date"),
        FlushOutcome::Saved(receipt) => output.success(&format!(
            "Sync complete ({})",
            receipt.updated_at.format("%Y-%m-%d %H:%M:%S")
        )),
        FlushOutcome::Queued => output.message("Still offline, kept locally"),
        FlushOutcome::Failed { error, .. } => {
            bail!("Sync failed: {}", error);
        }
    }

    Ok(())
}

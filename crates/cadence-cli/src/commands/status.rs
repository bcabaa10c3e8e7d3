//! Status command handler

use anyhow::Result;

use cadence_core::{DocumentSource, RemoteTarget, Session};

use crate::output::{Output, OutputFormat};

/// Show status information
pub fn show(session: &Session, output: &Output) -> Result<()> {
    let config = session.config();
    let remote = RemoteTarget::from_config(config)?.describe();
    let backup = session.local_backup()?;
    let hash = session.snapshot().content_hash();

    // A backup that differs from a remote copy still has to be pushed
    let backup_pending = match (&backup, session.source()) {
        (Some(b), DocumentSource::Remote) => b.content_hash() != hash,
        (Some(_), _) => true,
        (None, _) => false,
    };

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "owner_id": session.owner(),
                    "remote": remote,
                    "online": session.monitor().is_online(),
                    "source": session.source().as_str(),
                    "remote_error": session.remote_error().map(|e| e.to_string()),
                    "document": {
                        "months": session.document().months().len(),
                        "hash": hash.to_hex(),
                        "updated_at": session.snapshot().updated_at
                    },
                    "local_backup": {
                        "path": session.local().path_for(session.owner()),
                        "exists": backup.is_some(),
                        "pending": backup_pending
                    }
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", session.owner());
        }
        OutputFormat::Human => {
            println!("Cadence Status");
            println!("==============");
            println!();
            println!("Owner: {}", session.owner());
            println!();
            println!("Remote:");
            println!("  Store:  {}", remote);
            println!(
                "  Mode:   {}",
                if session.monitor().is_online() {
                    "online"
                } else {
                    "offline"
                }
            );
            if let Some(e) = session.remote_error() {
                println!("  Error:  {}", e);
            }
            println!();
            println!("Document:");
            println!("  Loaded from: {}", session.source().as_str());
            println!("  Months:      {}", session.document().months().len());
            println!("  Hash:        {}", hash.short());
            println!();
            println!("Local backup:");
            println!(
                "  Path:   {}",
                session.local().path_for(session.owner()).display()
            );
            match backup {
                Some(b) => {
                    println!("  Saved:  {}", b.updated_at.format("%Y-%m-%d %H:%M"));
                    if backup_pending {
                        println!("  Not yet on the remote store, run `cadence sync`");
                    }
                }
                None => println!("  (none)"),
            }
        }
    }

    Ok(())
}

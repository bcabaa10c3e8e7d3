//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use cadence_core::{AutosaveEvent, PlanDocument, SaveNotice, SaveStatus, WeekEntry};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print the whole plan
    pub fn print_plan(&self, doc: &PlanDocument) {
        match self.format {
            OutputFormat::Human => {
                if doc.months().is_empty() {
                    println!("No months planned yet.");
                    return;
                }
                for (i, month) in doc.months().iter().enumerate() {
                    if i > 0 {
                        println!();
                    }
                    println!("{}. {}", i + 1, month.title);
                    if !month.goal.is_empty() {
                        println!("   Goal: {}", month.goal);
                    }
                    for (w, week) in month.weeks.iter().enumerate() {
                        println!("   Week {}  {}", w + 1, week_summary(week));
                    }
                }
                println!("\n{} month(s)", doc.months().len());
            }
            OutputFormat::Json => match serde_json::to_string_pretty(doc) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("Failed to encode plan: {}", e),
            },
            OutputFormat::Quiet => {
                for month in doc.months() {
                    println!("{}", month.title);
                }
            }
        }
    }

    /// Report how an edit was persisted
    pub fn print_save(&self, status: SaveStatus, events: &[AutosaveEvent]) {
        let notices: Vec<&SaveNotice> = events
            .iter()
            .filter_map(|e| match e {
                AutosaveEvent::Notice(n) => Some(n),
                AutosaveEvent::StatusChanged(_) => None,
            })
            .collect();

        match self.format {
            OutputFormat::Human => {
                println!("{}", status_line(status));
                for notice in notices {
                    eprintln!("⚠ {}", notice_text(notice));
                }
            }
            OutputFormat::Json => {
                let notices: Vec<String> = notices.into_iter().map(notice_text).collect();
                println!(
                    "{}",
                    serde_json::json!({"save_status": status, "notices": notices})
                );
            }
            OutputFormat::Quiet => {
                for notice in notices {
                    eprintln!("{}", notice_text(notice));
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// Human label for a save status
pub fn status_line(status: SaveStatus) -> &'static str {
    match status {
        SaveStatus::Saved => "✓ Saved",
        SaveStatus::Saving => "… Saving",
        SaveStatus::Syncing => "… Syncing",
        SaveStatus::Local => "● Saved locally (offline)",
        SaveStatus::Failed => "✗ Save failed (kept locally)",
    }
}

pub fn notice_text(notice: &SaveNotice) -> String {
    match notice {
        SaveNotice::AuthenticationRequired(detail) => {
            format!("Session expired, sign in again ({})", detail)
        }
        SaveNotice::ManualSyncRequired(detail) => {
            format!("Could not reach the server, run `cadence sync` later ({})", detail)
        }
        SaveNotice::LocalWriteFailed(detail) => {
            format!("Local backup could not be written ({})", detail)
        }
    }
}

/// One-line summary of a week, blank fields skipped
fn week_summary(week: &WeekEntry) -> String {
    if week.is_blank() {
        return "-".to_string();
    }
    [&week.theme, &week.posts, &week.notes]
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| truncate(s, 30))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

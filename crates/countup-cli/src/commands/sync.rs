use clap::Subcommand;
use countup_core::Event;
use serde_json::json;

use super::CliResult;
use crate::context::App;

#[derive(Subcommand)]
pub enum SyncAction {
    /// Two-way sync with the remote sheet
    Now,
    /// Merge remote rows into local timers without writing (read-only keys work)
    Pull,
    /// Overwrite the remote sheet with local timers
    Push,
    /// Print sync status as JSON
    Status,
}

fn summary(event: Option<Event>) -> serde_json::Value {
    match event {
        Some(Event::Reconciled {
            adopted, appended, ..
        }) => json!({ "adopted": adopted.len(), "appended": appended.len() }),
        _ => json!({ "adopted": 0, "appended": 0 }),
    }
}

pub async fn run(action: SyncAction) -> CliResult {
    let mut app = App::open()?;

    match action {
        SyncAction::Now => {
            let timers = app.engine.timers().to_vec();
            let merged = app.auto.sync_now(&timers).await?;
            let count = merged.len();
            let changes = summary(app.engine.reconcile(merged));
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "type": "synced",
                    "timers": count,
                    "changes": changes,
                }))?
            );
        }
        SyncAction::Pull => {
            let remote = app.sync.fetch_remote().await?;
            let count = remote.len();
            let changes = summary(app.engine.reconcile(remote));
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "type": "pulled",
                    "remote_rows": count,
                    "changes": changes,
                }))?
            );
        }
        SyncAction::Push => {
            let timers = app.engine.timers().to_vec();
            app.sync.push(&timers).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "type": "pushed",
                    "timers": timers.len(),
                }))?
            );
        }
        SyncAction::Status => {
            let status = app.sync.status();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "last_sync_at": status.last_sync_at,
                    "in_progress": status.in_progress,
                    "configured": status.configured,
                    "writable": status.writable,
                    "auto_sync": app.config.sync.enabled,
                    "spreadsheet_id": app.config.sync.spreadsheet_id,
                }))?
            );
        }
    }

    app.finish().await
}

mod config;
pub mod kv;
pub mod secrets;

pub use config::{AuthMode, Config, SyncConfig};
pub use kv::{KvStore, MemoryKvStore, SqliteKvStore};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Persistence key for the timer collection.
pub const KEY_TIMERS: &str = "timers";
/// Persistence key for the active timer id.
pub const KEY_ACTIVE_TIMER_ID: &str = "activeTimerId";
/// Persistence key for the widget projection.
pub const KEY_WIDGET_STATE: &str = "widgetState";
/// Persistence key for the last successful sync time.
pub const KEY_LAST_SYNC_AT: &str = "lastSyncAt";

/// Returns `~/.config/countup[-dev]/` based on COUNTUP_ENV.
///
/// Set COUNTUP_ENV=dev to use the development data directory, or
/// COUNTUP_DATA_DIR to point somewhere else entirely.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("COUNTUP_DATA_DIR") {
        Some(custom) => PathBuf::from(custom),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("COUNTUP_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("countup-dev")
            } else {
                base_dir.join("countup")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}

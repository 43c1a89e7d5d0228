use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Every state change in the engine produces an Event.
/// Commands return it; the CLI prints it as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TimerAdded {
        id: Uuid,
        name: String,
        at: DateTime<Utc>,
    },
    TimerStarted {
        id: Uuid,
        /// Timer that was force-paused to keep a single timer running.
        paused_other: Option<Uuid>,
        at: DateTime<Utc>,
    },
    TimerPaused {
        id: Uuid,
        elapsed_secs: f64,
        at: DateTime<Utc>,
    },
    TimerStopped {
        id: Uuid,
        elapsed_secs: f64,
        at: DateTime<Utc>,
    },
    TimerReset {
        id: Uuid,
        at: DateTime<Utc>,
    },
    TimerRenamed {
        id: Uuid,
        name: String,
        at: DateTime<Utc>,
    },
    ReferenceDurationChanged {
        id: Uuid,
        reference_duration_secs: u64,
        at: DateTime<Utc>,
    },
    TimerRemoved {
        id: Uuid,
        at: DateTime<Utc>,
    },
    /// The app reached the background.
    MovedToBackground {
        lock_screen: bool,
        /// Timer paused because the app was genuinely backgrounded.
        paused: Option<Uuid>,
        at: DateTime<Utc>,
    },
    /// A sync result was folded into the local collection.
    Reconciled {
        adopted: Vec<Uuid>,
        appended: Vec<Uuid>,
        at: DateTime<Utc>,
    },
}

//! Core types for remote synchronization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::timer::Timer;

/// Current sync status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Last successful sync timestamp.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Whether a sync is currently in progress.
    pub in_progress: bool,
    /// Whether any credential is set.
    pub configured: bool,
    /// Whether the credential may write to the remote store.
    pub writable: bool,
}

/// Result of a background sync, delivered to the engine's owner.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Merged collection to fold back in with `TimerEngine::reconcile`.
    Merged(Vec<Timer>),
    Failed(SyncError),
}

/// Counts from one merge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    pub adopted: usize,
    pub appended: usize,
    pub guarded: usize,
}

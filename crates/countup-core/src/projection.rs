//! Widget / lock-screen projection.
//!
//! The widget surface and the live activity never read the engine directly.
//! They render a small [`WidgetState`] that is recomputed and persisted after
//! every mutation, and the engine pushes live-activity transitions through
//! [`LiveActivity`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::timer::EngineState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetState {
    pub active_timer_id: Option<Uuid>,
    pub active_timer_name: Option<String>,
    pub elapsed_secs: f64,
    pub running: bool,
    pub last_updated: DateTime<Utc>,
}

impl WidgetState {
    /// Derive the projection for `state` as of `now`.
    pub fn derive(state: &EngineState, now: DateTime<Utc>) -> Self {
        match state.active() {
            Some(timer) => Self {
                active_timer_id: Some(timer.id),
                active_timer_name: Some(timer.name.clone()),
                elapsed_secs: timer.current_elapsed_secs(now),
                running: timer.running,
                last_updated: now,
            },
            None => Self {
                active_timer_id: None,
                active_timer_name: None,
                elapsed_secs: 0.0,
                running: false,
                last_updated: now,
            },
        }
    }
}

/// Outbound calls to the platform's live activity surface.
pub trait LiveActivity: Send + Sync {
    /// A timer started running and should be shown.
    fn started(&self, widget: &WidgetState);
    /// The shown timer paused; keep it visible.
    fn paused(&self, widget: &WidgetState);
    /// Remove the activity for `timer_id`.
    fn ended(&self, timer_id: Uuid);
    /// Remove every activity (process exit).
    fn end_all(&self);
}

/// Used when no live activity surface exists (the CLI, tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLiveActivity;

impl LiveActivity for NoLiveActivity {
    fn started(&self, _widget: &WidgetState) {}
    fn paused(&self, _widget: &WidgetState) {}
    fn ended(&self, _timer_id: Uuid) {}
    fn end_all(&self) {}
}

//! Timer entity and elapsed-time arithmetic.
//!
//! Elapsed time is never ticked forward. A running timer stores when its
//! current run began and `current_elapsed_ms` derives the total from the wall
//! clock on every read, so readers need no lock and no background task.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How long after a reset remote values are ignored for a timer.
pub const RESET_GUARD_SECS: i64 = 10;

/// A named count-up timer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timer {
    pub id: Uuid,
    pub name: String,
    /// Advisory target shown as progress. Never caps counting.
    #[serde(default)]
    pub reference_duration_secs: u64,
    /// Elapsed time banked while not running, in milliseconds.
    #[serde(default)]
    pub accumulated_ms: u64,
    #[serde(default)]
    pub running: bool,
    /// Start of the current run. Present iff `running`.
    #[serde(default)]
    pub run_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_reset_at: Option<DateTime<Utc>>,
}

impl Timer {
    pub fn new(name: impl Into<String>, reference_duration_secs: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            reference_duration_secs,
            accumulated_ms: 0,
            running: false,
            run_started_at: None,
            last_reset_at: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Milliseconds of the current run, or 0 when idle.
    ///
    /// A clock reading earlier than the run start contributes nothing.
    pub fn running_ms(&self, now: DateTime<Utc>) -> u64 {
        match (self.running, self.run_started_at) {
            (true, Some(started)) => (now - started).num_milliseconds().max(0) as u64,
            _ => 0,
        }
    }

    pub fn current_elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        self.accumulated_ms.saturating_add(self.running_ms(now))
    }

    pub fn current_elapsed_secs(&self, now: DateTime<Utc>) -> f64 {
        self.current_elapsed_ms(now) as f64 / 1000.0
    }

    /// Fraction of the reference duration elapsed. May exceed 1.0.
    pub fn progress(&self, now: DateTime<Utc>) -> f64 {
        if self.reference_duration_secs == 0 {
            return 0.0;
        }
        self.current_elapsed_secs(now) / self.reference_duration_secs as f64
    }

    pub fn exceeded(&self, now: DateTime<Utc>) -> bool {
        self.reference_duration_secs > 0
            && self.current_elapsed_ms(now) > self.reference_duration_secs.saturating_mul(1000)
    }

    /// Whether this timer was zeroed less than [`RESET_GUARD_SECS`] ago.
    pub fn reset_recently(&self, now: DateTime<Utc>) -> bool {
        self.last_reset_at
            .is_some_and(|at| now - at < Duration::seconds(RESET_GUARD_SECS))
    }

    // ── Transitions ──────────────────────────────────────────────────

    pub(crate) fn begin_run(&mut self, now: DateTime<Utc>) {
        self.running = true;
        self.run_started_at = Some(now);
    }

    /// Fold the current run into `accumulated_ms` and stop running.
    pub(crate) fn bank(&mut self, now: DateTime<Utc>) {
        self.accumulated_ms = self.current_elapsed_ms(now);
        self.running = false;
        self.run_started_at = None;
    }

    pub(crate) fn zero(&mut self, now: DateTime<Utc>) {
        self.accumulated_ms = 0;
        self.running = false;
        self.run_started_at = None;
        self.last_reset_at = Some(now);
    }

    /// Apply a remote elapsed value under the merge rule.
    ///
    /// A recent reset always wins, a running timer keeps its live clock, and
    /// otherwise the remote value is taken only when strictly greater.
    /// Returns whether the value was adopted.
    pub fn absorb_remote_elapsed(&mut self, remote_ms: u64, now: DateTime<Utc>) -> bool {
        if self.reset_recently(now) || self.running || remote_ms <= self.accumulated_ms {
            return false;
        }
        self.accumulated_ms = remote_ms;
        true
    }

    /// Drop any running state carried in from outside the engine.
    pub(crate) fn settle_as_idle(mut self) -> Self {
        self.running = false;
        self.run_started_at = None;
        self
    }
}

/// The authoritative local collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    /// Insertion order, used for display.
    pub timers: Vec<Timer>,
    /// The running timer, or the paused timer still shown on the widget.
    pub active_timer_id: Option<Uuid>,
}

impl EngineState {
    pub fn get(&self, id: Uuid) -> Option<&Timer> {
        self.timers.iter().find(|t| t.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: Uuid) -> Option<&mut Timer> {
        self.timers.iter_mut().find(|t| t.id == id)
    }

    pub fn running(&self) -> impl Iterator<Item = &Timer> {
        self.timers.iter().filter(|t| t.running)
    }

    pub fn active(&self) -> Option<&Timer> {
        self.active_timer_id.and_then(|id| self.get(id))
    }
}

//! Timer engine implementation.
//!
//! The engine owns the timer collection and is the only thing that mutates
//! it. Every command runs on the owner's context (`&mut self`), so there is
//! never more than one writer.
//!
//! ## Single active timer
//!
//! ```text
//! start(b) while a runs:  a.bank() -> b.begin_run() -> active = b
//! ```
//!
//! Both happen inside one call, so no caller ever observes two running timers.
//!
//! ## After every mutation
//!
//! 1. persist `timers`, `activeTimerId` and `widgetState`
//! 2. publish the new [`EngineState`] to subscribers
//! 3. ask the [`SyncTrigger`] for a (debounced) remote sync
//!
//! Unknown ids are no-ops: a concurrent merge may have removed a timer the
//! caller still shows.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use uuid::Uuid;

use super::lifecycle::{
    BrightnessLockDetector, LockScreenDetector, ResignRecord, TransitionSample,
};
use super::model::{EngineState, Timer};
use crate::clock::{Clock, SystemClock};
use crate::error::{StorageError, ValidationError};
use crate::events::Event;
use crate::projection::{LiveActivity, NoLiveActivity, WidgetState};
use crate::storage::{KvStore, KEY_ACTIVE_TIMER_ID, KEY_TIMERS, KEY_WIDGET_STATE};

/// Receives the collection after each local mutation.
pub trait SyncTrigger: Send + Sync {
    fn request_sync(&self, timers: &[Timer]);
}

/// Used when remote sync is off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSync;

impl SyncTrigger for NoSync {
    fn request_sync(&self, _timers: &[Timer]) {}
}

/// Collects the engine's collaborators, then loads persisted state.
pub struct EngineBuilder {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    activity: Arc<dyn LiveActivity>,
    sync: Arc<dyn SyncTrigger>,
    detector: Arc<dyn LockScreenDetector>,
}

impl EngineBuilder {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            activity: Arc::new(NoLiveActivity),
            sync: Arc::new(NoSync),
            detector: Arc::new(BrightnessLockDetector::default()),
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn live_activity(mut self, activity: Arc<dyn LiveActivity>) -> Self {
        self.activity = activity;
        self
    }

    pub fn sync_trigger(mut self, sync: Arc<dyn SyncTrigger>) -> Self {
        self.sync = sync;
        self
    }

    pub fn lock_detector(mut self, detector: Arc<dyn LockScreenDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// Load persisted state and repair any broken invariants.
    ///
    /// Missing or unreadable blobs start the engine empty rather than failing.
    pub fn build(self) -> TimerEngine {
        let now = self.clock.now();
        let mut state = EngineState {
            timers: read_blob::<Vec<Timer>>(self.store.as_ref(), KEY_TIMERS).unwrap_or_default(),
            active_timer_id: read_blob::<Option<Uuid>>(self.store.as_ref(), KEY_ACTIVE_TIMER_ID)
                .flatten(),
        };
        repair(&mut state, now);

        let (published, _) = watch::channel(state.clone());
        TimerEngine {
            state,
            store: self.store,
            clock: self.clock,
            activity: self.activity,
            sync: self.sync,
            detector: self.detector,
            resign: None,
            removed: HashSet::new(),
            published,
        }
    }
}

/// Core timer engine.
pub struct TimerEngine {
    state: EngineState,
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    activity: Arc<dyn LiveActivity>,
    sync: Arc<dyn SyncTrigger>,
    detector: Arc<dyn LockScreenDetector>,
    resign: Option<ResignRecord>,
    /// Ids deleted locally; a sync result must not bring them back.
    removed: HashSet<Uuid>,
    published: watch::Sender<EngineState>,
}

impl TimerEngine {
    pub fn builder(store: Arc<dyn KvStore>) -> EngineBuilder {
        EngineBuilder::new(store)
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn timers(&self) -> &[Timer] {
        &self.state.timers
    }

    pub fn timer(&self, id: Uuid) -> Option<&Timer> {
        self.state.get(id)
    }

    pub fn active_timer_id(&self) -> Option<Uuid> {
        self.state.active_timer_id
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn widget_state(&self) -> WidgetState {
        WidgetState::derive(&self.state, self.now())
    }

    /// Subscribe to the collection; a new value is sent after each mutation.
    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.published.subscribe()
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn add(
        &mut self,
        name: &str,
        reference_duration_secs: u64,
    ) -> Result<Event, ValidationError> {
        let name = validate_name(name)?;
        let now = self.now();
        let timer = Timer::new(name.clone(), reference_duration_secs);
        let id = timer.id;
        self.state.timers.push(timer);
        tracing::debug!(%id, %name, "timer added");
        self.commit(now);
        Ok(Event::TimerAdded { id, name, at: now })
    }

    pub fn start(&mut self, id: Uuid) -> Option<Event> {
        let now = self.now();
        if self.state.get(id)?.running {
            return None;
        }

        let mut paused_other = None;
        for other in self.state.timers.iter_mut().filter(|t| t.running) {
            other.bank(now);
            paused_other = Some(other.id);
        }

        let previous_active = self.state.active_timer_id.replace(id);
        self.state.get_mut(id)?.begin_run(now);

        if let Some(previous) = previous_active.filter(|p| *p != id) {
            self.activity.ended(previous);
        }
        self.activity.started(&WidgetState::derive(&self.state, now));

        tracing::debug!(%id, ?paused_other, "timer started");
        self.commit(now);
        Some(Event::TimerStarted {
            id,
            paused_other,
            at: now,
        })
    }

    pub fn pause(&mut self, id: Uuid) -> Option<Event> {
        let now = self.now();
        let elapsed_secs = self.pause_at(id, now)?;
        self.commit(now);
        Some(Event::TimerPaused {
            id,
            elapsed_secs,
            at: now,
        })
    }

    pub fn toggle(&mut self, id: Uuid) -> Option<Event> {
        if self.state.get(id)?.running {
            self.pause(id)
        } else {
            self.start(id)
        }
    }

    /// Deep-link intent from the widget surface.
    pub fn toggle_active_timer(&mut self) -> Option<Event> {
        let id = self.state.active_timer_id?;
        self.toggle(id)
    }

    /// Bank elapsed time and take the timer off the live surface.
    pub fn stop(&mut self, id: Uuid) -> Option<Event> {
        let now = self.now();
        let (changed, elapsed_secs) = self.stop_at(id, now)?;
        if !changed {
            return None;
        }
        self.commit(now);
        Some(Event::TimerStopped {
            id,
            elapsed_secs,
            at: now,
        })
    }

    pub fn reset(&mut self, id: Uuid) -> Option<Event> {
        let now = self.now();
        self.state.get_mut(id)?.zero(now);
        if self.state.active_timer_id == Some(id) {
            self.state.active_timer_id = None;
            self.activity.ended(id);
        }
        tracing::debug!(%id, "timer reset");
        self.commit(now);
        Some(Event::TimerReset { id, at: now })
    }

    pub fn rename(&mut self, id: Uuid, name: &str) -> Result<Option<Event>, ValidationError> {
        let name = validate_name(name)?;
        let now = self.now();
        let Some(timer) = self.state.get_mut(id) else {
            return Ok(None);
        };
        timer.name = name.clone();
        self.commit(now);
        Ok(Some(Event::TimerRenamed { id, name, at: now }))
    }

    pub fn set_reference_duration(&mut self, id: Uuid, secs: u64) -> Option<Event> {
        let now = self.now();
        self.state.get_mut(id)?.reference_duration_secs = secs;
        self.commit(now);
        Some(Event::ReferenceDurationChanged {
            id,
            reference_duration_secs: secs,
            at: now,
        })
    }

    /// Stop the timer if needed, then delete it.
    pub fn remove(&mut self, id: Uuid) -> Option<Event> {
        let now = self.now();
        self.stop_at(id, now)?;
        self.state.timers.retain(|t| t.id != id);
        self.removed.insert(id);
        tracing::debug!(%id, "timer removed");
        self.commit(now);
        Some(Event::TimerRemoved { id, at: now })
    }

    /// Fold a successful sync result into the current collection.
    ///
    /// The merge rule is re-applied against the current local timers because
    /// the user may have acted while the sync was in flight. This does not
    /// request another sync.
    pub fn reconcile(&mut self, merged: Vec<Timer>) -> Option<Event> {
        let now = self.now();
        let mut adopted = Vec::new();
        let mut appended = Vec::new();

        for remote in merged {
            match self.state.get_mut(remote.id) {
                Some(local) => {
                    if local.absorb_remote_elapsed(remote.accumulated_ms, now) {
                        adopted.push(local.id);
                    }
                }
                None if self.removed.contains(&remote.id) => {}
                None => {
                    appended.push(remote.id);
                    self.state.timers.push(remote.settle_as_idle());
                }
            }
        }

        if adopted.is_empty() && appended.is_empty() {
            return None;
        }
        tracing::info!(adopted = adopted.len(), appended = appended.len(), "reconciled sync result");
        self.persist_logged(now);
        self.published.send_replace(self.state.clone());
        Some(Event::Reconciled {
            adopted,
            appended,
            at: now,
        })
    }

    /// Persist the current state, surfacing any error.
    ///
    /// # Errors
    /// Returns the first storage error hit.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.persist(self.now())
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    pub fn will_resign_active(&mut self, brightness: f64) {
        let at = self.now();
        tracing::debug!(brightness, "will resign active");
        self.resign = Some(ResignRecord { brightness, at });
    }

    /// Keep the timer running on a lock, pause it on a real backgrounding.
    pub fn did_enter_background(&mut self, brightness: f64) -> Event {
        let now = self.now();
        let sample = TransitionSample {
            brightness_before: self.resign.map(|r| r.brightness),
            brightness_after: brightness,
            since_resign: self.resign.map(|r| now - r.at),
        };
        let lock_screen = self.detector.is_likely_lock_screen_transition(&sample);

        let mut paused = None;
        if !lock_screen {
            if let Some(id) = self.running_id() {
                self.pause_at(id, now);
                paused = Some(id);
                self.commit(now);
            }
        }

        tracing::info!(lock_screen, ?paused, brightness, "entered background");
        Event::MovedToBackground {
            lock_screen,
            paused,
            at: now,
        }
    }

    pub fn did_become_active(&mut self) {
        self.resign = None;
        tracing::debug!("became active, requesting sync");
        self.sync.request_sync(&self.state.timers);
    }

    /// Bank the running timer, clear every live activity, flush to disk.
    ///
    /// Best effort: a failed write at exit is logged and dropped.
    pub fn will_terminate(&mut self) {
        let now = self.now();
        for timer in self.state.timers.iter_mut().filter(|t| t.running) {
            timer.bank(now);
        }
        self.activity.end_all();
        self.commit(now);
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn running_id(&self) -> Option<Uuid> {
        self.state.running().next().map(|t| t.id)
    }

    /// Bank a running timer. Returns its elapsed seconds, or `None` if it
    /// is unknown or idle.
    fn pause_at(&mut self, id: Uuid, now: DateTime<Utc>) -> Option<f64> {
        let timer = self.state.get_mut(id)?;
        if !timer.running {
            return None;
        }
        timer.bank(now);
        let elapsed_secs = timer.current_elapsed_secs(now);
        if self.state.active_timer_id == Some(id) {
            self.activity.paused(&WidgetState::derive(&self.state, now));
        }
        tracing::debug!(%id, elapsed_secs, "timer paused");
        Some(elapsed_secs)
    }

    /// Returns whether anything changed, plus the banked elapsed seconds.
    fn stop_at(&mut self, id: Uuid, now: DateTime<Utc>) -> Option<(bool, f64)> {
        let timer = self.state.get_mut(id)?;
        let was_running = timer.running;
        timer.bank(now);
        let elapsed_secs = timer.current_elapsed_secs(now);

        let was_active = self.state.active_timer_id == Some(id);
        if was_active {
            self.state.active_timer_id = None;
            self.activity.ended(id);
        }
        Some((was_running || was_active, elapsed_secs))
    }

    fn commit(&mut self, now: DateTime<Utc>) {
        self.persist_logged(now);
        self.published.send_replace(self.state.clone());
        self.sync.request_sync(&self.state.timers);
    }

    fn persist_logged(&self, now: DateTime<Utc>) {
        if let Err(e) = self.persist(now) {
            tracing::error!(error = %e, "failed to persist timer state");
        }
    }

    fn persist(&self, now: DateTime<Utc>) -> Result<(), StorageError> {
        let widget = WidgetState::derive(&self.state, now);
        write_blob(self.store.as_ref(), KEY_TIMERS, &self.state.timers)?;
        write_blob(self.store.as_ref(), KEY_ACTIVE_TIMER_ID, &self.state.active_timer_id)?;
        write_blob(self.store.as_ref(), KEY_WIDGET_STATE, &widget)
    }
}

fn validate_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(trimmed.to_string())
}

fn read_blob<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Option<T> {
    match store.get(key) {
        Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "ignoring unreadable persisted blob");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(key, error = %e, "failed to read persisted blob");
            None
        }
    }
}

fn write_blob<T: serde::Serialize>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec(value).map_err(|e| StorageError::InvalidBlob {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    store.set(key, &bytes)
}

/// Restore the engine invariants on state read from disk.
fn repair(state: &mut EngineState, now: DateTime<Utc>) {
    for timer in state.timers.iter_mut() {
        if timer.running != timer.run_started_at.is_some() {
            tracing::warn!(id = %timer.id, "timer had inconsistent running state");
            timer.running = false;
            timer.run_started_at = None;
        }
    }

    let keep = state
        .running()
        .find(|t| Some(t.id) == state.active_timer_id)
        .or_else(|| state.running().max_by_key(|t| t.run_started_at))
        .map(|t| t.id);

    for timer in state.timers.iter_mut() {
        if timer.running && Some(timer.id) != keep {
            tracing::warn!(id = %timer.id, "more than one timer was running, pausing");
            timer.bank(now);
        }
    }

    if keep.is_some() {
        state.active_timer_id = keep;
    }
    if let Some(active) = state.active_timer_id {
        if state.get(active).is_none() {
            state.active_timer_id = None;
        }
    }
}

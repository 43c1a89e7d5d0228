//! Debounced background sync.
//!
//! Each mutation replaces the pending snapshot and restarts a short wait.
//! Only the wait is ever cancelled. Once a wait has claimed its snapshot the
//! sync runs in its own task and always delivers an outcome.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::SyncError;
use crate::storage::SyncConfig;
use crate::sync::engine::RemoteSyncEngine;
use crate::sync::types::SyncOutcome;
use crate::timer::{SyncTrigger, Timer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoSyncOptions {
    pub enabled: bool,
    pub debounce: Duration,
}

impl Default for AutoSyncOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce: Duration::from_millis(2000),
        }
    }
}

impl From<&SyncConfig> for AutoSyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            enabled: config.enabled,
            debounce: Duration::from_millis(config.debounce_ms),
        }
    }
}

#[derive(Default)]
struct Pending {
    generation: u64,
    timers: Option<Vec<Timer>>,
    waiter: Option<JoinHandle<()>>,
}

struct Inner {
    engine: Arc<RemoteSyncEngine>,
    options: AutoSyncOptions,
    runtime: Handle,
    outcomes: mpsc::UnboundedSender<SyncOutcome>,
    pending: Mutex<Pending>,
    inflight: watch::Sender<usize>,
}

/// Schedules two-way syncs after a quiet period.
#[derive(Clone)]
pub struct AutoSync {
    inner: Arc<Inner>,
}

impl AutoSync {
    /// Returns the scheduler and the receiving end of its outcomes.
    pub fn new(
        engine: Arc<RemoteSyncEngine>,
        options: AutoSyncOptions,
        runtime: Handle,
    ) -> (Self, mpsc::UnboundedReceiver<SyncOutcome>) {
        let (outcomes, rx) = mpsc::unbounded_channel();
        let (inflight, _) = watch::channel(0);
        let inner = Inner {
            engine,
            options,
            runtime,
            outcomes,
            pending: Mutex::new(Pending::default()),
            inflight,
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    pub fn engine(&self) -> &Arc<RemoteSyncEngine> {
        &self.inner.engine
    }

    /// Queue `timers` for a sync once the debounce wait elapses.
    pub fn schedule(&self, timers: &[Timer]) {
        let inner = &self.inner;
        if !inner.options.enabled {
            return;
        }
        if !inner.engine.is_configured() || !inner.engine.can_write() {
            tracing::debug!("auto-sync skipped, no write credential");
            return;
        }

        let mut pending = inner.lock_pending();
        pending.generation += 1;
        pending.timers = Some(timers.to_vec());
        if let Some(waiter) = pending.waiter.take() {
            waiter.abort();
        }

        let generation = pending.generation;
        let debounce = inner.options.debounce;
        let task = Arc::clone(inner);
        pending.waiter = Some(inner.runtime.spawn(async move {
            tokio::time::sleep(debounce).await;
            if let Some(timers) = task.claim(Some(generation)) {
                task.spawn_sync(timers);
            }
        }));
    }

    /// Sync immediately, bypassing the debounce.
    pub async fn sync_now(&self, timers: &[Timer]) -> Result<Vec<Timer>, SyncError> {
        self.inner.engine.two_way_sync(timers).await
    }

    /// Run any pending sync now and wait for every started sync to finish.
    pub async fn flush(&self) {
        if let Some(timers) = self.inner.claim(None) {
            self.inner.spawn_sync(timers);
        }
        let mut inflight = self.inner.inflight.subscribe();
        let _ = inflight.wait_for(|count| *count == 0).await;
    }

    /// Whether a snapshot is waiting or a sync is running.
    pub fn is_busy(&self) -> bool {
        self.inner.lock_pending().timers.is_some() || *self.inner.inflight.borrow() > 0
    }
}

impl Inner {
    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take the pending snapshot and detach its wait.
    ///
    /// A waiter passes its generation and loses to any newer schedule.
    fn claim(&self, generation: Option<u64>) -> Option<Vec<Timer>> {
        let mut pending = self.lock_pending();
        if generation.is_some_and(|g| g != pending.generation) {
            return None;
        }
        let timers = pending.timers.take()?;
        if let Some(waiter) = pending.waiter.take() {
            if generation.is_none() {
                waiter.abort();
            }
        }
        self.inflight.send_modify(|count| *count += 1);
        Some(timers)
    }

    fn spawn_sync(self: &Arc<Self>, timers: Vec<Timer>) {
        let inner = Arc::clone(self);
        self.runtime.spawn(async move {
            let outcome = match inner.engine.two_way_sync(&timers).await {
                Ok(merged) => SyncOutcome::Merged(merged),
                Err(e) => {
                    tracing::warn!(error = %e, "auto-sync failed");
                    SyncOutcome::Failed(e)
                }
            };
            if inner.outcomes.send(outcome).is_err() {
                tracing::debug!("sync outcome dropped, receiver gone");
            }
            inner.inflight.send_modify(|count| *count -= 1);
        });
    }
}

impl SyncTrigger for AutoSync {
    fn request_sync(&self, timers: &[Timer]) {
        self.schedule(timers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::codec;
    use crate::sync::sheets::MemoryRemoteStore;

    fn auto(store: Arc<MemoryRemoteStore>) -> (AutoSync, mpsc::UnboundedReceiver<SyncOutcome>) {
        let engine = Arc::new(RemoteSyncEngine::new(store));
        AutoSync::new(engine, AutoSyncOptions::default(), Handle::current())
    }

    fn timers(n: usize) -> Vec<Timer> {
        (0..n).map(|i| Timer::new(format!("T{i}"), 0)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_mutations_syncs_once_with_latest_snapshot() {
        let store = Arc::new(MemoryRemoteStore::writable());
        let (auto, mut outcomes) = auto(store.clone());

        for n in 1..=10 {
            auto.schedule(&timers(n));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(store.writes(), 0);

        match outcomes.recv().await {
            Some(SyncOutcome::Merged(merged)) => assert_eq!(merged.len(), 10),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(store.writes(), 1);
        assert_eq!(codec::decode_rows(&store.rows()).len(), 10);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(store.writes(), 1);
        assert!(!auto.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn read_only_store_is_never_scheduled() {
        let store = Arc::new(MemoryRemoteStore::read_only());
        let (auto, mut outcomes) = auto(store.clone());

        auto.schedule(&timers(1));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(outcomes.try_recv().is_err());
        assert_eq!(store.reads(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_auto_sync_does_nothing() {
        let store = Arc::new(MemoryRemoteStore::writable());
        let engine = Arc::new(RemoteSyncEngine::new(store.clone()));
        let options = AutoSyncOptions {
            enabled: false,
            ..AutoSyncOptions::default()
        };
        let (auto, _outcomes) = AutoSync::new(engine, options, Handle::current());

        auto.request_sync(&timers(2));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_runs_pending_sync_without_waiting() {
        let store = Arc::new(MemoryRemoteStore::writable());
        let (auto, mut outcomes) = auto(store.clone());

        auto.schedule(&timers(3));
        auto.flush().await;
        assert_eq!(store.writes(), 1);
        assert!(matches!(outcomes.try_recv(), Ok(SyncOutcome::Merged(m)) if m.len() == 3));

        // The aborted wait must not sync again.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn sync_now_returns_merged() {
        let store = Arc::new(MemoryRemoteStore::writable());
        let (auto, _outcomes) = auto(store.clone());
        let merged = auto.sync_now(&timers(2)).await.unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(store.writes(), 1);
    }
}

//! Wiring shared by the timer and sync commands.

use std::error::Error;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use countup_core::storage::{SyncConfig, KEY_LAST_SYNC_AT};
use countup_core::sync::{remote_from_config, AutoSyncOptions};
use countup_core::timer::BrightnessLockDetector;
use countup_core::{
    AutoSync, Config, KvStore, RemoteSyncEngine, SqliteKvStore, SyncCredential, SyncOutcome,
    TimerEngine,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

pub struct App {
    pub config: Config,
    pub engine: TimerEngine,
    pub sync: Arc<RemoteSyncEngine>,
    pub auto: AutoSync,
    outcomes: mpsc::UnboundedReceiver<SyncOutcome>,
    kv: Arc<SqliteKvStore>,
}

impl App {
    pub fn open() -> Result<Self, Box<dyn Error>> {
        let config = Config::load()?;
        let kv = Arc::new(SqliteKvStore::open()?);

        let last_sync_at = kv
            .get(KEY_LAST_SYNC_AT)?
            .and_then(|raw| serde_json::from_slice::<DateTime<Utc>>(&raw).ok());
        // The keyring is only consulted once a sheet and auth mode are set.
        let credential = if config.sync.is_configured() {
            load_credential(&config.sync)
        } else {
            None
        };
        let sync = Arc::new(
            remote_from_config(&config.sync, credential)?.with_last_sync_at(last_sync_at),
        );
        let (auto, outcomes) = AutoSync::new(
            Arc::clone(&sync),
            AutoSyncOptions::from(&config.sync),
            Handle::current(),
        );

        let engine = TimerEngine::builder(kv.clone())
            .sync_trigger(Arc::new(auto.clone()))
            .lock_detector(Arc::new(BrightnessLockDetector::new(config.lifecycle)))
            .build();

        Ok(Self {
            config,
            engine,
            sync,
            auto,
            outcomes,
            kv,
        })
    }

    /// Fold a sync result back into the engine.
    pub fn apply(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Merged(merged) => {
                self.engine.reconcile(merged);
            }
            SyncOutcome::Failed(e) => eprintln!("sync failed: {e}"),
        }
    }

    /// Run any pending auto-sync, apply its results and persist everything.
    pub async fn finish(mut self) -> Result<(), Box<dyn Error>> {
        self.auto.flush().await;
        while let Ok(outcome) = self.outcomes.try_recv() {
            self.apply(outcome);
        }
        self.engine.flush()?;
        self.save_last_sync_at()?;
        Ok(())
    }

    pub fn save_last_sync_at(&self) -> Result<(), Box<dyn Error>> {
        if let Some(at) = self.sync.last_sync_at() {
            self.kv.set(KEY_LAST_SYNC_AT, &serde_json::to_vec(&at)?)?;
        }
        Ok(())
    }
}

/// Credential from the keyring, or `None` with a warning if it can't be read.
pub fn load_credential(config: &SyncConfig) -> Option<SyncCredential> {
    match SyncCredential::from_keyring(config) {
        Ok(credential) => credential,
        Err(e) => {
            tracing::warn!(error = %e, "could not read sync credential");
            None
        }
    }
}

//! Two-way merge between the local collection and the remote sheet.
//!
//! Local is authoritative. Remote values are only adopted for elapsed time,
//! only when strictly greater, and never for a running or recently reset
//! timer. The merged collection is then written back wholesale.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::error::SyncError;
use crate::sync::codec;
use crate::sync::sheets::RemoteStore;
use crate::sync::types::{MergeReport, SyncStatus};
use crate::timer::Timer;

/// Merge remote rows into the local collection as of `now`.
///
/// Local order is preserved; remote rows with unknown ids follow in remote
/// order as idle timers.
pub fn merge(local: &[Timer], remote: Vec<Timer>, now: DateTime<Utc>) -> Vec<Timer> {
    merge_with_report(local, remote, now).0
}

pub fn merge_with_report(
    local: &[Timer],
    remote: Vec<Timer>,
    now: DateTime<Utc>,
) -> (Vec<Timer>, MergeReport) {
    let mut merged = local.to_vec();
    let mut report = MergeReport::default();

    for row in remote {
        match merged.iter_mut().find(|t| t.id == row.id) {
            Some(existing) => {
                if existing.reset_recently(now) {
                    report.guarded += 1;
                } else if existing.absorb_remote_elapsed(row.accumulated_ms, now) {
                    report.adopted += 1;
                }
            }
            None => {
                report.appended += 1;
                merged.push(row.settle_as_idle());
            }
        }
    }
    (merged, report)
}

/// Coordinates reads and writes against a [`RemoteStore`].
pub struct RemoteSyncEngine {
    store: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
    /// Serializes two-way syncs and pushes.
    gate: Mutex<()>,
    last_sync_at: StdMutex<Option<DateTime<Utc>>>,
    in_progress: AtomicBool,
}

impl RemoteSyncEngine {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            gate: Mutex::new(()),
            last_sync_at: StdMutex::new(None),
            in_progress: AtomicBool::new(false),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Seed the last successful sync time (restored from storage).
    pub fn with_last_sync_at(self, at: Option<DateTime<Utc>>) -> Self {
        *self.last_sync_at.lock().unwrap_or_else(|e| e.into_inner()) = at;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.store.is_configured()
    }

    pub fn can_write(&self) -> bool {
        self.store.can_write()
    }

    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        *self.last_sync_at.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            last_sync_at: self.last_sync_at(),
            in_progress: self.in_progress.load(Ordering::SeqCst),
            configured: self.is_configured(),
            writable: self.can_write(),
        }
    }

    /// Read and decode the remote rows. Works with read-only credentials.
    pub async fn fetch_remote(&self) -> Result<Vec<Timer>, SyncError> {
        if !self.store.is_configured() {
            return Err(SyncError::NotConfigured);
        }
        let rows = self.store.read_rows().await?;
        Ok(codec::decode_rows(&rows))
    }

    /// Fetch, merge, and write back the merged collection.
    ///
    /// # Errors
    /// `NotConfigured` / `WriteNotPermitted` before any network access;
    /// otherwise the first failure from the remote store. Nothing is written
    /// when the fetch fails.
    pub async fn two_way_sync(&self, local: &[Timer]) -> Result<Vec<Timer>, SyncError> {
        self.ensure_writable()?;
        let _gate = self.gate.lock().await;
        let _busy = InProgress::set(&self.in_progress);

        let rows = self.store.read_rows().await?;
        let remote = codec::decode_rows(&rows);
        let now = self.clock.now();
        let (merged, report) = merge_with_report(local, remote, now);

        self.write(&merged, rows.len(), now).await?;
        tracing::info!(
            timers = merged.len(),
            adopted = report.adopted,
            appended = report.appended,
            guarded = report.guarded,
            "two-way sync complete"
        );
        Ok(merged)
    }

    /// Overwrite the remote sheet with `timers`.
    pub async fn push(&self, timers: &[Timer]) -> Result<(), SyncError> {
        self.ensure_writable()?;
        let _gate = self.gate.lock().await;
        let _busy = InProgress::set(&self.in_progress);

        let previous = self.store.read_rows().await?.len();
        let now = self.clock.now();
        self.write(timers, previous, now).await?;
        tracing::info!(timers = timers.len(), "pushed local timers");
        Ok(())
    }

    fn ensure_writable(&self) -> Result<(), SyncError> {
        if !self.store.is_configured() {
            return Err(SyncError::NotConfigured);
        }
        if !self.store.can_write() {
            return Err(SyncError::WriteNotPermitted);
        }
        Ok(())
    }

    /// Write header plus rows, blanking any rows left over from a longer sheet.
    async fn write(
        &self,
        timers: &[Timer],
        previous_rows: usize,
        now: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        let mut rows = codec::encode_rows(timers, now);
        let width = codec::HEADER.len();
        while rows.len() < previous_rows {
            rows.push(vec![serde_json::Value::String(String::new()); width]);
        }
        self.store.write_rows(rows).await?;
        *self.last_sync_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(now);
        Ok(())
    }
}

struct InProgress<'a>(&'a AtomicBool);

impl<'a> InProgress<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

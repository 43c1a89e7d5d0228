//! # Countup Core Library
//!
//! Core logic for a personal count-up timer tracker. Every operation is
//! exposed through the standalone `countup` CLI; any richer front end is a
//! thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Timer Engine**: owns the timer collection, enforces that at most one
//!   timer runs, and persists every mutation. Elapsed time is derived from
//!   the wall clock, never ticked.
//! - **Storage**: a key-value store (SQLite or memory) for engine state,
//!   TOML configuration, and OS keyring secrets.
//! - **Sync**: two-way merge with a Google Sheets range, authorized by an
//!   API key (read-only) or a service account (signed JWT exchange).
//! - **Projection**: the compact widget/live-activity view of the active
//!   timer.
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: timer state machine and lifecycle handling
//! - [`RemoteSyncEngine`]: merge, two-way sync, push and pull
//! - [`AutoSync`]: debounced background sync
//! - [`CredentialProvider`]: access tokens for the remote store
//! - [`Config`]: application configuration

pub mod clock;
pub mod error;
pub mod events;
pub mod projection;
pub mod storage;
pub mod sync;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AuthError, ConfigError, CoreError, StorageError, SyncError, ValidationError};
pub use events::Event;
pub use projection::{LiveActivity, NoLiveActivity, WidgetState};
pub use storage::{Config, KvStore, MemoryKvStore, SqliteKvStore};
pub use sync::{
    AutoSync, AutoSyncOptions, CredentialProvider, RemoteSyncEngine, SyncCredential, SyncOutcome,
    SyncStatus,
};
pub use timer::{EngineBuilder, EngineState, Timer, TimerEngine};

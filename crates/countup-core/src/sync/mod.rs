//! Google Sheets synchronization layer.
//!
//! Timers are mirrored as rows of one sheet range. Local state is
//! authoritative; see [`engine::merge`] for what is taken from the remote.

pub mod auto;
pub mod codec;
pub mod credentials;
pub mod engine;
pub mod sheets;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::error::SyncError;
use crate::storage::SyncConfig;

pub use auto::{AutoSync, AutoSyncOptions};
pub use credentials::{
    Authorization, CredentialProvider, RsaSha256Signer, ServiceAccount, Signer, SyncCredential,
};
pub use engine::{merge, RemoteSyncEngine};
pub use sheets::{MemoryRemoteStore, RemoteStore, SheetsStore};
pub use types::{MergeReport, SyncOutcome, SyncStatus};

/// HTTP client with bounded connect and request time.
pub fn http_client(timeout: Duration) -> Result<Client, SyncError> {
    Client::builder()
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
        .map_err(|e| SyncError::NetworkFailure(e.to_string()))
}

/// Wire a sync engine against the configured sheet.
pub fn remote_from_config(
    config: &SyncConfig,
    credential: Option<SyncCredential>,
) -> Result<RemoteSyncEngine, SyncError> {
    let http = http_client(Duration::from_secs(config.timeout_secs.max(1)))?;
    let credentials = Arc::new(CredentialProvider::new(credential, http.clone()));
    let store = SheetsStore::new(
        http,
        credentials,
        config.api_base_url.clone(),
        config.spreadsheet_id.clone(),
        config.range.clone(),
    );
    Ok(RemoteSyncEngine::new(Arc::new(store)))
}

//! Google Sheets values API client.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use crate::error::SyncError;
use crate::sync::credentials::{Authorization, CredentialProvider};

/// Row-oriented remote storage.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    fn is_configured(&self) -> bool;
    fn can_write(&self) -> bool;
    /// Every row of the range, header included.
    async fn read_rows(&self) -> Result<Vec<Vec<Value>>, SyncError>;
    /// Overwrite the range starting at its first cell.
    async fn write_rows(&self, rows: Vec<Vec<Value>>) -> Result<(), SyncError>;
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// A single named range in one spreadsheet.
pub struct SheetsStore {
    http: Client,
    credentials: Arc<CredentialProvider>,
    base_url: String,
    spreadsheet_id: String,
    range: String,
}

impl SheetsStore {
    pub fn new(
        http: Client,
        credentials: Arc<CredentialProvider>,
        base_url: impl Into<String>,
        spreadsheet_id: impl Into<String>,
        range: impl Into<String>,
    ) -> Self {
        Self {
            http,
            credentials,
            base_url: base_url.into(),
            spreadsheet_id: spreadsheet_id.into(),
            range: range.into(),
        }
    }

    fn values_url(&self) -> Result<Url, SyncError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| SyncError::NetworkFailure(format!("bad base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| SyncError::NetworkFailure("base url cannot hold a path".into()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", &self.spreadsheet_id, "values", &self.range]);
        Ok(url)
    }

    async fn authorize(&self, mut url: Url) -> Result<(Url, Option<String>), SyncError> {
        match self.credentials.authorization().await? {
            Authorization::ApiKey(key) => {
                url.query_pairs_mut().append_pair("key", &key);
                Ok((url, None))
            }
            Authorization::Bearer(token) => Ok((url, Some(token))),
        }
    }

    async fn send(
        &self,
        request: RequestBuilder,
        bearer: Option<String>,
    ) -> Result<reqwest::Response, SyncError> {
        let request = match bearer {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            self.credentials.invalidate().await;
        }
        let message = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), "sheets request rejected");
        Err(SyncError::HttpError {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl RemoteStore for SheetsStore {
    fn is_configured(&self) -> bool {
        self.credentials.is_configured() && !self.spreadsheet_id.is_empty()
    }

    fn can_write(&self) -> bool {
        self.credentials.can_write()
    }

    async fn read_rows(&self) -> Result<Vec<Vec<Value>>, SyncError> {
        let mut url = self.values_url()?;
        url.query_pairs_mut().append_pair("majorDimension", "ROWS");
        let (url, bearer) = self.authorize(url).await?;

        let response = self.send(self.http.get(url), bearer).await?;
        let body: ValueRange = response.json().await?;
        tracing::debug!(rows = body.values.len(), "read sheet rows");
        Ok(body.values)
    }

    async fn write_rows(&self, rows: Vec<Vec<Value>>) -> Result<(), SyncError> {
        let mut url = self.values_url()?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        let (url, bearer) = self.authorize(url).await?;

        let count = rows.len();
        let body = json!({ "majorDimension": "ROWS", "values": rows });
        self.send(self.http.put(url).json(&body), bearer).await?;
        tracing::debug!(rows = count, "wrote sheet rows");
        Ok(())
    }
}

/// In-process sheet, for tests and offline runs.
#[derive(Default)]
pub struct MemoryRemoteStore {
    rows: Mutex<Vec<Vec<Value>>>,
    writable: bool,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryRemoteStore {
    /// A store that accepts writes.
    pub fn writable() -> Self {
        Self {
            writable: true,
            ..Self::default()
        }
    }

    /// A store that only serves reads, like an API key.
    pub fn read_only() -> Self {
        Self::default()
    }

    pub fn with_rows(self, rows: Vec<Vec<Value>>) -> Self {
        *self.rows.lock().unwrap_or_else(|e| e.into_inner()) = rows;
        self
    }

    pub fn rows(&self) -> Vec<Vec<Value>> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    fn is_configured(&self) -> bool {
        true
    }

    fn can_write(&self) -> bool {
        self.writable
    }

    async fn read_rows(&self) -> Result<Vec<Vec<Value>>, SyncError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows())
    }

    async fn write_rows(&self, rows: Vec<Vec<Value>>) -> Result<(), SyncError> {
        if !self.writable {
            return Err(SyncError::WriteNotPermitted);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        *self.rows.lock().unwrap_or_else(|e| e.into_inner()) = rows;
        Ok(())
    }
}

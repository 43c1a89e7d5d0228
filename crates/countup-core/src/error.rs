//! Core error types for countup-core.
//!
//! Each concern gets its own thiserror enum; [`CoreError`] wraps them for
//! callers (the CLI) that only want one error type.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for countup-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Local persistence errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Credential errors
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Remote sync errors
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable key-value store errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open the backing database
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Store is locked by another process
    #[error("Store is locked")]
    Locked,

    /// A stored blob could not be encoded or decoded
    #[error("Invalid blob under '{key}': {message}")]
    InvalidBlob { key: String, message: String },

    /// Keyring access failed
    #[error("Keyring error: {0}")]
    Keyring(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Credential and token exchange errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No credential is configured
    #[error("No sync credential configured")]
    NotConfigured,

    /// The private key could not be parsed or used to sign
    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// The token endpoint refused the signed assertion
    #[error("Token exchange rejected ({status}): {message}")]
    ExchangeRejected { status: u16, message: String },

    /// The token endpoint could not be reached
    #[error("Token exchange failed: {0}")]
    Network(String),
}

/// Remote synchronization errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Sync is not configured")]
    NotConfigured,

    #[error("The configured credential is read-only")]
    WriteNotPermitted,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Network error: {0}")]
    NetworkFailure(String),

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP {status}: {message}")]
    HttpError { status: u16, message: String },

    #[error("Malformed row {row}: {reason}")]
    DecodeFailure { row: usize, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Validation errors for local commands.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Timer names must contain a non-whitespace character
    #[error("Timer name must not be empty")]
    EmptyName,
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg)
                if err.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                StorageError::Locked
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout
        } else if err.is_decode() {
            SyncError::Serialization(err.to_string())
        } else {
            SyncError::NetworkFailure(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::Network(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

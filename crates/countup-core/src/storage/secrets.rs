//! Thin wrapper around the OS keyring for credential storage.
//!
//! Sync secrets (the read-only API key and the service-account private key)
//! never go into `config.toml`.

use crate::error::StorageError;

const SERVICE: &str = "countup";

/// Keyring entry holding the read-only API key.
pub const API_KEY: &str = "sheets_api_key";
/// Keyring entry holding the service-account private key PEM.
pub const PRIVATE_KEY: &str = "service_account_private_key";

pub fn get(key: &str) -> Result<Option<String>, StorageError> {
    let entry = keyring::Entry::new(SERVICE, key).map_err(keyring_error)?;
    match entry.get_password() {
        Ok(pw) => Ok(Some(pw)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(keyring_error(e)),
    }
}

pub fn set(key: &str, value: &str) -> Result<(), StorageError> {
    let entry = keyring::Entry::new(SERVICE, key).map_err(keyring_error)?;
    entry.set_password(value).map_err(keyring_error)
}

pub fn delete(key: &str) -> Result<(), StorageError> {
    let entry = keyring::Entry::new(SERVICE, key).map_err(keyring_error)?;
    match entry.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(keyring_error(e)),
    }
}

fn keyring_error(err: keyring::Error) -> StorageError {
    StorageError::Keyring(err.to_string())
}

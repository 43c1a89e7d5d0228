use std::path::PathBuf;
use std::time::Duration;

use clap::Subcommand;
use countup_core::storage::{secrets, AuthMode};
use countup_core::sync::{http_client, CredentialProvider, ServiceAccount};
use countup_core::{Config, SyncCredential};
use serde_json::json;

use super::CliResult;
use crate::context::load_credential;

#[derive(Subcommand)]
pub enum AuthAction {
    /// Use a read-only API key
    ApiKey {
        /// The API key
        key: String,
    },
    /// Use a service account for read/write access
    ServiceAccount {
        /// Google service-account JSON key file
        #[arg(long, conflicts_with_all = ["email", "pem_file"])]
        key_file: Option<PathBuf>,
        /// Service-account email (with --pem-file)
        #[arg(long, requires = "pem_file")]
        email: Option<String>,
        /// PEM private key file (with --email)
        #[arg(long, requires = "email")]
        pem_file: Option<PathBuf>,
    },
    /// Show the configured credential
    Status,
    /// Exchange the service-account assertion and print the access token
    Token,
    /// Remove stored credentials
    Logout,
}

pub async fn run(action: AuthAction) -> CliResult {
    let mut config = Config::load()?;

    match action {
        AuthAction::ApiKey { key } => {
            let key = key.trim();
            if key.is_empty() {
                return Err("API key must not be empty".into());
            }
            secrets::set(secrets::API_KEY, key)?;
            config.sync.auth_mode = AuthMode::ApiKey;
            config.save()?;
            println!("API key stored (read-only access)");
        }
        AuthAction::ServiceAccount {
            key_file,
            email,
            pem_file,
        } => {
            let account = match (key_file, email, pem_file) {
                (Some(path), _, _) => ServiceAccount::from_json(&std::fs::read_to_string(path)?)?,
                (None, Some(email), Some(pem)) => ServiceAccount {
                    client_email: email,
                    private_key_pem: std::fs::read_to_string(pem)?,
                    token_uri: config.sync.token_uri.clone(),
                },
                _ => return Err("--key-file or --email with --pem-file required".into()),
            };
            // Validate the key before storing it.
            countup_core::sync::RsaSha256Signer::from_pem(&account.private_key_pem)?;

            secrets::set(secrets::PRIVATE_KEY, &account.private_key_pem)?;
            config.sync.auth_mode = AuthMode::ServiceAccount;
            config.sync.client_email = account.client_email.clone();
            config.sync.token_uri = account.token_uri;
            config.save()?;
            println!("service account {} stored", account.client_email);
        }
        AuthAction::Status => {
            let credential = load_credential(&config.sync);
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "auth_mode": config.sync.auth_mode,
                    "credential_present": credential.is_some(),
                    "writable": credential.as_ref().is_some_and(SyncCredential::can_write),
                    "client_email": (config.sync.auth_mode == AuthMode::ServiceAccount)
                        .then_some(config.sync.client_email.as_str()),
                }))?
            );
        }
        AuthAction::Token => {
            let http = http_client(Duration::from_secs(config.sync.timeout_secs.max(1)))?;
            let provider = CredentialProvider::new(load_credential(&config.sync), http);
            println!("{}", provider.get_access_token().await?);
        }
        AuthAction::Logout => {
            secrets::delete(secrets::API_KEY)?;
            secrets::delete(secrets::PRIVATE_KEY)?;
            config.sync.auth_mode = AuthMode::None;
            config.save()?;
            println!("credentials removed");
        }
    }
    Ok(())
}

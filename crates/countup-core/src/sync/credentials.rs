//! Credentials for the remote sheet.
//!
//! Two modes are supported:
//!
//! - a read-only API key, appended to each request as `key=...`
//! - a service account, which proves its identity with a signed JWT
//!   assertion and exchanges it for a short-lived bearer token
//!
//! ```text
//! assertion = b64url(header) . b64url(claims) . b64url(sign(header.claims))
//! POST token_uri  grant_type=jwt-bearer&assertion=...  ->  access_token
//! ```
//!
//! Tokens are cached per provider and refreshed ten minutes before Google
//! would expire them.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::error::{AuthError, CoreError};
use crate::storage::{secrets, AuthMode, SyncConfig};

/// OAuth scope for reading and writing spreadsheets.
pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Cached tokens are dropped this long before the server expiry.
const EXPIRY_MARGIN_SECS: i64 = 600;
/// Upper bound on how long a token is cached, whatever the endpoint claims.
const MAX_TOKEN_LIFETIME_SECS: i64 = ASSERTION_LIFETIME_SECS * 24;

#[derive(Clone, PartialEq, Eq)]
pub enum SyncCredential {
    /// Read-only API key.
    ApiKey(String),
    /// Write-capable signed identity.
    ServiceAccount(ServiceAccount),
}

impl std::fmt::Debug for SyncCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCredential::ApiKey(_) => f.write_str("ApiKey(..)"),
            SyncCredential::ServiceAccount(sa) => f
                .debug_struct("ServiceAccount")
                .field("client_email", &sa.client_email)
                .field("token_uri", &sa.token_uri)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceAccount {
    pub client_email: String,
    #[serde(rename = "private_key")]
    pub private_key_pem: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".into()
}

impl ServiceAccount {
    /// Parse a Google service-account JSON key file.
    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        let account: ServiceAccount = serde_json::from_str(json)
            .map_err(|e| AuthError::InvalidKeyMaterial(format!("bad key file: {e}")))?;
        if account.client_email.trim().is_empty() {
            return Err(AuthError::InvalidKeyMaterial("client_email is empty".into()));
        }
        Ok(account)
    }
}

impl SyncCredential {
    /// Assemble the configured credential, reading secrets from the keyring.
    ///
    /// Returns `Ok(None)` when no auth mode is set or the secret is missing.
    pub fn from_keyring(config: &SyncConfig) -> Result<Option<Self>, CoreError> {
        let credential = match config.auth_mode {
            AuthMode::None => None,
            AuthMode::ApiKey => secrets::get(secrets::API_KEY)?.map(SyncCredential::ApiKey),
            AuthMode::ServiceAccount => secrets::get(secrets::PRIVATE_KEY)?.map(|pem| {
                SyncCredential::ServiceAccount(ServiceAccount {
                    client_email: config.client_email.clone(),
                    private_key_pem: pem,
                    token_uri: config.token_uri.clone(),
                })
            }),
        };
        Ok(credential)
    }

    pub fn can_write(&self) -> bool {
        matches!(self, SyncCredential::ServiceAccount(_))
    }
}

/// Produces a signature over an assertion's signing input.
pub trait Signer: Send + Sync {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, AuthError>;
}

/// RSASSA-PKCS1-v1_5 with SHA-256 over a PEM private key.
pub struct RsaSha256Signer {
    key: EncodingKey,
}

impl RsaSha256Signer {
    pub fn from_pem(pem: &str) -> Result<Self, AuthError> {
        let key = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AuthError::InvalidKeyMaterial(e.to_string()))?;
        Ok(Self { key })
    }
}

impl Signer for RsaSha256Signer {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, AuthError> {
        let encoded = jsonwebtoken::crypto::sign(message, &self.key, Algorithm::RS256)
            .map_err(|e| AuthError::InvalidKeyMaterial(e.to_string()))?;
        URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| AuthError::InvalidKeyMaterial(e.to_string()))
    }
}

/// How a request to the remote store is authorized.
#[derive(Clone, PartialEq, Eq)]
pub enum Authorization {
    ApiKey(String),
    Bearer(String),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Issues authorization for remote requests and caches exchanged tokens.
pub struct CredentialProvider {
    credential: Option<SyncCredential>,
    signer: Option<Arc<dyn Signer>>,
    http: Client,
    clock: Arc<dyn Clock>,
    /// Held across the exchange so concurrent callers share one request.
    cache: Mutex<Option<CachedToken>>,
}

impl CredentialProvider {
    pub fn new(credential: Option<SyncCredential>, http: Client) -> Self {
        Self {
            credential,
            signer: None,
            http,
            clock: Arc::new(SystemClock),
            cache: Mutex::new(None),
        }
    }

    /// Sign with `signer` instead of parsing the configured PEM.
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.credential.is_some()
    }

    pub fn can_write(&self) -> bool {
        self.credential.as_ref().is_some_and(SyncCredential::can_write)
    }

    pub async fn authorization(&self) -> Result<Authorization, AuthError> {
        match &self.credential {
            None => Err(AuthError::NotConfigured),
            Some(SyncCredential::ApiKey(key)) => Ok(Authorization::ApiKey(key.clone())),
            Some(SyncCredential::ServiceAccount(_)) => {
                Ok(Authorization::Bearer(self.get_access_token().await?))
            }
        }
    }

    /// Return a bearer token for the service account, exchanging a fresh
    /// assertion when the cached one has expired.
    ///
    /// # Errors
    /// `NotConfigured` unless a service account is set, `InvalidKeyMaterial`
    /// if signing fails, `ExchangeRejected` on a non-200 exchange.
    pub async fn get_access_token(&self) -> Result<String, AuthError> {
        let Some(SyncCredential::ServiceAccount(account)) = &self.credential else {
            return Err(AuthError::NotConfigured);
        };

        let mut cache = self.cache.lock().await;
        let now = self.clock.now();
        if let Some(cached) = cache.as_ref().filter(|c| now < c.expires_at) {
            return Ok(cached.token.clone());
        }

        let assertion = self.build_assertion(account, now)?;
        let fresh = self.exchange(account, &assertion, now).await?;
        tracing::debug!(expires_at = %fresh.expires_at, "exchanged service account assertion");
        let token = fresh.token.clone();
        *cache = Some(fresh);
        Ok(token)
    }

    /// Forget the cached token (after the store answers 401).
    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
    }

    pub(crate) fn build_assertion(
        &self,
        account: &ServiceAccount,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let header = json!({ "alg": "RS256", "typ": "JWT" });
        let iat = now.timestamp();
        let claims = json!({
            "iss": account.client_email,
            "scope": SHEETS_SCOPE,
            "aud": account.token_uri,
            "iat": iat,
            "exp": iat + ASSERTION_LIFETIME_SECS,
        });

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(claims.to_string()),
        );

        let signature = match &self.signer {
            Some(signer) => signer.sign(signing_input.as_bytes())?,
            None => RsaSha256Signer::from_pem(&account.private_key_pem)?
                .sign(signing_input.as_bytes())?,
        };
        Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }

    async fn exchange(
        &self,
        account: &ServiceAccount,
        assertion: &str,
        now: DateTime<Utc>,
    ) -> Result<CachedToken, AuthError> {
        let resp = self
            .http
            .post(&account.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion)])
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::OK {
            let message = resp.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "token exchange rejected");
            return Err(AuthError::ExchangeRejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: TokenResponse = resp.json().await.map_err(|e| AuthError::ExchangeRejected {
            status: status.as_u16(),
            message: format!("malformed token response: {e}"),
        })?;

        let lifetime = body
            .expires_in
            .unwrap_or(ASSERTION_LIFETIME_SECS)
            .clamp(0, MAX_TOKEN_LIFETIME_SECS);
        let cache_secs = (lifetime - EXPIRY_MARGIN_SECS).max(0);
        Ok(CachedToken {
            token: body.access_token,
            expires_at: now + Duration::seconds(cache_secs),
        })
    }
}

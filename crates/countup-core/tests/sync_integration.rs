//! Integration tests for remote sync.
//!
//! HTTP is mocked with mockito; the service-account key under `fixtures/`
//! is a throwaway RSA key generated for these tests.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use countup_core::error::{AuthError, SyncError};
use countup_core::sync::{
    codec, CredentialProvider, MemoryRemoteStore, RemoteStore, ServiceAccount, SheetsStore,
    SyncCredential,
};
use countup_core::{
    AutoSync, AutoSyncOptions, Clock, Event, ManualClock, MemoryKvStore, RemoteSyncEngine,
    SyncOutcome, Timer, TimerEngine,
};
use mockito::Matcher;
use serde_json::json;
use uuid::Uuid;

const KEY_PEM: &str = include_str!("fixtures/service_account_key.pem");
const JWT_BEARER: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn service_account(server: &mockito::Server) -> SyncCredential {
    SyncCredential::ServiceAccount(ServiceAccount {
        client_email: "timers@example.iam.gserviceaccount.com".into(),
        private_key_pem: KEY_PEM.into(),
        token_uri: format!("{}/token", server.url()),
    })
}

fn add(engine: &mut TimerEngine, name: &str) -> Uuid {
    match engine.add(name, 0).unwrap() {
        Event::TimerAdded { id, .. } => id,
        other => panic!("unexpected event {other:?}"),
    }
}

// ============================================================================
// Credential provider
// ============================================================================

#[tokio::test]
async fn test_token_exchange_is_cached() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/token")
        .match_body(Matcher::UrlEncoded("grant_type".into(), JWT_BEARER.into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"tok-1","expires_in":3600,"token_type":"Bearer"}"#)
        .expect(1)
        .create_async()
        .await;

    let clock = Arc::new(ManualClock::new(t0()));
    let provider = CredentialProvider::new(Some(service_account(&server)), reqwest::Client::new())
        .with_clock(clock.clone());

    assert_eq!(provider.get_access_token().await.unwrap(), "tok-1");
    clock.advance_secs(49 * 60);
    assert_eq!(provider.get_access_token().await.unwrap(), "tok-1");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_token_refreshes_after_fifty_minutes() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/token")
        .with_status(200)
        .with_body(r#"{"access_token":"tok","expires_in":3600}"#)
        .expect(2)
        .create_async()
        .await;

    let clock = Arc::new(ManualClock::new(t0()));
    let provider = CredentialProvider::new(Some(service_account(&server)), reqwest::Client::new())
        .with_clock(clock.clone());

    provider.get_access_token().await.unwrap();
    clock.advance_secs(50 * 60);
    provider.get_access_token().await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_oversized_expiry_is_capped() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/token")
        .with_status(200)
        .with_body(r#"{"access_token":"tok","expires_in":9223372036854775}"#)
        .expect(2)
        .create_async()
        .await;

    let clock = Arc::new(ManualClock::new(t0()));
    let provider = CredentialProvider::new(Some(service_account(&server)), reqwest::Client::new())
        .with_clock(clock.clone());

    assert_eq!(provider.get_access_token().await.unwrap(), "tok");
    clock.advance_secs(10 * 3600);
    provider.get_access_token().await.unwrap();
    clock.advance_secs(14 * 3600);
    provider.get_access_token().await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_concurrent_callers_share_one_exchange() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/token")
        .with_status(200)
        .with_body(r#"{"access_token":"shared","expires_in":3600}"#)
        .expect(1)
        .create_async()
        .await;

    let provider = Arc::new(CredentialProvider::new(
        Some(service_account(&server)),
        reqwest::Client::new(),
    ));
    let (a, b) = tokio::join!(provider.get_access_token(), provider.get_access_token());
    assert_eq!(a.unwrap(), "shared");
    assert_eq!(b.unwrap(), "shared");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_rejected_exchange_reports_status() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/token")
        .with_status(400)
        .with_body(r#"{"error":"invalid_grant"}"#)
        .create_async()
        .await;

    let provider = CredentialProvider::new(Some(service_account(&server)), reqwest::Client::new());
    match provider.get_access_token().await {
        Err(AuthError::ExchangeRejected { status, message }) => {
            assert_eq!(status, 400);
            assert!(message.contains("invalid_grant"));
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_token_response_is_rejected() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/token")
        .with_status(200)
        .with_body("not json")
        .create_async()
        .await;

    let provider = CredentialProvider::new(Some(service_account(&server)), reqwest::Client::new());
    assert!(matches!(
        provider.get_access_token().await,
        Err(AuthError::ExchangeRejected { status: 200, .. })
    ));
}

// ============================================================================
// Sheets store with a service account
// ============================================================================

#[tokio::test]
async fn test_sheets_requests_use_bearer_token() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/token")
        .with_status(200)
        .with_body(r#"{"access_token":"bearer-1","expires_in":3600}"#)
        .create_async()
        .await;
    let read = server
        .mock("GET", "/v4/spreadsheets/sheet-1/values/Timers!A1:F")
        .match_query(Matcher::Any)
        .match_header("authorization", "Bearer bearer-1")
        .with_status(200)
        .with_body(r#"{"values":[]}"#)
        .create_async()
        .await;

    let http = reqwest::Client::new();
    let credentials = Arc::new(CredentialProvider::new(Some(service_account(&server)), http.clone()));
    let store = SheetsStore::new(http, credentials, server.url(), "sheet-1", "Timers!A1:F");

    assert!(store.can_write());
    assert!(store.read_rows().await.unwrap().is_empty());
    read.assert_async().await;
}

#[tokio::test]
async fn test_unauthorized_response_drops_cached_token() {
    let mut server = mockito::Server::new_async().await;
    let token = server
        .mock("POST", "/token")
        .with_status(200)
        .with_body(r#"{"access_token":"stale","expires_in":3600}"#)
        .expect(2)
        .create_async()
        .await;
    server
        .mock("GET", "/v4/spreadsheets/sheet-1/values/Timers!A1:F")
        .match_query(Matcher::Any)
        .with_status(401)
        .expect(2)
        .create_async()
        .await;

    let http = reqwest::Client::new();
    let credentials = Arc::new(CredentialProvider::new(Some(service_account(&server)), http.clone()));
    let store = SheetsStore::new(http, credentials, server.url(), "sheet-1", "Timers!A1:F");

    for _ in 0..2 {
        assert!(matches!(
            store.read_rows().await,
            Err(SyncError::HttpError { status: 401, .. })
        ));
    }
    token.assert_async().await;
}

// ============================================================================
// Engine + sync
// ============================================================================

#[tokio::test]
async fn test_remote_greater_elapsed_is_adopted() {
    let clock = Arc::new(ManualClock::new(t0()));
    let mut engine = TimerEngine::builder(Arc::new(MemoryKvStore::new()))
        .clock(clock.clone())
        .build();
    let id = add(&mut engine, "Focus");
    engine.start(id);
    clock.advance_secs(100);
    engine.pause(id);

    let mut remote = engine.timer(id).unwrap().clone();
    remote.accumulated_ms = 300_000;
    let store = Arc::new(
        MemoryRemoteStore::writable().with_rows(codec::encode_rows(&[remote], clock.now())),
    );
    let sync = RemoteSyncEngine::new(store.clone()).with_clock(clock.clone());

    let merged = sync.two_way_sync(engine.timers()).await.unwrap();
    assert_eq!(merged[0].accumulated_ms, 300_000);
    assert!(matches!(engine.reconcile(merged), Some(Event::Reconciled { .. })));
    assert_eq!(engine.timer(id).unwrap().current_elapsed_secs(clock.now()), 300.0);

    let written = codec::decode_rows(&store.rows());
    assert_eq!(written[0].accumulated_ms, 300_000);
}

#[tokio::test]
async fn test_sync_right_after_reset_keeps_zero() {
    let clock = Arc::new(ManualClock::new(t0()));
    let mut engine = TimerEngine::builder(Arc::new(MemoryKvStore::new()))
        .clock(clock.clone())
        .build();
    let id = add(&mut engine, "Focus");
    engine.start(id);
    clock.advance_secs(100);
    engine.pause(id);

    let mut remote = engine.timer(id).unwrap().clone();
    remote.accumulated_ms = 500_000;
    let store = Arc::new(
        MemoryRemoteStore::writable().with_rows(codec::encode_rows(&[remote], clock.now())),
    );
    let sync = RemoteSyncEngine::new(store.clone()).with_clock(clock.clone());

    engine.reset(id);
    clock.advance_secs(1);
    let merged = sync.two_way_sync(engine.timers()).await.unwrap();
    assert_eq!(merged[0].accumulated_ms, 0);
    assert!(engine.reconcile(merged).is_none());
    assert_eq!(engine.timer(id).unwrap().current_elapsed_ms(clock.now()), 0);

    let written = codec::decode_rows(&store.rows());
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].accumulated_ms, 0);
}

#[tokio::test]
async fn test_repeated_sync_without_changes_is_stable() {
    let clock = Arc::new(ManualClock::new(t0()));
    let mut engine = TimerEngine::builder(Arc::new(MemoryKvStore::new()))
        .clock(clock.clone())
        .build();
    let id = add(&mut engine, "Focus");
    engine.start(id);
    clock.advance_secs(60);
    engine.pause(id);

    let mut remote = engine.timer(id).unwrap().clone();
    remote.accumulated_ms = 90_000;
    let remote_only = Timer::new("Elsewhere", 600);
    let store = Arc::new(MemoryRemoteStore::writable().with_rows(codec::encode_rows(
        &[remote, remote_only],
        clock.now(),
    )));
    let sync = RemoteSyncEngine::new(store.clone()).with_clock(clock.clone());

    let first = sync.two_way_sync(engine.timers()).await.unwrap();
    assert!(engine.reconcile(first).is_some());
    let state_after_first = engine.state().clone();
    let rows_after_first = store.rows();

    let second = sync.two_way_sync(engine.timers()).await.unwrap();
    assert!(engine.reconcile(second).is_none());
    assert_eq!(engine.state(), &state_after_first);
    assert_eq!(store.rows(), rows_after_first);
    assert_eq!(store.writes(), 2);
    assert_eq!(engine.timers().len(), 2);
    assert_eq!(engine.timer(id).unwrap().accumulated_ms, 90_000);
}

#[tokio::test]
async fn test_running_local_is_never_overwritten() {
    let clock = Arc::new(ManualClock::new(t0()));
    let mut engine = TimerEngine::builder(Arc::new(MemoryKvStore::new()))
        .clock(clock.clone())
        .build();
    let id = add(&mut engine, "Focus");
    engine.start(id);
    clock.advance_secs(100);

    let mut remote = engine.timer(id).unwrap().clone();
    remote.running = false;
    remote.run_started_at = None;
    remote.accumulated_ms = 300_000;
    let store =
        Arc::new(MemoryRemoteStore::writable().with_rows(codec::encode_rows(&[remote], t0())));
    let sync = RemoteSyncEngine::new(store).with_clock(clock.clone());

    let merged = sync.two_way_sync(engine.timers()).await.unwrap();
    assert!(merged[0].running);
    assert_eq!(merged[0].current_elapsed_ms(clock.now()), 100_000);

    assert!(engine.reconcile(merged).is_none());
    assert_eq!(engine.timer(id).unwrap().current_elapsed_ms(clock.now()), 100_000);
}

#[tokio::test]
async fn test_read_only_sync_leaves_local_untouched() {
    let clock = Arc::new(ManualClock::new(t0()));
    let mut engine = TimerEngine::builder(Arc::new(MemoryKvStore::new()))
        .clock(clock.clone())
        .build();
    add(&mut engine, "Local");
    let before = engine.state().clone();

    let remote_only = Timer::new("Remote", 0);
    let store = Arc::new(
        MemoryRemoteStore::read_only().with_rows(codec::encode_rows(&[remote_only], t0())),
    );
    let sync = RemoteSyncEngine::new(store.clone());

    assert_eq!(
        sync.two_way_sync(engine.timers()).await,
        Err(SyncError::WriteNotPermitted)
    );
    assert_eq!(engine.state(), &before);
    assert_eq!(store.reads(), 0);

    // Pull still works with a read-only credential.
    let pulled = sync.fetch_remote().await.unwrap();
    assert_eq!(pulled.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_debounced_engine_mutations_push_once() {
    let store = Arc::new(MemoryRemoteStore::writable());
    let sync = Arc::new(RemoteSyncEngine::new(store.clone()));
    let options = AutoSyncOptions {
        enabled: true,
        debounce: Duration::from_millis(2000),
    };
    let (auto, mut outcomes) = AutoSync::new(sync, options, tokio::runtime::Handle::current());

    let mut engine = TimerEngine::builder(Arc::new(MemoryKvStore::new()))
        .sync_trigger(Arc::new(auto.clone()))
        .build();
    let id = add(&mut engine, "Focus");
    for _ in 0..9 {
        engine.toggle(id);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(store.writes(), 0);

    let merged = match outcomes.recv().await {
        Some(SyncOutcome::Merged(merged)) => merged,
        other => panic!("unexpected outcome {other:?}"),
    };
    assert_eq!(store.writes(), 1);
    assert_eq!(merged.len(), 1);
    assert!(engine.reconcile(merged).is_none());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(store.writes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_flush_on_exit_pushes_pending_snapshot() {
    let store = Arc::new(MemoryRemoteStore::writable());
    let sync = Arc::new(RemoteSyncEngine::new(store.clone()));
    let (auto, _outcomes) =
        AutoSync::new(sync, AutoSyncOptions::default(), tokio::runtime::Handle::current());

    let mut engine = TimerEngine::builder(Arc::new(MemoryKvStore::new()))
        .sync_trigger(Arc::new(auto.clone()))
        .build();
    add(&mut engine, "A");
    add(&mut engine, "B");
    engine.will_terminate();

    auto.flush().await;
    let rows = store.rows();
    assert_eq!(rows[0], codec::header_row());
    assert_eq!(codec::decode_rows(&rows).len(), 2);
    assert_eq!(rows[1][1], json!("A"));
}

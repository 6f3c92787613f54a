#![allow(clippy::unwrap_used)]
// Integration tests for `Coordinator` against a wiremock broker and cloud.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sharkiq_core::{
    AppCredentials, AuthSession, AuthState, BrokerConfig, CacheDisposition, Coordinator,
    CoreError, Credentials, Endpoints, SessionConfig, SyncErrorKind, SyncEvent,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn secret(s: &str) -> SecretString {
    SecretString::from(s.to_owned())
}

fn config(server: &MockServer) -> SessionConfig {
    let mut config = SessionConfig::new(
        Credentials {
            username: "user@example.com".into(),
            password: secret("hunter2"),
            refresh_token: None,
        },
        BrokerConfig::new("test-client"),
        AppCredentials {
            app_id: "test-app-id".into(),
            app_secret: secret("test-app-secret"),
        },
    );
    config.endpoints = Some(Endpoints::single_origin(&Url::parse(&server.uri()).unwrap()));
    config.refresh_interval = Duration::ZERO;
    config
}

fn coordinator(config: SessionConfig) -> Coordinator {
    Coordinator::new(AuthSession::new(config).unwrap())
}

fn broker_tokens() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": "broker-access",
        "id_token": "broker-id",
        "expires_in": 86400
    }))
}

async fn mount_sign_in(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(broker_tokens())
        .mount(server)
        .await;
    mount_exchange(server).await;
}

async fn mount_exchange(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/v1/token_sign_in"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "cloud-access",
            "expires_in": 86400
        })))
        .mount(server)
        .await;
}

async fn mount_empty_properties(server: &MockServer) {
    for serial in ["A", "B"] {
        Mock::given(method("GET"))
            .and(path(format!("/apiv1/dsns/{serial}/properties.json")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(server)
            .await;
    }
}

fn listing(b_status: &str, b_seen: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!([
        { "device": {
            "dsn": "A",
            "product_name": "Kitchen",
            "connection_status": "Online",
            "connected_at": "2024-05-01T12:00:00Z"
        }},
        { "device": {
            "dsn": "B",
            "product_name": "Upstairs",
            "connection_status": b_status,
            "connected_at": b_seen
        }}
    ]))
}

async fn mount_listing_once(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/apiv1/devices.json"))
        .respond_with(response)
        .up_to_n_times(1)
        .mount(server)
        .await;
}

// ── End to end ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_three_tick_online_tracking() {
    let server = MockServer::start().await;
    mount_sign_in(&server).await;
    mount_empty_properties(&server).await;
    mount_listing_once(&server, listing("Offline", "2024-05-01T11:00:00Z")).await;
    // B answers again: contact time moved even though the status lags.
    mount_listing_once(&server, listing("OFFLINE", "2024-05-01T12:05:00Z")).await;
    mount_listing_once(&server, ResponseTemplate::new(503)).await;

    let coordinator = coordinator(config(&server));
    let mut events = coordinator.events();

    // Tick 1
    let first = coordinator.tick().await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(
        first.online().iter().cloned().collect::<Vec<_>>(),
        vec!["A".to_owned()]
    );
    assert!(coordinator.is_online("A"));
    assert!(!coordinator.is_online("B"));
    assert!(matches!(
        *events.try_recv().unwrap(),
        SyncEvent::Refreshed { devices: 2, online: 1 }
    ));

    // Tick 2
    let second = coordinator.tick().await.unwrap();
    assert!(second.online().contains("A"));
    assert!(second.online().contains("B"));
    assert!(coordinator.is_online("B"));

    // Tick 3
    let err = coordinator.tick().await.err().unwrap();
    assert_eq!(err.kind, SyncErrorKind::Connection);
    assert_eq!(err.cache, CacheDisposition::Preserved);

    let after = coordinator.snapshot();
    assert!(Arc::ptr_eq(&after, &second));
    assert_eq!(*after, *second);
    assert!(coordinator.is_online("B"));
    assert_eq!(coordinator.session().state(), AuthState::Authenticated);
}

#[tokio::test]
async fn test_unknown_serial_is_offline() {
    let server = MockServer::start().await;
    mount_sign_in(&server).await;
    mount_empty_properties(&server).await;
    mount_listing_once(&server, listing("Offline", "2024-05-01T11:00:00Z")).await;

    let coordinator = coordinator(config(&server));
    coordinator.tick().await.unwrap();

    assert!(!coordinator.is_online("Z"));
    assert!(coordinator.device("Z").is_none());
    assert_eq!(coordinator.device("A").unwrap().name, "Kitchen");
    assert_eq!(coordinator.devices().len(), 2);
}

// ── Failures ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_connection_failure_before_first_listing_keeps_empty_cache() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let coordinator = coordinator(config(&server));
    let mut events = coordinator.events();

    let err = coordinator.tick().await.err().unwrap();
    assert_eq!(err.kind, SyncErrorKind::Connection);
    assert!(coordinator.snapshot().is_empty());
    assert!(matches!(
        *events.try_recv().unwrap(),
        SyncEvent::TransientFailure {
            kind: SyncErrorKind::Connection,
            ..
        }
    ));
    assert_eq!(coordinator.session().state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn test_credentials_failure_signals_reauth_and_stops_retrying() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(broker_tokens())
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    // The password changed server-side after the first sign-in.
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Wrong email or password."
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_exchange(&server).await;
    mount_empty_properties(&server).await;
    mount_listing_once(&server, listing("Offline", "2024-05-01T11:00:00Z")).await;
    Mock::given(method("GET"))
        .and(path("/apiv1/devices.json"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let coordinator = coordinator(config(&server));
    coordinator.tick().await.unwrap();
    let mut events = coordinator.events();

    let err = coordinator.tick().await.err().unwrap();
    assert_eq!(err.kind, SyncErrorKind::Credentials);
    assert_eq!(err.cache, CacheDisposition::Invalidated);
    assert!(coordinator.snapshot().is_empty());
    assert!(!coordinator.is_online("A"));
    assert!(matches!(
        *events.try_recv().unwrap(),
        SyncEvent::ReauthRequired { .. }
    ));
    assert_eq!(coordinator.session().state(), AuthState::Failed);

    // Later ticks fail fast; the broker mock's expect(1) checks no retry.
    let again = coordinator.tick().await.err().unwrap();
    assert_eq!(again.kind, SyncErrorKind::Credentials);
}

#[tokio::test]
async fn test_access_denied_refreshes_once_and_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(broker_tokens())
        .expect(2)
        .mount(&server)
        .await;
    mount_exchange(&server).await;
    mount_empty_properties(&server).await;
    mount_listing_once(&server, ResponseTemplate::new(401)).await;
    mount_listing_once(&server, listing("Online", "2024-05-01T11:00:00Z")).await;

    let coordinator = coordinator(config(&server));
    let snapshot = coordinator.tick().await.unwrap();

    assert_eq!(snapshot.len(), 2);
    assert_eq!(coordinator.session().state(), AuthState::Authenticated);
}

#[tokio::test]
async fn test_repeated_denial_parks_session_instead_of_signing_in_again() {
    let server = MockServer::start().await;
    // One sign-in per tick would show up as more than two grants.
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(broker_tokens())
        .expect(2)
        .mount(&server)
        .await;
    mount_exchange(&server).await;
    Mock::given(method("GET"))
        .and(path("/apiv1/devices.json"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let coordinator = coordinator(config(&server));
    let mut events = coordinator.events();

    for _ in 0..3 {
        let err = coordinator.tick().await.err().unwrap();
        assert_eq!(err.kind, SyncErrorKind::Credentials);
        assert!(matches!(
            *events.try_recv().unwrap(),
            SyncEvent::ReauthRequired { .. }
        ));
    }
    assert_eq!(coordinator.session().state(), AuthState::Failed);

    let grants = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/oauth/token")
        .count();
    assert_eq!(grants, 2);
}

#[tokio::test]
async fn test_interaction_required_preserves_cache_and_signals_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": "mfa_required"
        })))
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.broker.redirect_uri = Some(Url::parse("https://app.example/callback").unwrap());
    let coordinator = coordinator(config);
    let mut events = coordinator.events();

    let err = coordinator.tick().await.err().unwrap();
    assert_eq!(err.kind, SyncErrorKind::InteractionRequired);
    assert_eq!(err.cache, CacheDisposition::Preserved);

    let event = events.try_recv().unwrap();
    let SyncEvent::InteractionRequired { url } = &*event else {
        panic!("expected InteractionRequired event");
    };
    assert!(url.as_str().contains("/authorize"));
    assert_eq!(
        coordinator.session().state(),
        AuthState::InteractionRequired
    );

    // While the flow is pending, ticks do not sign in again.
    let again = coordinator.tick().await.err().unwrap();
    assert_eq!(again.kind, SyncErrorKind::InteractionRequired);
}

// ── Concurrency ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_concurrent_ticks_coalesce() {
    let server = MockServer::start().await;
    mount_sign_in(&server).await;
    mount_empty_properties(&server).await;
    Mock::given(method("GET"))
        .and(path("/apiv1/devices.json"))
        .respond_with(
            listing("Online", "2024-05-01T11:00:00Z").set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator(config(&server));
    let (a, b) = tokio::join!(coordinator.tick(), coordinator.tick());

    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(coordinator.store().version(), 1);
}

#[tokio::test]
async fn test_cancelled_tick_leaves_cache_untouched() {
    let server = MockServer::start().await;
    mount_sign_in(&server).await;
    mount_empty_properties(&server).await;
    mount_listing_once(&server, listing("Online", "2024-05-01T11:00:00Z")).await;
    Mock::given(method("GET"))
        .and(path("/apiv1/devices.json"))
        .respond_with(
            listing("Online", "2024-05-01T12:00:00Z").set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let coordinator = coordinator(config(&server));
    let before = coordinator.tick().await.unwrap();

    let running = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.tick().await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    coordinator.cancel_tick();

    let err = running.await.unwrap().err().unwrap();
    assert_eq!(err.kind, SyncErrorKind::Cancelled);
    assert!(matches!(*err.source, CoreError::Cancelled));
    assert!(Arc::ptr_eq(&coordinator.snapshot(), &before));
}

#[tokio::test]
async fn test_abandoned_tick_does_not_block_the_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(broker_tokens().set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;
    mount_exchange(&server).await;
    mount_empty_properties(&server).await;
    Mock::given(method("GET"))
        .and(path("/apiv1/devices.json"))
        .respond_with(listing("Online", "2024-05-01T11:00:00Z"))
        .mount(&server)
        .await;

    let coordinator = coordinator(config(&server));
    let waited = tokio::time::timeout(Duration::from_millis(100), coordinator.tick()).await;
    assert!(waited.is_err(), "tick should still be signing in");

    let signed_in = tokio::time::timeout(Duration::from_secs(3), coordinator.session().sign_in())
        .await
        .expect("sign-in must not wait on the abandoned tick forever");
    assert!(signed_in.is_ok());
    assert_eq!(coordinator.session().state(), AuthState::Authenticated);

    let snapshot = tokio::time::timeout(Duration::from_secs(3), coordinator.tick())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.len(), 2);
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_start_ticks_periodically_until_stopped() {
    let server = MockServer::start().await;
    mount_sign_in(&server).await;
    mount_empty_properties(&server).await;
    Mock::given(method("GET"))
        .and(path("/apiv1/devices.json"))
        .respond_with(listing("Online", "2024-05-01T11:00:00Z"))
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.refresh_interval = Duration::from_millis(150);
    let coordinator = coordinator(config);
    let mut events = coordinator.events();

    coordinator.start().await.unwrap();
    for _ in 0..2 {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(*event, SyncEvent::Refreshed { .. }));
    }

    coordinator.stop().await;
    assert!(coordinator.store().version() >= 2);
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_set_property_posts_datapoint() {
    let server = MockServer::start().await;
    mount_sign_in(&server).await;
    mount_empty_properties(&server).await;
    mount_listing_once(&server, listing("Online", "2024-05-01T11:00:00Z")).await;
    Mock::given(method("POST"))
        .and(path("/apiv1/dsns/A/properties/SET_Operating_Mode/datapoints.json"))
        .and(body_json(json!({ "datapoint": { "value": 2 } })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "datapoint": { "value": 2, "created_at": "2024-05-01T12:00:00Z" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator(config(&server));
    coordinator.tick().await.unwrap();

    let ack = coordinator
        .set_property("A", "SET_Operating_Mode", json!(2))
        .await
        .unwrap();
    assert_eq!(ack.value, json!(2));

    let err = coordinator
        .set_property("Z", "SET_Operating_Mode", json!(2))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, CoreError::DeviceNotFound { .. }));
}

#[tokio::test]
async fn test_sign_in_uses_password_grant_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("client_id=test-client"))
        .respond_with(broker_tokens())
        .expect(1)
        .mount(&server)
        .await;
    mount_exchange(&server).await;
    mount_empty_properties(&server).await;
    mount_listing_once(&server, listing("Online", "2024-05-01T11:00:00Z")).await;

    let coordinator = coordinator(config(&server));
    coordinator.tick().await.unwrap();
}

#![allow(clippy::unwrap_used)]
// Integration tests for `BrokerClient` using wiremock.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sharkiq_api::{BrokerClient, BrokerConfig, Error, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, BrokerClient) {
    let server = MockServer::start().await;
    let mut config = BrokerConfig::new("test-client");
    config.redirect_uri = Some(Url::parse("com.example.app://callback").unwrap());
    let client = BrokerClient::with_client(
        reqwest::Client::new(),
        Url::parse(&server.uri()).unwrap(),
        config,
        TransportConfig::default(),
    );
    (server, client)
}

fn secret(s: &str) -> SecretString {
    SecretString::from(s.to_owned())
}

fn token_body() -> serde_json::Value {
    json!({
        "access_token": "broker-access",
        "id_token": "broker-id",
        "refresh_token": "broker-refresh",
        "expires_in": 86400,
        "token_type": "Bearer"
    })
}

// ── Discovery ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_discovered_token_endpoint_is_used() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": server.uri(),
            "token_endpoint": format!("{}/custom/token", server.uri()),
            "authorization_endpoint": format!("{}/custom/authorize", server.uri()),
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/custom/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .expect(2)
        .mount(&server)
        .await;

    client
        .sign_in_with_password("user@example.com", &secret("pw"))
        .await
        .unwrap();
    let token = client
        .sign_in_with_refresh_token(&secret("rt"))
        .await
        .unwrap();
    assert_eq!(token.token.expose_secret(), "broker-id");

    let flow = client.start_interactive_flow().await.unwrap();
    assert_eq!(flow.url.path(), "/custom/authorize");
}

#[tokio::test]
async fn test_missing_discovery_falls_back_to_oauth_token() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("client_id=test-client"))
        .and(body_string_contains("offline_access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .expect(1)
        .mount(&server)
        .await;

    let token = client
        .sign_in_with_password("user@example.com", &secret("pw"))
        .await
        .unwrap();
    assert_eq!(token.token.expose_secret(), "broker-id");
    assert_eq!(
        token.refresh_token.unwrap().expose_secret(),
        "broker-refresh"
    );
}

// ── Grant classification ────────────────────────────────────────────

#[tokio::test]
async fn test_wrong_password_is_credentials_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Wrong email or password."
        })))
        .mount(&server)
        .await;

    let result = client
        .sign_in_with_password("user@example.com", &secret("hunter2"))
        .await;
    let err = result.unwrap_err();
    assert!(err.is_credentials(), "got: {err:?}");
    assert!(!err.to_string().contains("hunter2"));
}

#[tokio::test]
async fn test_mfa_is_interaction_required() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({ "error": "mfa_required" })),
        )
        .mount(&server)
        .await;

    let err = client
        .sign_in_with_password("user@example.com", &secret("pw"))
        .await
        .unwrap_err();
    assert!(err.is_interaction_required(), "got: {err:?}");
}

#[tokio::test]
async fn test_unrecognized_body_is_unknown_auth() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("<html>nope</html>"))
        .mount(&server)
        .await;

    let err = client
        .sign_in_with_refresh_token(&secret("rt"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::UnknownAuth { status: 400, code: None }),
        "got: {err:?}"
    );
}

#[tokio::test]
async fn test_server_error_is_connection_class() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client
        .sign_in_with_password("user@example.com", &secret("pw"))
        .await
        .unwrap_err();
    assert!(err.is_connection(), "got: {err:?}");
}

#[tokio::test]
async fn test_request_timeout_is_connection_class() {
    let server = MockServer::start().await;
    let transport = TransportConfig {
        timeout: Duration::from_millis(200),
        ..TransportConfig::default()
    };
    let client = BrokerClient::new(
        Url::parse(&server.uri()).unwrap(),
        BrokerConfig::new("test-client"),
        &transport,
    )
    .unwrap();

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body())
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = client
        .sign_in_with_password("user@example.com", &secret("pw"))
        .await
        .unwrap_err();
    assert!(err.is_connection(), "got: {err:?}");
}

// ── Authorization code ──────────────────────────────────────────────

#[tokio::test]
async fn test_authorization_code_exchange_sends_verifier() {
    let (server, client) = setup().await;
    let flow = client.start_interactive_flow().await.unwrap();

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=the-code"))
        .and(body_string_contains(format!(
            "code_verifier={}",
            flow.verifier.expose_secret()
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .expect(1)
        .mount(&server)
        .await;

    let token = client
        .complete_interactive_flow("the-code", &flow.verifier)
        .await
        .unwrap();
    assert_eq!(token.token.expose_secret(), "broker-id");
}

// ── Device code ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_device_code_start_and_poll() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/oauth/device/code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device_code": "dev-123",
            "user_code": "WDJB-MJHT",
            "verification_uri": "https://login.example.test/activate",
            "verification_uri_complete": "https://login.example.test/activate?user_code=WDJB-MJHT",
            "interval": 0,
            "expires_in": 900
        })))
        .mount(&server)
        .await;

    // First poll pending, then approved.
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("device_code=dev-123"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({ "error": "authorization_pending" })),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains(
            "urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Adevice_code",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .mount(&server)
        .await;

    let session = client.start_device_code_flow().await.unwrap();
    assert_eq!(session.user_code, "WDJB-MJHT");
    assert_eq!(session.interval, Duration::ZERO);
    assert!(session.display_uri().ends_with("user_code=WDJB-MJHT"));

    let token = client
        .poll_device_code_flow(&session, Duration::from_secs(30), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(token.token.expose_secret(), "broker-id");
}

#[tokio::test]
async fn test_device_code_denied_is_terminal() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/oauth/device/code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device_code": "dev-456",
            "user_code": "ABCD-EFGH",
            "verification_uri": "https://login.example.test/activate",
            "expires_in": 900
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({ "error": "access_denied" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let session = client.start_device_code_flow().await.unwrap();
    assert_eq!(session.interval, Duration::from_secs(5));

    let err = client
        .poll_device_code_flow(&session, Duration::from_secs(30), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DeviceCodeDenied), "got: {err:?}");
}

#![allow(clippy::unwrap_used)]
// Integration tests for `CloudClient` using wiremock.

use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sharkiq_api::{
    AppCredentials, CloudClient, Endpoints, Error, IdentityToken, TransportConfig,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, CloudClient) {
    let server = MockServer::start().await;
    let endpoints = Endpoints::single_origin(&Url::parse(&server.uri()).unwrap());
    let client =
        CloudClient::with_client(reqwest::Client::new(), &endpoints, TransportConfig::default());
    (server, client)
}

fn access() -> SecretString {
    SecretString::from("cloud-access".to_owned())
}

fn app() -> AppCredentials {
    AppCredentials {
        app_id: "test-app-id".into(),
        app_secret: SecretString::from("test-app-secret".to_owned()),
    }
}

fn identity() -> IdentityToken {
    IdentityToken {
        token: SecretString::from("broker-id".to_owned()),
        refresh_token: None,
        expires_at: None,
    }
}

// ── Token exchange ──────────────────────────────────────────────────

#[tokio::test]
async fn test_exchange_identity_token() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/token_sign_in"))
        .and(body_json(json!({
            "app_id": "test-app-id",
            "app_secret": "test-app-secret",
            "token": "broker-id"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "cloud-access",
            "refresh_token": "cloud-refresh",
            "expires_in": 86400
        })))
        .expect(1)
        .mount(&server)
        .await;

    let pair = client.exchange_identity_token(&identity(), &app()).await.unwrap();
    assert_eq!(pair.access_token.expose_secret(), "cloud-access");
    assert_eq!(pair.refresh_token.unwrap().expose_secret(), "cloud-refresh");
    assert!(pair.expires_at.is_some());
}

#[tokio::test]
async fn test_exchange_rejection_is_credentials() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/token_sign_in"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "error": "Invalid token" })),
        )
        .mount(&server)
        .await;

    let err = client
        .exchange_identity_token(&identity(), &app())
        .await
        .unwrap_err();
    assert!(err.is_credentials(), "got: {err:?}");
    assert!(!err.to_string().contains("test-app-secret"));
}

#[tokio::test]
async fn test_exchange_demanding_verification_is_interaction() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/token_sign_in"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": "verification_required"
        })))
        .mount(&server)
        .await;

    let err = client
        .exchange_identity_token(&identity(), &app())
        .await
        .unwrap_err();
    assert!(err.is_interaction_required(), "got: {err:?}");
}

// ── Device registry ─────────────────────────────────────────────────

#[tokio::test]
async fn test_list_devices_with_properties() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/apiv1/devices.json"))
        .and(header("Authorization", "auth_token cloud-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "device": {
                "dsn": "AC000W000000001",
                "product_name": "Kitchen",
                "model": "AY001MRT1",
                "oem_model": "RV1001AE",
                "connection_status": "Online",
                "connected_at": "2024-05-01T12:00:00Z"
            }},
            { "device": {
                "dsn": "AC000W000000002",
                "product_name": "Upstairs",
                "connection_status": "Offline"
            }}
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/apiv1/dsns/AC000W000000001/properties.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "property": { "name": "GET_Battery_Capacity", "value": 87, "base_type": "integer" }},
            { "property": { "name": "GET_Error_Code", "value": 0 }}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/apiv1/dsns/AC000W000000002/properties.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let listings = client.list_devices(&access()).await.unwrap();

    assert_eq!(listings.len(), 2);
    assert_eq!(listings[0].device.dsn, "AC000W000000001");
    assert_eq!(listings[0].device.product_name.as_deref(), Some("Kitchen"));
    assert_eq!(listings[0].properties["GET_Battery_Capacity"], json!(87));
    assert_eq!(
        listings[1].device.connection_status.as_deref(),
        Some("Offline")
    );
    assert!(listings[1].properties.is_empty());
}

#[tokio::test]
async fn test_list_devices_fails_whole_when_a_property_fetch_fails() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/apiv1/devices.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "device": { "dsn": "X1" } }])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/apiv1/dsns/X1/properties.json"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = client.list_devices(&access()).await.unwrap_err();
    assert!(matches!(err, Error::Server { status: 502 }), "got: {err:?}");
}

#[tokio::test]
async fn test_expired_access_token_is_access_denied() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/apiv1/devices.json"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client.list_devices(&access()).await.unwrap_err();
    assert!(err.is_access_denied(), "got: {err:?}");
}

#[tokio::test]
async fn test_set_property_posts_datapoint() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path(
            "/apiv1/dsns/AC000W000000001/properties/SET_Operating_Mode/datapoints.json",
        ))
        .and(header("Authorization", "auth_token cloud-access"))
        .and(body_json(json!({ "datapoint": { "value": 2 } })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "datapoint": { "value": 2, "created_at": "2024-05-01T12:00:05Z" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ack = client
        .set_property(&access(), "AC000W000000001", "SET_Operating_Mode", &json!(2))
        .await
        .unwrap();
    assert_eq!(ack.value, json!(2));
    assert_eq!(ack.created_at.as_deref(), Some("2024-05-01T12:00:05Z"));
}

#[tokio::test]
async fn test_unknown_device_is_not_found() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/apiv1/dsns/NOPE/properties/SET_Power/datapoints.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client
        .set_property(&access(), "NOPE", "SET_Power", &json!(1))
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "got: {err:?}");
}

#[tokio::test]
async fn test_property_name_cannot_escape_device_path() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = client
        .set_property(&access(), "AC000W000000001", "../../../oauth/token", &json!(1))
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "got: {err:?}");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let sent = requests[0].url.path();
    assert!(
        sent.starts_with("/apiv1/dsns/AC000W000000001/properties/"),
        "sent to {sent}"
    );
    assert!(sent.ends_with("/datapoints.json"), "sent to {sent}");
    assert!(sent.contains("%2F"), "sent to {sent}");
}

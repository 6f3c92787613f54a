// Wire types for the identity broker (OAuth/OIDC).
//
// Token-bearing responses do not derive `Debug`; callers move
// their fields into `SecretString` immediately.

use serde::Deserialize;

/// Subset of `/.well-known/openid-configuration` the client uses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OidcDiscovery {
    pub token_endpoint: Option<String>,
    pub authorization_endpoint: Option<String>,
    pub device_authorization_endpoint: Option<String>,
}

/// Successful `/oauth/token` response.
///
/// The broker answers with `id_token` when `openid` is in scope and with
/// `access_token` always; the identity token forwarded to the device cloud
/// is the former when present.
#[derive(Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// OAuth error body: `{ "error": "...", "error_description": "..." }`.
#[derive(Debug, Default, Deserialize)]
pub struct OAuthErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// `/oauth/device/code` response.
#[derive(Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    #[serde(default)]
    pub interval: Option<u64>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

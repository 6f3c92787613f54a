// Device-cloud HTTP client
//
// Holds the user-service and device-service origins and the request
// helpers shared by the token exchange and the device registry. Endpoint
// methods live in sibling files as inherent impls.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::{Error, preview};
use crate::region::{Endpoints, join};
use crate::transport::TransportConfig;

/// Application credentials the device cloud requires for token exchange.
#[derive(Debug, Clone)]
pub struct AppCredentials {
    pub app_id: String,
    pub app_secret: SecretString,
}

/// Second-hop client: token exchange plus the device registry.
#[derive(Clone)]
pub struct CloudClient {
    http: reqwest::Client,
    user_service: Url,
    device_service: Url,
    transport: TransportConfig,
}

impl CloudClient {
    pub fn new(endpoints: &Endpoints, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, endpoints, transport.clone()))
    }

    /// Create a cloud client around a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        endpoints: &Endpoints,
        transport: TransportConfig,
    ) -> Self {
        Self {
            http,
            user_service: endpoints.user_service.clone(),
            device_service: endpoints.device_service.clone(),
            transport,
        }
    }

    // ── URL builders ─────────────────────────────────────────────────

    pub(crate) fn user_url(&self, path: &str) -> Result<Url, Error> {
        join(&self.user_service, path)
    }

    /// `{device_service}/apiv1/{path}`
    pub(crate) fn device_url(&self, path: &str) -> Result<Url, Error> {
        join(&self.device_service, &format!("apiv1/{path}"))
    }

    /// `{device_service}/apiv1/{segments...}`, each segment percent-encoded
    /// so caller-supplied names cannot add path components.
    pub(crate) fn device_path(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.device_url("")?;
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Authorized GET, decoding the JSON body.
    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        url: Url,
        access_token: &SecretString,
    ) -> Result<T, Error> {
        debug!("GET {}", url.path());
        let resp = self
            .http
            .get(url)
            .header(
                reqwest::header::AUTHORIZATION,
                auth_header(access_token),
            )
            .send()
            .await
            .map_err(|e| self.transport.classify(e))?;
        self.parse(resp).await
    }

    /// Authorized POST with a JSON body, decoding the JSON reply.
    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        url: Url,
        access_token: &SecretString,
        body: &(impl Serialize + Sync),
    ) -> Result<T, Error> {
        debug!("POST {}", url.path());
        let resp = self
            .http
            .post(url)
            .header(
                reqwest::header::AUTHORIZATION,
                auth_header(access_token),
            )
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport.classify(e))?;
        self.parse(resp).await
    }

    /// Unauthenticated POST used by the token exchange. Returns the raw
    /// status and body so the caller can classify auth-specific failures.
    pub(crate) async fn post_unauthenticated(
        &self,
        url: Url,
        body: &(impl Serialize + Sync),
    ) -> Result<(reqwest::StatusCode, String), Error> {
        debug!("POST {}", url.path());
        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport.classify(e))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| self.transport.classify(e))?;
        Ok((status, text))
    }

    /// Map the status line into the crate taxonomy, then decode.
    async fn parse<T: DeserializeOwned>(&self, resp: reqwest::Response) -> Result<T, Error> {
        let status = resp.status();
        let path = resp.url().path().to_owned();

        match status.as_u16() {
            401 | 403 => {
                return Err(Error::AccessDenied {
                    status: status.as_u16(),
                });
            }
            404 => return Err(Error::NotFound { resource: path }),
            s if status.is_server_error() => return Err(Error::Server { status: s }),
            _ => {}
        }

        let body = resp.text().await.map_err(|e| self.transport.classify(e))?;

        if !status.is_success() {
            return Err(Error::Cloud {
                status: status.as_u16(),
                message: preview(&body).to_owned(),
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: format!("{e} ({path})"),
            body: preview(&body).to_owned(),
        })
    }
}

fn auth_header(access_token: &SecretString) -> String {
    format!("auth_token {}", access_token.expose_secret())
}

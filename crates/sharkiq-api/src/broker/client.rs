// Identity broker HTTP client
//
// Wraps `reqwest::Client` with OIDC endpoint discovery and OAuth error
// classification. The individual grants live in sibling files as
// inherent methods so this module stays focused on transport mechanics.

use tokio::sync::OnceCell;
use tracing::{debug, warn};
use url::Url;

use crate::broker::models::{OAuthErrorBody, OidcDiscovery, TokenResponse};
use crate::error::{Error, preview};
use crate::region::join;
use crate::transport::TransportConfig;

/// Scope requested on every grant; `offline_access` yields a refresh token.
pub const DEFAULT_SCOPE: &str = "openid profile email offline_access";

/// Client registration and grant options for the broker.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub client_id: String,
    pub scope: String,
    /// Optional API audience sent with every grant.
    pub audience: Option<String>,
    /// Redirect URI registered for the authorization-code grant. Interactive
    /// login is unavailable without one.
    pub redirect_uri: Option<Url>,
    /// When set, the password grant uses the broker's realm extension.
    pub realm: Option<String>,
}

impl BrokerConfig {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            scope: DEFAULT_SCOPE.to_owned(),
            audience: None,
            redirect_uri: None,
            realm: None,
        }
    }
}

/// Endpoints resolved from discovery, or the conventional fallbacks.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedEndpoints {
    pub token: Url,
    pub authorize: Url,
    pub device_code: Url,
}

/// Outcome of a POST to the token endpoint before grant-specific handling.
pub(crate) enum GrantReply {
    Issued(TokenResponse),
    Rejected {
        status: u16,
        error: Option<String>,
    },
}

/// First-hop OAuth client for the identity broker.
///
/// Discovery runs at most once per client; a transport failure during
/// discovery is not cached, so a later call probes again.
pub struct BrokerClient {
    http: reqwest::Client,
    base_url: Url,
    config: BrokerConfig,
    transport: TransportConfig,
    endpoints: OnceCell<ResolvedEndpoints>,
}

impl BrokerClient {
    pub fn new(
        base_url: Url,
        config: BrokerConfig,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url, config, transport.clone()))
    }

    /// Create a broker client around a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        base_url: Url,
        config: BrokerConfig,
        transport: TransportConfig,
    ) -> Self {
        Self {
            http,
            base_url,
            config,
            transport,
            endpoints: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Whether the authorization-code grant can be offered.
    pub fn supports_interactive(&self) -> bool {
        self.config.redirect_uri.is_some()
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn transport(&self) -> &TransportConfig {
        &self.transport
    }

    // ── Discovery ────────────────────────────────────────────────────

    /// Resolve the broker endpoints, consulting OIDC discovery first.
    pub(crate) async fn endpoints(&self) -> Result<ResolvedEndpoints, Error> {
        let resolved = self
            .endpoints
            .get_or_try_init(|| async {
                match self.discover().await {
                    Ok(doc) => self.resolve(&doc),
                    Err(e) if e.is_connection() => Err(e),
                    Err(e) => {
                        warn!(error = %e, "OIDC discovery unusable, using conventional endpoints");
                        self.resolve(&OidcDiscovery::default())
                    }
                }
            })
            .await;

        match resolved {
            Ok(endpoints) => Ok(endpoints.clone()),
            Err(e) => {
                debug!(error = %e, "OIDC discovery unreachable, falling back for this call");
                self.resolve(&OidcDiscovery::default())
            }
        }
    }

    async fn discover(&self) -> Result<OidcDiscovery, Error> {
        let url = join(&self.base_url, ".well-known/openid-configuration")?;
        debug!("GET {url}");

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport.classify(e))?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(Error::Server {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(Error::NotFound {
                resource: "openid-configuration".into(),
            });
        }

        let body = resp.text().await.map_err(|e| self.transport.classify(e))?;
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: preview(&body).to_owned(),
        })
    }

    fn resolve(&self, doc: &OidcDiscovery) -> Result<ResolvedEndpoints, Error> {
        let pick = |found: Option<&String>, fallback: &str| -> Result<Url, Error> {
            match found {
                Some(raw) => Ok(Url::parse(raw)?),
                None => join(&self.base_url, fallback),
            }
        };
        Ok(ResolvedEndpoints {
            token: pick(doc.token_endpoint.as_ref(), "oauth/token")?,
            authorize: pick(doc.authorization_endpoint.as_ref(), "authorize")?,
            device_code: pick(
                doc.device_authorization_endpoint.as_ref(),
                "oauth/device/code",
            )?,
        })
    }

    // ── Token endpoint ───────────────────────────────────────────────

    /// POST a form-encoded grant to the token endpoint.
    ///
    /// 5xx and transport failures come back as connection-class errors;
    /// every other non-success is returned as [`GrantReply::Rejected`] for
    /// the caller to interpret.
    pub(crate) async fn post_grant(&self, form: &[(&str, &str)]) -> Result<GrantReply, Error> {
        let url = self.endpoints().await?.token;
        let grant = form
            .iter()
            .find(|(k, _)| *k == "grant_type")
            .map_or("?", |(_, v)| *v);
        debug!(grant, "POST {url}");

        let mut body: Vec<(&str, &str)> = form.to_vec();
        body.push(("client_id", self.config.client_id.as_str()));
        if let Some(audience) = &self.config.audience {
            body.push(("audience", audience.as_str()));
        }

        let resp = self
            .http
            .post(url)
            .form(&body)
            .send()
            .await
            .map_err(|e| self.transport.classify(e))?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(Error::Server {
                status: status.as_u16(),
            });
        }

        let text = resp.text().await.map_err(|e| self.transport.classify(e))?;

        if status.is_success() {
            // The body carries tokens: never echo it into the error.
            return serde_json::from_str(&text)
                .map(GrantReply::Issued)
                .map_err(|e| Error::Deserialization {
                    message: e.to_string(),
                    body: String::new(),
                });
        }

        let err: OAuthErrorBody = serde_json::from_str(&text).unwrap_or_default();
        debug!(
            status = status.as_u16(),
            error = err.error.as_deref().unwrap_or("-"),
            "grant rejected"
        );
        Ok(GrantReply::Rejected {
            status: status.as_u16(),
            error: err.error,
        })
    }
}

/// Map an OAuth rejection into the crate taxonomy.
///
/// Only the error code is carried forward; descriptions may echo user input.
pub(crate) fn classify_rejection(status: u16, error: Option<&str>) -> Error {
    match error {
        Some(
            code @ ("invalid_grant"
            | "invalid_user_password"
            | "wrong_email_or_password"
            | "access_denied"
            | "unauthorized"),
        ) => Error::InvalidCredentials {
            message: code.to_owned(),
        },
        Some(
            code @ ("mfa_required"
            | "interaction_required"
            | "login_required"
            | "consent_required"),
        ) => Error::InteractionRequired {
            reason: code.to_owned(),
        },
        other => Error::UnknownAuth {
            status,
            code: other.map(str::to_owned),
        },
    }
}

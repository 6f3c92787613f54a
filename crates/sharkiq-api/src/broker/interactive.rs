use secrecy::SecretString;
use tracing::debug;
use url::Url;

use crate::broker::client::BrokerClient;
use crate::broker::pkce::{PkcePair, generate_state};
use crate::error::Error;

/// Everything needed to send the user through the broker's login page and
/// later redeem the redirected code.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: Url,
    pub state: String,
    pub verifier: SecretString,
    pub challenge: String,
}

impl BrokerClient {
    /// Build an authorization-code + PKCE login URL with a fresh state value.
    ///
    /// Makes no request except (at most once) OIDC discovery.
    pub async fn start_interactive_flow(&self) -> Result<AuthorizationRequest, Error> {
        let config = self.config();
        let redirect_uri = config.redirect_uri.as_ref().ok_or(Error::NotConfigured {
            what: "redirect_uri",
        })?;

        let pkce = PkcePair::generate();
        let state = generate_state();
        let mut url = self.endpoints().await?.authorize;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &config.client_id)
                .append_pair("redirect_uri", redirect_uri.as_str())
                .append_pair("scope", &config.scope)
                .append_pair("state", &state)
                .append_pair("code_challenge", &pkce.challenge)
                .append_pair("code_challenge_method", "S256");
            if let Some(audience) = &config.audience {
                query.append_pair("audience", audience);
            }
        }
        debug!(authorize = %url.path(), "interactive flow started");

        Ok(AuthorizationRequest {
            url,
            state,
            verifier: pkce.verifier,
            challenge: pkce.challenge,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::broker::client::BrokerConfig;
    use crate::broker::pkce::challenge_for;
    use crate::transport::TransportConfig;
    use secrecy::ExposeSecret;

    use super::*;

    fn client(redirect: Option<&str>) -> BrokerClient {
        let mut config = BrokerConfig::new("cid");
        config.redirect_uri = redirect.map(|r| Url::parse(r).expect("valid"));
        // Unroutable port: discovery fails fast and falls back.
        BrokerClient::new(
            Url::parse("http://127.0.0.1:9").expect("valid"),
            config,
            &TransportConfig::default(),
        )
        .expect("client builds")
    }

    #[tokio::test]
    async fn authorization_url_carries_pkce_and_state() {
        let broker = client(Some("com.example.app://callback"));
        let req = broker.start_interactive_flow().await.expect("url built");
        let query: HashMap<_, _> = req.url.query_pairs().into_owned().collect();

        assert_eq!(req.url.path(), "/authorize");
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["client_id"], "cid");
        assert_eq!(query["state"], req.state);
        assert_eq!(query["code_challenge_method"], "S256");
        assert_eq!(query["code_challenge"], challenge_for(req.verifier.expose_secret()));
        assert!(!req.url.as_str().contains(req.verifier.expose_secret()));
    }

    #[tokio::test]
    async fn interactive_flow_requires_redirect_uri() {
        let broker = client(None);
        assert!(!broker.supports_interactive());
        assert!(matches!(
            broker.start_interactive_flow().await,
            Err(Error::NotConfigured { .. })
        ));
    }
}

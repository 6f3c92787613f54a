use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use crate::cloud::client::{AppCredentials, CloudClient};
use crate::cloud::models::{TokenSignInRequest, TokenSignInResponse};
use crate::error::{Error, preview};
use crate::token::{IdentityToken, TokenPair, expiry_from};

/// Body fragments the user service uses when it insists on interactive
/// verification instead of accepting the identity token outright.
const INTERACTION_MARKERS: &[&str] = &[
    "interaction_required",
    "verification_required",
    "mfa_required",
    "login_required",
];

impl CloudClient {
    /// Exchange a broker identity token for a device-cloud token pair.
    pub async fn exchange_identity_token(
        &self,
        identity: &IdentityToken,
        app: &AppCredentials,
    ) -> Result<TokenPair, Error> {
        let url = self.user_url("api/v1/token_sign_in")?;
        let body = TokenSignInRequest {
            app_id: &app.app_id,
            app_secret: app.app_secret.expose_secret(),
            token: identity.token.expose_secret(),
        };

        let (status, text) = self.post_unauthenticated(url, &body).await?;

        if status.is_server_error() {
            return Err(Error::Server {
                status: status.as_u16(),
            });
        }

        if !status.is_success() {
            debug!(status = status.as_u16(), "token exchange rejected");
            return Err(classify_exchange_rejection(status.as_u16(), &text));
        }

        let parsed: TokenSignInResponse =
            serde_json::from_str(&text).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: String::new(),
            })?;

        info!("device-cloud token exchange succeeded");
        Ok(TokenPair {
            access_token: SecretString::from(parsed.access_token),
            refresh_token: parsed.refresh_token.map(SecretString::from),
            expires_at: expiry_from(parsed.expires_in),
        })
    }
}

fn classify_exchange_rejection(status: u16, body: &str) -> Error {
    let lowered = body.to_ascii_lowercase();
    if let Some(marker) = INTERACTION_MARKERS.iter().find(|m| lowered.contains(*m)) {
        return Error::InteractionRequired {
            reason: (*marker).to_owned(),
        };
    }
    match status {
        400 | 401 | 403 => Error::InvalidCredentials {
            message: format!("token exchange rejected (HTTP {status})"),
        },
        _ => Error::Cloud {
            status,
            message: preview(body).to_owned(),
        },
    }
}

// Password, refresh-token, and authorization-code grants
//
// Implemented as inherent methods on `BrokerClient`. Each grant classifies
// its own failures; nothing here logs credential material.

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use crate::broker::client::{BrokerClient, GrantReply, classify_rejection};
use crate::broker::models::TokenResponse;
use crate::error::Error;
use crate::token::{IdentityToken, expiry_from};

const PASSWORD_REALM_GRANT: &str = "http://auth0.com/oauth/grant-type/password-realm";

impl BrokerClient {
    /// Resource-owner password grant.
    pub async fn sign_in_with_password(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<IdentityToken, Error> {
        let config = self.config();
        let mut form = vec![
            ("username", username),
            ("password", password.expose_secret()),
            ("scope", config.scope.as_str()),
        ];
        match &config.realm {
            Some(realm) => {
                form.push(("grant_type", PASSWORD_REALM_GRANT));
                form.push(("realm", realm.as_str()));
            }
            None => form.push(("grant_type", "password")),
        }

        let token = issued_or_classified(self.post_grant(&form).await?)?;
        info!("password grant succeeded");
        Ok(token)
    }

    /// Refresh-token grant. A revoked or expired refresh token surfaces as
    /// [`Error::InvalidCredentials`].
    pub async fn sign_in_with_refresh_token(
        &self,
        refresh_token: &SecretString,
    ) -> Result<IdentityToken, Error> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.expose_secret()),
            ("scope", self.config().scope.as_str()),
        ];
        let token = issued_or_classified(self.post_grant(&form).await?)?;
        debug!("refresh grant succeeded");
        Ok(token)
    }

    /// Exchange an authorization code (plus the verifier that produced the
    /// challenge in the authorization URL) for an identity token.
    ///
    /// The caller is responsible for having validated the anti-forgery
    /// state before calling this.
    pub async fn complete_interactive_flow(
        &self,
        code: &str,
        verifier: &SecretString,
    ) -> Result<IdentityToken, Error> {
        let redirect_uri = self
            .config()
            .redirect_uri
            .as_ref()
            .ok_or(Error::NotConfigured {
                what: "redirect_uri",
            })?;
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", verifier.expose_secret()),
            ("redirect_uri", redirect_uri.as_str()),
        ];
        let token = issued_or_classified(self.post_grant(&form).await?)?;
        info!("authorization code exchanged");
        Ok(token)
    }
}

/// Turn a grant reply into an identity token or a classified error.
pub(crate) fn issued_or_classified(reply: GrantReply) -> Result<IdentityToken, Error> {
    match reply {
        GrantReply::Issued(resp) => identity_from(resp),
        GrantReply::Rejected { status, error } => Err(classify_rejection(status, error.as_deref())),
    }
}

/// Prefer `id_token`; fall back to `access_token`.
pub(crate) fn identity_from(resp: TokenResponse) -> Result<IdentityToken, Error> {
    let TokenResponse {
        id_token,
        access_token,
        refresh_token,
        expires_in,
    } = resp;
    let token = id_token.or(access_token).ok_or(Error::UnknownAuth {
        status: 200,
        code: Some("missing_token".into()),
    })?;
    Ok(IdentityToken {
        token: SecretString::from(token),
        refresh_token: refresh_token.map(SecretString::from),
        expires_at: expiry_from(expires_in),
    })
}

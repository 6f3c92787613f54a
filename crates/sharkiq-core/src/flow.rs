// ── Interactive authorization flow state ──
//
// One pending authorization-code round trip. Lives only in memory and is
// consumed exactly once.

use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use sharkiq_api::AuthorizationRequest;
use tokio::time::Instant;
use url::Url;

use crate::error::CoreError;

/// A pending interactive login.
#[derive(Debug, Clone)]
pub struct AuthFlowState {
    pub authorization_url: Url,
    pub state: String,
    pub verifier: SecretString,
    pub challenge: String,
    pub created_at: DateTime<Utc>,
    started: Instant,
}

impl AuthFlowState {
    pub(crate) fn from_request(req: AuthorizationRequest) -> Self {
        Self {
            authorization_url: req.url,
            state: req.state,
            verifier: req.verifier,
            challenge: req.challenge,
            created_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.started.elapsed() >= ttl
    }
}

/// What the caller needs to show the user. Carries no secrets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionPrompt {
    pub authorization_url: Url,
    pub created_at: DateTime<Utc>,
}

impl From<&AuthFlowState> for InteractionPrompt {
    fn from(flow: &AuthFlowState) -> Self {
        Self {
            authorization_url: flow.authorization_url.clone(),
            created_at: flow.created_at,
        }
    }
}

/// Authorization code and state extracted from user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectParams {
    pub code: String,
    pub state: Option<String>,
}

/// Parse what the user pasted after the redirect.
///
/// Accepts the full redirected URL (`...?code=...&state=...`, custom schemes
/// included) or a bare code. Whitespace is trimmed.
pub fn parse_redirect(input: &str) -> Result<RedirectParams, CoreError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CoreError::MissingCode);
    }

    let Ok(url) = Url::parse(input) else {
        return Ok(RedirectParams {
            code: input.to_owned(),
            state: None,
        });
    };

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            _ => {}
        }
    }

    match code {
        Some(code) if !code.is_empty() => Ok(RedirectParams { code, state }),
        _ => Err(CoreError::MissingCode),
    }
}

use thiserror::Error;

/// Top-level error type for the `sharkiq-api` crate.
///
/// Every grant and registry call classifies raw transport failures at its
/// own boundary into one of these variants. Messages never carry secret
/// material (passwords, tokens, verifiers, device codes).
/// `sharkiq-core` maps these into the session-level taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The identity broker or device cloud rejected the credentials
    /// (wrong password, revoked refresh token, spent authorization code).
    #[error("Invalid credentials: {message}")]
    InvalidCredentials { message: String },

    /// The upstream demands out-of-band user verification before it will
    /// issue a token.
    #[error("Interactive verification required: {reason}")]
    InteractionRequired { reason: String },

    /// The device cloud refused the access token (expired or revoked).
    #[error("Access denied by device cloud (HTTP {status})")]
    AccessDenied { status: u16 },

    /// An auth endpoint answered with a body we do not recognize.
    #[error("Unrecognized auth response (HTTP {status}){}", code_suffix(.code))]
    UnknownAuth { status: u16, code: Option<String> },

    // ── Device-code grant ───────────────────────────────────────────
    /// The device code expired before the user approved it.
    #[error("Device code expired before authorization completed")]
    DeviceCodeExpired,

    /// The user declined the device authorization request.
    #[error("Device authorization was denied by the user")]
    DeviceCodeDenied,

    /// The caller-enforced maximum wait elapsed.
    #[error("Device authorization not completed within {waited_secs}s")]
    DeviceCodeTimedOut { waited_secs: u64 },

    /// The caller cancelled a long-running operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// A grant needs client configuration that was not supplied.
    #[error("Not configured: {what}")]
    NotConfigured { what: &'static str },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or client construction error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Upstream returned a 5xx.
    #[error("Upstream server error (HTTP {status})")]
    Server { status: u16 },

    // ── Device cloud ────────────────────────────────────────────────
    /// The requested device or property does not exist.
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Any other non-success status from the device cloud.
    #[error("Device cloud error (HTTP {status}): {message}")]
    Cloud { status: u16, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with a body preview for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` for timeout, DNS, connect, and 5xx failures:
    /// retryable without new input, credentials untouched.
    pub fn is_connection(&self) -> bool {
        match self {
            Self::Transport(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            Self::Timeout { .. } | Self::Server { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if new credentials (or reauthentication) are needed.
    pub fn is_credentials(&self) -> bool {
        matches!(self, Self::InvalidCredentials { .. })
    }

    /// Returns `true` if the upstream asked for interactive verification.
    pub fn is_interaction_required(&self) -> bool {
        matches!(self, Self::InteractionRequired { .. })
    }

    /// Returns `true` if the device cloud refused the access token.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[allow(clippy::ref_option)]
fn code_suffix(code: &Option<String>) -> String {
    code.as_deref().map(|c| format!(": {c}")).unwrap_or_default()
}

/// Truncate an upstream body for inclusion in diagnostics.
pub(crate) fn preview(body: &str) -> &str {
    let mut end = body.len().min(200);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_connection_class() {
        assert!(Error::Server { status: 503 }.is_connection());
        assert!(Error::Timeout { timeout_secs: 15 }.is_connection());
        assert!(!Error::InvalidCredentials { message: "x".into() }.is_connection());
    }

    #[test]
    fn unknown_auth_display_includes_code_when_present() {
        let err = Error::UnknownAuth {
            status: 400,
            code: Some("weird_thing".into()),
        };
        assert_eq!(
            err.to_string(),
            "Unrecognized auth response (HTTP 400): weird_thing"
        );
        let bare = Error::UnknownAuth {
            status: 418,
            code: None,
        };
        assert_eq!(bare.to_string(), "Unrecognized auth response (HTTP 418)");
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let body = "é".repeat(150);
        let p = preview(&body);
        assert!(p.len() <= 200);
        assert!(body.starts_with(p));
    }
}

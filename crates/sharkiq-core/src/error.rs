// ── Core error types ──
//
// Session- and sync-level errors. Consumers never see HTTP status codes or
// untyped transport failures: the `From<sharkiq_api::Error>` impl is the
// single place transport errors are translated into this taxonomy.

use std::sync::Arc;

use thiserror::Error;
use url::Url;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Retryable ────────────────────────────────────────────────────
    /// Timeout, DNS, connect, or 5xx. Credentials are untouched.
    #[error("Cannot reach SharkIQ services: {reason}")]
    Connection { reason: String },

    // ── Needs user input ─────────────────────────────────────────────
    /// New credentials or reauthentication are required.
    #[error("Authentication failed: {message}")]
    Credentials { message: String },

    /// The user must complete verification in a browser. Not a fault:
    /// the session holds a pending flow for `url`.
    #[error("Interactive verification required: open {url}")]
    InteractionRequired { url: Url },

    /// The upstream answered in a way no branch recognizes.
    #[error("Unrecognized authentication response: {detail}")]
    UnknownAuth { detail: String },

    // ── Interactive flow ─────────────────────────────────────────────
    #[error("No interactive login is pending")]
    FlowMissing,

    #[error("The interactive login expired; start a new one")]
    FlowExpired,

    #[error("Authorization response state does not match the issued request")]
    StateMismatch,

    #[error("Redirect did not contain an authorization code")]
    MissingCode,

    #[error("Interactive login is not available: {reason}")]
    Unsupported { reason: String },

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Device registry ──────────────────────────────────────────────
    #[error("Device not found: {serial}")]
    DeviceNotFound { serial: String },

    #[error("Device cloud error: {message}")]
    Registry { message: String },
}

impl CoreError {
    /// Retryable without new input.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Requires new credentials (or a fresh interactive login).
    pub fn is_credentials(&self) -> bool {
        matches!(
            self,
            Self::Credentials { .. } | Self::FlowExpired | Self::FlowMissing
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<sharkiq_api::Error> for CoreError {
    fn from(err: sharkiq_api::Error) -> Self {
        use sharkiq_api::Error as Api;

        if err.is_connection() {
            return CoreError::Connection {
                reason: err.to_string(),
            };
        }

        match err {
            Api::InvalidCredentials { message } => CoreError::Credentials { message },
            Api::DeviceCodeDenied | Api::DeviceCodeExpired | Api::DeviceCodeTimedOut { .. } => {
                CoreError::Credentials {
                    message: err.to_string(),
                }
            }
            Api::AccessDenied { status } => CoreError::Credentials {
                message: format!("device cloud refused the access token (HTTP {status})"),
            },
            Api::InteractionRequired { reason } => CoreError::UnknownAuth {
                detail: format!("interactive verification demanded ({reason}) but no flow was started"),
            },
            Api::UnknownAuth { .. } => CoreError::UnknownAuth {
                detail: err.to_string(),
            },
            Api::Cancelled => CoreError::Cancelled,
            Api::NotConfigured { what } => CoreError::Unsupported {
                reason: format!("{what} is not configured"),
            },
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("invalid URL: {e}"),
            },
            Api::Tls(message) => CoreError::Config { message },
            Api::NotFound { resource } => CoreError::Registry {
                message: format!("not found: {resource}"),
            },
            other => CoreError::Registry {
                message: other.to_string(),
            },
        }
    }
}

// ── Sync outcome ─────────────────────────────────────────────────────

/// Failure class of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SyncErrorKind {
    Connection,
    Credentials,
    InteractionRequired,
    UnknownAuth,
    Cancelled,
    Other,
}

/// What a failed tick did to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum CacheDisposition {
    /// Prior snapshot untouched (stale but available).
    Preserved,
    /// Snapshot cleared because the credentials behind it are invalid.
    Invalidated,
}

/// A tick failure. Cheap to clone so every coalesced waiter gets the same
/// outcome.
#[derive(Debug, Clone, Error)]
#[error("{kind} sync failure (cache {cache}): {source}")]
pub struct SyncError {
    pub kind: SyncErrorKind,
    pub cache: CacheDisposition,
    #[source]
    pub source: Arc<CoreError>,
}

impl SyncError {
    /// Classify `err` and decide the cache disposition for it.
    pub fn from_core(err: CoreError) -> Self {
        let kind = match &err {
            CoreError::Connection { .. } => SyncErrorKind::Connection,
            e if e.is_credentials() => SyncErrorKind::Credentials,
            CoreError::InteractionRequired { .. } => SyncErrorKind::InteractionRequired,
            CoreError::UnknownAuth { .. } => SyncErrorKind::UnknownAuth,
            CoreError::Cancelled => SyncErrorKind::Cancelled,
            _ => SyncErrorKind::Other,
        };
        let cache = if kind == SyncErrorKind::Credentials {
            CacheDisposition::Invalidated
        } else {
            CacheDisposition::Preserved
        };
        Self {
            kind,
            cache,
            source: Arc::new(err),
        }
    }
}

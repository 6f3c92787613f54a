//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError`, `SyncError`, and `ConfigError` into user-facing errors
//! with actionable help text. Core failures need the profile name for their
//! help text, so they convert through [`CliError::from_core`] rather than `From`.

use miette::Diagnostic;
use thiserror::Error;

use sharkiq_config::ConfigError;
use sharkiq_core::{CoreError, SyncError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const INTERACTION: i32 = 5;
    pub const CONFIG: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const CANCELLED: i32 = 130;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach SharkIQ services")]
    #[diagnostic(
        code(sharkiq::connection_failed),
        help(
            "{reason}\n\
             Your stored credentials were kept; try again shortly."
        )
    )]
    ConnectionFailed { reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(sharkiq::auth_failed),
        help(
            "Check your e-mail and password, then run: sharkiq login --profile {profile}\n\
             Accounts with extra verification can use: sharkiq login --device-code"
        )
    )]
    AuthFailed { profile: String, message: String },

    #[error("Interactive verification required")]
    #[diagnostic(
        code(sharkiq::interaction_required),
        help(
            "Open this link in a browser and finish signing in:\n{url}\n\
             Then run: sharkiq login"
        )
    )]
    InteractionRequired { url: String },

    #[error("Unrecognized authentication response")]
    #[diagnostic(
        code(sharkiq::unknown_auth),
        help("{detail}\nRe-run with -vv for details.")
    )]
    UnknownAuth { detail: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(sharkiq::no_credentials),
        help(
            "Configure credentials with: sharkiq config init\n\
             Or set the SHARKIQ_PASSWORD environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("Device '{serial}' not found")]
    #[diagnostic(
        code(sharkiq::not_found),
        help("Run: sharkiq devices list to see available devices")
    )]
    NotFound { serial: String },

    #[error("Device cloud error: {message}")]
    #[diagnostic(code(sharkiq::api_error))]
    ApiError { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(sharkiq::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(sharkiq::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: sharkiq config init\n\
             Expected at: {path}"
        )
    )]
    ProfileNotFound {
        name: String,
        available: String,
        path: String,
    },

    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(sharkiq::config),
        help("Review your profile with: sharkiq config show")
    )]
    Config { message: String },

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Cancelled")]
    #[diagnostic(code(sharkiq::cancelled))]
    Cancelled,

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    #[diagnostic(code(sharkiq::json))]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    #[diagnostic(code(sharkiq::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } | Self::UnknownAuth { .. } => {
                exit_code::AUTH
            }
            Self::InteractionRequired { .. } => exit_code::INTERACTION,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } => exit_code::USAGE,
            Self::ProfileNotFound { .. } | Self::Config { .. } => exit_code::CONFIG,
            Self::Cancelled => exit_code::CANCELLED,
            _ => exit_code::GENERAL,
        }
    }

    /// Attach the active profile name to a core failure.
    pub fn from_core(err: CoreError, profile: &str) -> Self {
        match err {
            CoreError::Connection { reason } => Self::ConnectionFailed { reason },

            e @ (CoreError::Credentials { .. }
            | CoreError::FlowExpired
            | CoreError::FlowMissing
            | CoreError::StateMismatch
            | CoreError::MissingCode) => Self::AuthFailed {
                profile: profile.into(),
                message: e.to_string(),
            },

            CoreError::InteractionRequired { url } => Self::InteractionRequired {
                url: url.to_string(),
            },

            CoreError::UnknownAuth { detail } => Self::UnknownAuth { detail },

            CoreError::Unsupported { reason } => Self::Config { message: reason },

            CoreError::Config { message } => Self::Config { message },

            CoreError::Cancelled => Self::Cancelled,

            CoreError::DeviceNotFound { serial } => Self::NotFound { serial },

            CoreError::Registry { message } => Self::ApiError { message },
        }
    }

    pub fn from_sync(err: &SyncError, profile: &str) -> Self {
        // `SyncError` shares its cause; rebuild an owned core error from it.
        let core = match &*err.source {
            CoreError::Connection { reason } => CoreError::Connection {
                reason: reason.clone(),
            },
            CoreError::InteractionRequired { url } => {
                CoreError::InteractionRequired { url: url.clone() }
            }
            CoreError::UnknownAuth { detail } => CoreError::UnknownAuth {
                detail: detail.clone(),
            },
            CoreError::Cancelled => CoreError::Cancelled,
            CoreError::DeviceNotFound { serial } => CoreError::DeviceNotFound {
                serial: serial.clone(),
            },
            other if other.is_credentials() => CoreError::Credentials {
                message: other.to_string(),
            },
            other => CoreError::Registry {
                message: other.to_string(),
            },
        };
        Self::from_core(core, profile)
    }
}

// ── Conversions ──────────────────────────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::UnknownProfile { profile } => Self::ProfileNotFound {
                name: profile,
                available: String::new(),
                path: sharkiq_config::config_path().display().to_string(),
            },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::Io(e) => Self::Io(e),
            other => Self::Config {
                message: other.to_string(),
            },
        }
    }
}

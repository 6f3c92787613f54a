//! Shared configuration for SharkIQ tools.
//!
//! TOML profiles, secret resolution (env + keyring + plaintext), refresh
//! token persistence, and translation to `sharkiq_core::SessionConfig`.
//! The core never reads files; this crate is where disk and keyring live.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use sharkiq_core::{
    AppCredentials, BrokerConfig, Credentials, Endpoints, Region, SessionConfig, StateValidation,
    TlsMode,
};

/// Service name for every keyring entry this crate touches.
pub const KEYRING_SERVICE: &str = "sharkiq";

/// Overrides the config file location when set.
pub const CONFIG_PATH_ENV: &str = "SHARKIQ_CONFIG";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{profile}' not found")]
    UnknownProfile { profile: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{profile}' is missing {field}")]
    MissingField { profile: String, field: &'static str },

    #[error("keyring unavailable: {0}")]
    Keyring(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named account profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// The requested profile name, else the configured default, else
    /// `"default"`.
    pub fn active_profile_name(&self, requested: Option<&str>) -> String {
        requested
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }

    pub fn profile_mut(&mut self, name: &str) -> Result<&mut Profile, ConfigError> {
        self.profiles
            .get_mut(name)
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Per-request timeout, seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Seconds between sync ticks; 0 disables periodic refresh.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,

    /// Upper bound on device-code polling, seconds.
    #[serde(default = "default_device_code_max_wait")]
    pub device_code_max_wait: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
            refresh_interval: default_refresh_interval(),
            device_code_max_wait: default_device_code_max_wait(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    15
}
fn default_refresh_interval() -> u64 {
    60
}
fn default_device_code_max_wait() -> u64 {
    300
}

/// A named account profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Account region: "north_america" (default) or "europe".
    #[serde(default)]
    pub region: Region,

    /// Account e-mail.
    pub username: Option<String>,

    /// Password (plaintext; prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Identity broker OAuth client id.
    pub client_id: Option<String>,

    /// Scope override; the broker default otherwise.
    pub scope: Option<String>,

    pub audience: Option<String>,

    /// Password-realm connection name, when the broker needs one.
    pub realm: Option<String>,

    /// Registered redirect URI. Enables interactive (browser) login.
    pub redirect_uri: Option<String>,

    /// Device-cloud application id.
    pub app_id: Option<String>,

    /// Device-cloud application secret (plaintext; prefer keyring or env).
    pub app_secret: Option<String>,

    /// Environment variable name containing the app secret.
    pub app_secret_env: Option<String>,

    /// Last refresh token, only written here when the keyring is
    /// unavailable and `store_refresh_token_plaintext` is set.
    pub refresh_token: Option<String>,

    /// Allow the refresh token to fall back to this file.
    #[serde(default)]
    pub store_refresh_token_plaintext: bool,

    /// "require" (default) or "skip_unsafe".
    pub state_validation: Option<String>,

    /// Host overrides; all three or none.
    pub broker_url: Option<String>,
    pub user_service_url: Option<String>,
    pub device_service_url: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override timeout.
    pub timeout: Option<u64>,

    /// Override refresh interval.
    pub refresh_interval: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path: `$SHARKIQ_CONFIG`, else XDG / platform
/// conventions.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    ProjectDirs::from("com", "sharkiq", "sharkiq").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("sharkiq");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields the defaults.
///
/// Environment keys use `__` for nesting:
/// `SHARKIQ_DEFAULTS__OUTPUT=json`, `SHARKIQ_DEFAULT_PROFILE=work`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SHARKIQ_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    debug!(path = %path.display(), "config saved");
    Ok(())
}

// ── Secret resolution ───────────────────────────────────────────────

fn keyring_entry(profile_name: &str, key: &str) -> Result<keyring::Entry, ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/{key}"))
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

fn keyring_get(profile_name: &str, key: &str) -> Option<SecretString> {
    keyring_entry(profile_name, key)
        .ok()?
        .get_password()
        .ok()
        .map(SecretString::from)
}

/// env var → keyring → plaintext.
fn resolve_secret(
    env_name: Option<&str>,
    profile_name: &str,
    keyring_key: &str,
    plaintext: Option<&String>,
) -> Option<SecretString> {
    // 1. Env var
    if let Some(val) = env_name.and_then(|name| std::env::var(name).ok()) {
        return Some(SecretString::from(val));
    }

    // 2. System keyring
    if let Some(secret) = keyring_get(profile_name, keyring_key) {
        return Some(secret);
    }

    // 3. Plaintext in config
    plaintext.map(|s| SecretString::from(s.clone()))
}

/// Resolve the account password. `SHARKIQ_PASSWORD` wins over the
/// profile's own `password_env`.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    if let Ok(pw) = std::env::var("SHARKIQ_PASSWORD") {
        return Some(SecretString::from(pw));
    }
    resolve_secret(
        profile.password_env.as_deref(),
        profile_name,
        "password",
        profile.password.as_ref(),
    )
}

/// Resolve the device-cloud application secret.
pub fn resolve_app_secret(
    profile: &Profile,
    profile_name: &str,
) -> Result<SecretString, ConfigError> {
    if let Ok(secret) = std::env::var("SHARKIQ_APP_SECRET") {
        return Ok(SecretString::from(secret));
    }
    resolve_secret(
        profile.app_secret_env.as_deref(),
        profile_name,
        "app-secret",
        profile.app_secret.as_ref(),
    )
    .ok_or_else(|| ConfigError::MissingField {
        profile: profile_name.into(),
        field: "app_secret",
    })
}

/// Store a secret for `profile_name` in the system keyring.
pub fn store_secret(profile_name: &str, key: &str, secret: &SecretString) -> Result<(), ConfigError> {
    keyring_entry(profile_name, key)?
        .set_password(secret.expose_secret())
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

// ── Refresh token persistence ───────────────────────────────────────

/// Where a refresh token ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenLocation {
    Keyring,
    /// Written into the profile; the caller must save the config.
    Plaintext,
}

/// Last persisted refresh token: keyring, then plaintext profile field.
pub fn load_refresh_token(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    keyring_get(profile_name, "refresh-token").or_else(|| {
        profile
            .refresh_token
            .as_ref()
            .map(|t| SecretString::from(t.clone()))
    })
}

/// Persist a refresh token returned by sign-in.
///
/// Goes to the keyring. Falls back to the profile's plaintext field only
/// when the profile opts in; callers save the config on
/// [`TokenLocation::Plaintext`].
pub fn persist_refresh_token(
    cfg: &mut Config,
    profile_name: &str,
    token: &SecretString,
) -> Result<TokenLocation, ConfigError> {
    let profile = cfg.profile_mut(profile_name)?;
    match store_secret(profile_name, "refresh-token", token) {
        Ok(()) => {
            // Keyring copy supersedes any plaintext one.
            profile.refresh_token = None;
            debug!(profile = profile_name, "refresh token stored in keyring");
            Ok(TokenLocation::Keyring)
        }
        Err(err) => plaintext_fallback(profile, profile_name, token, err),
    }
}

fn plaintext_fallback(
    profile: &mut Profile,
    profile_name: &str,
    token: &SecretString,
    err: ConfigError,
) -> Result<TokenLocation, ConfigError> {
    if !profile.store_refresh_token_plaintext {
        return Err(err);
    }
    warn!(
        profile = profile_name,
        "keyring unavailable, storing refresh token in the config file"
    );
    profile.refresh_token = Some(token.expose_secret().to_owned());
    Ok(TokenLocation::Plaintext)
}

/// Forget the refresh token everywhere. Returns `true` if the profile's
/// plaintext copy changed and the config needs saving.
pub fn clear_refresh_token(cfg: &mut Config, profile_name: &str) -> Result<bool, ConfigError> {
    if let Ok(entry) = keyring_entry(profile_name, "refresh-token") {
        let _ = entry.delete_credential();
    }
    let profile = cfg.profile_mut(profile_name)?;
    Ok(profile.refresh_token.take().is_some())
}

// ── Translation to SessionConfig ────────────────────────────────────

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })
}

fn endpoint_overrides(profile: &Profile) -> Result<Option<Endpoints>, ConfigError> {
    match (
        profile.broker_url.as_deref(),
        profile.user_service_url.as_deref(),
        profile.device_service_url.as_deref(),
    ) {
        (None, None, None) => Ok(None),
        (Some(broker), Some(user), Some(device)) => Ok(Some(Endpoints {
            broker: parse_url("broker_url", broker)?,
            user_service: parse_url("user_service_url", user)?,
            device_service: parse_url("device_service_url", device)?,
        })),
        _ => Err(ConfigError::Validation {
            field: "broker_url".into(),
            reason: "broker_url, user_service_url and device_service_url must be set together"
                .into(),
        }),
    }
}

/// Build a `SessionConfig` from a profile.
///
/// With `require_password` unset, a missing password is allowed (device-code
/// login, or a persisted refresh token will be tried first). Otherwise a
/// profile with neither password nor refresh token is rejected.
pub fn profile_to_session_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
    require_password: bool,
) -> Result<SessionConfig, ConfigError> {
    let missing = |field| ConfigError::MissingField {
        profile: profile_name.into(),
        field,
    };

    let client_id = profile.client_id.clone().ok_or_else(|| missing("client_id"))?;
    let app_id = profile.app_id.clone().ok_or_else(|| missing("app_id"))?;
    let app_secret = resolve_app_secret(profile, profile_name)?;

    let refresh_token = load_refresh_token(profile, profile_name);
    let password = resolve_password(profile, profile_name);
    if require_password && password.is_none() && refresh_token.is_none() {
        return Err(ConfigError::NoCredentials {
            profile: profile_name.into(),
        });
    }

    let mut broker = BrokerConfig::new(client_id);
    if let Some(scope) = &profile.scope {
        broker.scope.clone_from(scope);
    }
    broker.audience.clone_from(&profile.audience);
    broker.realm.clone_from(&profile.realm);
    broker.redirect_uri = profile
        .redirect_uri
        .as_deref()
        .map(|raw| parse_url("redirect_uri", raw))
        .transpose()?;

    let state_validation = match profile.state_validation.as_deref() {
        None => StateValidation::default(),
        Some(raw) => StateValidation::from_str(raw).map_err(|_| ConfigError::Validation {
            field: "state_validation".into(),
            reason: format!("expected 'require' or 'skip_unsafe', got '{raw}'"),
        })?,
    };

    let mut config = SessionConfig::new(
        Credentials {
            username: profile.username.clone().unwrap_or_default(),
            password: password.unwrap_or_else(|| SecretString::from(String::new())),
            refresh_token,
        },
        broker,
        AppCredentials { app_id, app_secret },
    );
    config.region = profile.region;
    config.endpoints = endpoint_overrides(profile)?;
    config.tls = profile
        .ca_cert
        .clone()
        .map_or(TlsMode::System, TlsMode::CustomCa);
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.refresh_interval = Duration::from_secs(
        profile
            .refresh_interval
            .unwrap_or(defaults.refresh_interval),
    );
    config.device_code_max_wait = Duration::from_secs(defaults.device_code_max_wait);
    config.state_validation = state_validation;

    Ok(config)
}

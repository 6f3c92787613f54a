//! Profile resolution and refresh-token bookkeeping for commands that talk
//! to the cloud.

use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use sharkiq_config::{Config, ConfigError, Profile, TokenLocation};
use sharkiq_core::{AuthSession, Region};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// An opened account: its config, profile name, and live session.
pub struct Context {
    pub cfg: Config,
    pub profile: String,
    pub session: AuthSession,
    /// Refresh token as loaded, to skip rewriting an unchanged one.
    saved_refresh: Option<SecretString>,
}

impl Context {
    /// Resolve the active profile, apply CLI overrides, and build a session.
    pub fn open(global: &GlobalOpts, require_password: bool) -> Result<Self, CliError> {
        Self::open_with_interval(global, require_password, None)
    }

    /// Like [`open`](Self::open), overriding the refresh interval (seconds).
    pub fn open_with_interval(
        global: &GlobalOpts,
        require_password: bool,
        refresh_interval: Option<u64>,
    ) -> Result<Self, CliError> {
        let cfg = sharkiq_config::load_config()?;
        let name = cfg.active_profile_name(global.profile.as_deref());
        let mut profile = apply_overrides(lookup_profile(&cfg, &name)?.clone(), global)?;
        if refresh_interval.is_some() {
            profile.refresh_interval = refresh_interval;
        }

        let session_config =
            sharkiq_config::profile_to_session_config(&profile, &name, &cfg.defaults, require_password)
                .map_err(|e| profile_error(e, &name))?;
        let saved_refresh = session_config.credentials.refresh_token.clone();

        debug!(profile = %name, region = %session_config.region, "opening session");
        let session =
            AuthSession::new(session_config).map_err(|e| CliError::from_core(e, &name))?;

        Ok(Self {
            cfg,
            profile: name,
            session,
            saved_refresh,
        })
    }

    /// Write back whatever refresh token the session now holds.
    ///
    /// Persistence failures are logged, never fatal: the sign-in itself
    /// succeeded and the password still works next time.
    pub async fn save_refresh_token(&mut self) {
        let current = self.session.refresh_token().await;
        if same_token(current.as_ref(), self.saved_refresh.as_ref()) {
            return;
        }

        let result = match &current {
            Some(token) => {
                sharkiq_config::persist_refresh_token(&mut self.cfg, &self.profile, token)
                    .map(|location| location == TokenLocation::Plaintext)
            }
            None => sharkiq_config::clear_refresh_token(&mut self.cfg, &self.profile),
        };

        match result.and_then(|dirty| {
            if dirty {
                sharkiq_config::save_config(&self.cfg)?;
            }
            Ok(())
        }) {
            Ok(()) => {
                debug!(profile = %self.profile, "refresh token updated");
                self.saved_refresh = current;
            }
            Err(e) => warn!(profile = %self.profile, error = %e, "could not store refresh token"),
        }
    }
}

fn same_token(a: Option<&SecretString>, b: Option<&SecretString>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.expose_secret() == b.expose_secret(),
        _ => false,
    }
}

/// Look up a profile, listing the known ones when it is missing.
pub fn lookup_profile<'a>(cfg: &'a Config, name: &str) -> Result<&'a Profile, CliError> {
    cfg.profile(name).map_err(|_| CliError::ProfileNotFound {
        name: name.into(),
        available: available_profiles(cfg),
        path: sharkiq_config::config_path().display().to_string(),
    })
}

fn available_profiles(cfg: &Config) -> String {
    if cfg.profiles.is_empty() {
        return "(none)".into();
    }
    cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
}

fn apply_overrides(mut profile: Profile, global: &GlobalOpts) -> Result<Profile, CliError> {
    if let Some(raw) = &global.region {
        profile.region = Region::from_str(raw).map_err(|_| CliError::Validation {
            field: "region".into(),
            reason: format!("expected north_america or europe, got '{raw}'"),
        })?;
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }
    Ok(profile)
}

fn profile_error(err: ConfigError, profile: &str) -> CliError {
    match err {
        ConfigError::MissingField { field, .. } => CliError::Config {
            message: format!("profile '{profile}' is missing {field}; run: sharkiq config init"),
        },
        other => other.into(),
    }
}

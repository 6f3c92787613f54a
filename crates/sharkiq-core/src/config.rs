// ── Runtime session configuration ──
//
// These types describe how to reach the broker and device cloud and which
// account to sign in as. They never touch disk: the CLI (or any other
// caller) builds a `SessionConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use sharkiq_api::transport::DEFAULT_TIMEOUT;
use sharkiq_api::{AppCredentials, BrokerConfig, Endpoints, Region, TlsMode, TransportConfig};

use crate::error::CoreError;

/// Account credentials. Only `refresh_token` changes over a session's life.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
    /// Last persisted broker refresh token, tried before the password.
    pub refresh_token: Option<SecretString>,
}

/// Whether the interactive flow's anti-forgery state must match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum StateValidation {
    /// Reject a returned code whose state is missing or differs from the
    /// issued one.
    #[default]
    Require,
    /// Accept any returned code regardless of its state value.
    ///
    /// Exists for brokers observed to rewrite `state` on redirect. Opting in
    /// removes CSRF protection for the completion step and is logged at
    /// `warn` every time a mismatch is let through.
    SkipUnsafe,
}

/// Everything a session needs to run.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub region: Region,
    /// Overrides the region's hosts (staging, tests).
    pub endpoints: Option<Endpoints>,
    pub credentials: Credentials,
    pub broker: BrokerConfig,
    pub app: AppCredentials,
    pub tls: TlsMode,
    /// Ceiling for every individual network step.
    pub timeout: Duration,
    /// Period between coordinator ticks. Zero disables periodic refresh.
    pub refresh_interval: Duration,
    /// Caller-enforced upper bound for device-code polling.
    pub device_code_max_wait: Duration,
    /// How long a pending interactive flow stays redeemable.
    pub interactive_ttl: Duration,
    pub state_validation: StateValidation,
}

impl SessionConfig {
    pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);
    pub const DEFAULT_DEVICE_CODE_MAX_WAIT: Duration = Duration::from_secs(300);
    pub const DEFAULT_INTERACTIVE_TTL: Duration = Duration::from_secs(600);

    /// Config with default tuning for the given account and clients.
    pub fn new(credentials: Credentials, broker: BrokerConfig, app: AppCredentials) -> Self {
        Self {
            region: Region::default(),
            endpoints: None,
            credentials,
            broker,
            app,
            tls: TlsMode::System,
            timeout: DEFAULT_TIMEOUT,
            refresh_interval: Self::DEFAULT_REFRESH_INTERVAL,
            device_code_max_wait: Self::DEFAULT_DEVICE_CODE_MAX_WAIT,
            interactive_ttl: Self::DEFAULT_INTERACTIVE_TTL,
            state_validation: StateValidation::default(),
        }
    }

    /// Concrete hosts: the override when set, else the region table.
    pub fn resolved_endpoints(&self) -> Result<Endpoints, CoreError> {
        match &self.endpoints {
            Some(endpoints) => Ok(endpoints.clone()),
            None => Ok(self.region.endpoints()?),
        }
    }

    pub(crate) fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: self.tls.clone(),
            timeout: self.timeout,
        }
    }
}

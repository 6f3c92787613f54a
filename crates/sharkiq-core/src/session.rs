// ── Auth session ──
//
// Two-hop sign-in state machine: broker grant (refresh, password, device
// code, or authorization code) followed by the device-cloud exchange.
// Interaction-required is a first-class outcome, not an error path.

use std::future::Future;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use sharkiq_api::{BrokerClient, CloudClient, DeviceCodeSession, IdentityToken, TokenPair};
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Credentials, SessionConfig, StateValidation};
use crate::error::CoreError;
use crate::flow::{AuthFlowState, InteractionPrompt, parse_redirect};

// ── AuthState ────────────────────────────────────────────────────

/// Session state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum AuthState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    InteractionRequired,
    Failed,
}

/// A completed two-hop sign-in.
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub tokens: TokenPair,
    /// Broker refresh token issued by this sign-in, for the caller to
    /// persist. `None` when the broker did not rotate it.
    pub refresh_token: Option<SecretString>,
}

/// Result of a sign-in attempt that did not fail outright.
#[derive(Debug, Clone)]
pub enum SignInOutcome {
    Authenticated(SignedIn),
    /// The user must open the prompt's URL and hand back the redirect.
    InteractionRequired(InteractionPrompt),
}

// ── AuthSession ──────────────────────────────────────────────────

/// Owns credentials, tokens, and any pending interactive flow for one
/// account. Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct AuthSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    broker: BrokerClient,
    cloud: CloudClient,
    /// Resolved once at construction.
    interactive: bool,
    state: watch::Sender<AuthState>,
    /// Held across the network calls of a sign-in so concurrent callers
    /// queue behind one attempt.
    data: Mutex<SessionData>,
}

struct SessionData {
    credentials: Credentials,
    tokens: Option<TokenPair>,
    pending: Option<AuthFlowState>,
}

impl AuthSession {
    pub fn new(config: SessionConfig) -> Result<Self, CoreError> {
        let endpoints = config.resolved_endpoints()?;
        let transport = config.transport();
        let broker = BrokerClient::new(endpoints.broker.clone(), config.broker.clone(), &transport)?;
        let cloud = CloudClient::new(&endpoints, &transport)?;
        let interactive = broker.supports_interactive();
        let (state, _) = watch::channel(AuthState::Unauthenticated);

        debug!(region = %config.region, interactive, "session created");

        Ok(Self {
            inner: Arc::new(SessionInner {
                data: Mutex::new(SessionData {
                    credentials: config.credentials.clone(),
                    tokens: None,
                    pending: None,
                }),
                config,
                broker,
                cloud,
                interactive,
                state,
            }),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub(crate) fn cloud(&self) -> &CloudClient {
        &self.inner.cloud
    }

    /// Whether interactive (authorization-code) login is available.
    pub fn interactive_supported(&self) -> bool {
        self.inner.interactive
    }

    // ── State observation ────────────────────────────────────────

    pub fn state(&self) -> AuthState {
        *self.inner.state.borrow()
    }

    /// Subscribe to state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    /// Current broker refresh token, for the caller to persist.
    pub async fn refresh_token(&self) -> Option<SecretString> {
        self.inner.data.lock().await.credentials.refresh_token.clone()
    }

    /// The pending interactive login, if any and not yet expired.
    pub async fn pending_interaction(&self) -> Option<InteractionPrompt> {
        let data = self.inner.data.lock().await;
        data.pending
            .as_ref()
            .filter(|flow| !flow.is_expired(self.inner.config.interactive_ttl))
            .map(InteractionPrompt::from)
    }

    /// A caller dropped a sign-in midway; don't leave it looking in progress.
    pub(crate) fn interrupted(&self) {
        if self.state() == AuthState::Authenticating {
            self.set_state(AuthState::Unauthenticated);
        }
    }

    fn set_state(&self, next: AuthState) {
        let prev = self.inner.state.send_replace(next);
        if prev != next {
            info!(from = %prev, to = %next, "auth state changed");
        }
    }

    // ── Sign-in ──────────────────────────────────────────────────

    /// Run both hops. Tries the persisted refresh token before the password.
    pub async fn sign_in(&self) -> Result<SignInOutcome, CoreError> {
        let mut data = self.inner.data.lock().await;
        self.sign_in_locked(&mut data).await
    }

    async fn sign_in_locked(&self, data: &mut SessionData) -> Result<SignInOutcome, CoreError> {
        self.set_state(AuthState::Authenticating);
        data.tokens = None;

        match self.hop_one(data).await {
            Ok(identity) => self.hop_two(data, identity).await,
            Err(e) if e.is_credentials() || e.is_interaction_required() => {
                self.require_interaction(data, e).await
            }
            Err(e) => Err(self.settle_failure(e)),
        }
    }

    /// Broker grant: refresh token first, password only if there is none
    /// or the broker rejected it.
    async fn hop_one(&self, data: &mut SessionData) -> Result<IdentityToken, sharkiq_api::Error> {
        if let Some(refresh) = data.credentials.refresh_token.clone() {
            match self.inner.broker.sign_in_with_refresh_token(&refresh).await {
                Ok(identity) => return Ok(identity),
                Err(e) if e.is_credentials() => {
                    warn!("stored refresh token rejected, falling back to password grant");
                    data.credentials.refresh_token = None;
                }
                Err(e) => return Err(e),
            }
        }
        self.inner
            .broker
            .sign_in_with_password(&data.credentials.username, &data.credentials.password)
            .await
    }

    /// Device-cloud exchange, then settle into `Authenticated`.
    async fn hop_two(
        &self,
        data: &mut SessionData,
        identity: IdentityToken,
    ) -> Result<SignInOutcome, CoreError> {
        if let Some(rotated) = &identity.refresh_token {
            data.credentials.refresh_token = Some(rotated.clone());
        }

        match self
            .inner
            .cloud
            .exchange_identity_token(&identity, &self.inner.config.app)
            .await
        {
            Ok(tokens) => {
                data.tokens = Some(tokens.clone());
                data.pending = None;
                self.set_state(AuthState::Authenticated);
                Ok(SignInOutcome::Authenticated(SignedIn {
                    tokens,
                    refresh_token: identity.refresh_token,
                }))
            }
            Err(e) if e.is_interaction_required() => self.require_interaction(data, e).await,
            Err(e) => Err(self.settle_failure(e)),
        }
    }

    /// Park the session in `InteractionRequired` with a fresh flow, or fail
    /// when interactive login is not configured.
    async fn require_interaction(
        &self,
        data: &mut SessionData,
        cause: sharkiq_api::Error,
    ) -> Result<SignInOutcome, CoreError> {
        if !self.inner.interactive {
            self.set_state(AuthState::Failed);
            return Err(if cause.is_credentials() {
                cause.into()
            } else {
                CoreError::Credentials {
                    message: "interactive verification required but no redirect URI is configured"
                        .into(),
                }
            });
        }

        debug!(cause = %cause, "switching to interactive login");
        match self.inner.broker.start_interactive_flow().await {
            Ok(request) => {
                let flow = AuthFlowState::from_request(request);
                let prompt = InteractionPrompt::from(&flow);
                data.pending = Some(flow);
                self.set_state(AuthState::InteractionRequired);
                Ok(SignInOutcome::InteractionRequired(prompt))
            }
            Err(e) => Err(self.settle_failure(e)),
        }
    }

    /// Transition for a failed hop: retryable classes go back to
    /// `Unauthenticated`, everything else to `Failed`.
    fn settle_failure(&self, err: sharkiq_api::Error) -> CoreError {
        let core = CoreError::from(err);
        let next = match core {
            CoreError::Connection { .. } | CoreError::UnknownAuth { .. } | CoreError::Cancelled => {
                AuthState::Unauthenticated
            }
            _ => AuthState::Failed,
        };
        warn!(error = %core, state = %next, "sign-in failed");
        self.set_state(next);
        core
    }

    // ── Interactive continuation ─────────────────────────────────

    /// Redeem the pasted redirect (full URL or bare code).
    pub async fn complete_interaction_redirect(&self, input: &str) -> Result<SignedIn, CoreError> {
        let params = parse_redirect(input)?;
        self.complete_interaction(&params.code, params.state.as_deref())
            .await
    }

    /// Redeem an authorization code for the pending flow.
    ///
    /// A bad or spent code leaves the flow pending for another attempt; an
    /// expired flow moves the session to `Failed`.
    pub async fn complete_interaction(
        &self,
        code: &str,
        returned_state: Option<&str>,
    ) -> Result<SignedIn, CoreError> {
        let mut data = self.inner.data.lock().await;

        let Some(flow) = data.pending.as_ref() else {
            if self.state() == AuthState::InteractionRequired {
                self.set_state(AuthState::Failed);
            }
            return Err(CoreError::FlowMissing);
        };

        if flow.is_expired(self.inner.config.interactive_ttl) {
            data.pending = None;
            self.set_state(AuthState::Failed);
            return Err(CoreError::FlowExpired);
        }

        self.check_state(flow, returned_state)?;
        let verifier = flow.verifier.clone();

        self.set_state(AuthState::Authenticating);
        match self
            .inner
            .broker
            .complete_interactive_flow(code.trim(), &verifier)
            .await
        {
            Ok(identity) => {
                data.pending = None;
                match self.hop_two(&mut data, identity).await? {
                    SignInOutcome::Authenticated(signed_in) => Ok(signed_in),
                    SignInOutcome::InteractionRequired(prompt) => {
                        Err(CoreError::InteractionRequired {
                            url: prompt.authorization_url,
                        })
                    }
                }
            }
            Err(e) if e.is_credentials() => {
                self.set_state(AuthState::InteractionRequired);
                Err(e.into())
            }
            Err(e) => Err(self.settle_failure(e)),
        }
    }

    fn check_state(&self, flow: &AuthFlowState, returned: Option<&str>) -> Result<(), CoreError> {
        if returned == Some(flow.state.as_str()) {
            return Ok(());
        }
        match self.inner.config.state_validation {
            StateValidation::Require => {
                warn!("authorization response state mismatch, rejecting code");
                Err(CoreError::StateMismatch)
            }
            StateValidation::SkipUnsafe => {
                warn!("authorization response state mismatch accepted by skip_unsafe policy");
                Ok(())
            }
        }
    }

    /// Drop the pending flow without redeeming it.
    pub async fn abandon_interaction(&self) {
        let mut data = self.inner.data.lock().await;
        if data.pending.take().is_some() {
            debug!("pending interactive login abandoned");
        }
        if self.state() == AuthState::InteractionRequired {
            self.set_state(AuthState::Unauthenticated);
        }
    }

    // ── Device code ──────────────────────────────────────────────

    pub async fn start_device_code(&self) -> Result<DeviceCodeSession, CoreError> {
        Ok(self.inner.broker.start_device_code_flow().await?)
    }

    /// Poll the device-code grant to completion, then run the exchange.
    ///
    /// The session lock is not held while polling so ticks keep serving the
    /// cache in the meantime. State only changes once the lock is taken: a
    /// failed or cancelled poll leaves an existing sign-in as it was, and a
    /// denial only fails a session that has no tokens.
    pub async fn finish_device_code(
        &self,
        device: &DeviceCodeSession,
        cancel: &CancellationToken,
    ) -> Result<SignedIn, CoreError> {
        let polled = self
            .inner
            .broker
            .poll_device_code_flow(device, self.inner.config.device_code_max_wait, cancel)
            .await;

        let mut data = self.inner.data.lock().await;
        let identity = match polled {
            Ok(identity) => identity,
            Err(e) => {
                if matches!(e, sharkiq_api::Error::DeviceCodeDenied) && data.tokens.is_none() {
                    self.set_state(AuthState::Failed);
                }
                debug!(error = %e, state = %self.state(), "device-code login did not complete");
                return Err(e.into());
            }
        };

        self.set_state(AuthState::Authenticating);
        match self.hop_two(&mut data, identity).await? {
            SignInOutcome::Authenticated(signed_in) => Ok(signed_in),
            SignInOutcome::InteractionRequired(prompt) => Err(CoreError::InteractionRequired {
                url: prompt.authorization_url,
            }),
        }
    }

    // ── Token access ─────────────────────────────────────────────

    /// Return a usable access token, signing in if needed.
    ///
    /// Never touches the network while an interactive flow is pending or
    /// after a credentials failure: those need caller input first.
    pub async fn ensure_authenticated(&self) -> Result<SecretString, CoreError> {
        let mut data = self.inner.data.lock().await;

        if let Some(tokens) = &data.tokens {
            if !tokens.is_expired_at(chrono::Utc::now()) {
                return Ok(tokens.access_token.clone());
            }
            debug!("access token expired, signing in again");
        }

        match self.state() {
            AuthState::InteractionRequired => {
                let live = data
                    .pending
                    .as_ref()
                    .filter(|flow| !flow.is_expired(self.inner.config.interactive_ttl))
                    .map(|flow| flow.authorization_url.clone());
                if let Some(url) = live {
                    return Err(CoreError::InteractionRequired { url });
                }
                data.pending = None;
                self.set_state(AuthState::Failed);
                return Err(CoreError::FlowExpired);
            }
            AuthState::Failed => {
                return Err(CoreError::Credentials {
                    message: "reauthentication required".into(),
                });
            }
            _ => {}
        }

        self.access_from(self.sign_in_locked(&mut data).await?)
    }

    /// Called after the device cloud refused `stale`. Signs in again once
    /// unless another caller already replaced the token.
    pub async fn refresh_after_denied(&self, stale: &SecretString) -> Result<SecretString, CoreError> {
        let mut data = self.inner.data.lock().await;

        if let Some(tokens) = &data.tokens {
            if tokens.access_token.expose_secret() != stale.expose_secret() {
                return Ok(tokens.access_token.clone());
            }
        }

        info!("access token refused, refreshing session");
        data.tokens = None;
        self.access_from(self.sign_in_locked(&mut data).await?)
    }

    fn access_from(&self, outcome: SignInOutcome) -> Result<SecretString, CoreError> {
        match outcome {
            SignInOutcome::Authenticated(signed_in) => Ok(signed_in.tokens.access_token),
            SignInOutcome::InteractionRequired(prompt) => Err(CoreError::InteractionRequired {
                url: prompt.authorization_url,
            }),
        }
    }

    /// Run `call` with a valid access token; on access-denied, refresh once
    /// and retry.
    pub(crate) async fn authorized<T, F, Fut>(&self, mut call: F) -> Result<T, CoreError>
    where
        F: FnMut(SecretString) -> Fut,
        Fut: Future<Output = Result<T, sharkiq_api::Error>>,
    {
        let access = self.ensure_authenticated().await?;
        match call(access.clone()).await {
            Err(e) if e.is_access_denied() => {
                let fresh = self.refresh_after_denied(&access).await?;
                match call(fresh.clone()).await {
                    Err(e) if e.is_access_denied() => {
                        self.reject_access(&fresh).await;
                        Err(e.into())
                    }
                    other => other.map_err(CoreError::from),
                }
            }
            other => other.map_err(CoreError::from),
        }
    }

    /// The device cloud refused a token it had just issued. Drop it and
    /// park in `Failed` so later calls stop signing in with the same
    /// credentials until [`update_credentials`](Self::update_credentials).
    async fn reject_access(&self, refused: &SecretString) {
        let mut data = self.inner.data.lock().await;
        let current = data
            .tokens
            .as_ref()
            .is_some_and(|t| t.access_token.expose_secret() == refused.expose_secret());
        if current {
            warn!("fresh access token refused by device cloud, session needs new credentials");
            data.tokens = None;
            self.set_state(AuthState::Failed);
        }
    }

    // ── Credential changes ───────────────────────────────────────

    /// Replace the stored credentials and leave `Failed` /
    /// `InteractionRequired`. A changed username also drops the refresh
    /// token, which belongs to the old account.
    pub async fn update_credentials(&self, username: String, password: SecretString) {
        let mut data = self.inner.data.lock().await;
        if data.credentials.username != username {
            data.credentials.refresh_token = None;
        }
        data.credentials.username = username;
        data.credentials.password = password;
        data.tokens = None;
        data.pending = None;
        self.set_state(AuthState::Unauthenticated);
    }
}

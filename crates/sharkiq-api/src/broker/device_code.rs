// Device authorization grant (RFC 8628)
//
// The broker imposes no ceiling on how long a device code may be polled,
// so every wait here is bounded by the code's own expiry, a caller-supplied
// maximum, and a cancellation token.

use std::future::Future;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::broker::client::{BrokerClient, GrantReply, classify_rejection};
use crate::broker::grants::identity_from;
use crate::broker::models::{DeviceCodeResponse, OAuthErrorBody};
use crate::error::{Error, preview};
use crate::token::IdentityToken;

/// Grant type for polling the token endpoint with a device code.
pub const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Interval used when the broker omits one.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Added to the interval on every `slow_down` response.
pub const SLOW_DOWN_INCREMENT: Duration = Duration::from_secs(5);

/// Lifetime assumed when the broker omits `expires_in`.
const DEFAULT_EXPIRY: Duration = Duration::from_secs(900);

/// A started device authorization, ready to show to the user.
#[derive(Debug, Clone)]
pub struct DeviceCodeSession {
    pub device_code: SecretString,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: Option<String>,
    pub interval: Duration,
    pub expires_in: Duration,
}

impl DeviceCodeSession {
    /// The best link to show: the complete URI when offered.
    pub fn display_uri(&self) -> &str {
        self.verification_uri_complete
            .as_deref()
            .unwrap_or(&self.verification_uri)
    }
}

/// Outcome of a single poll.
#[derive(Debug)]
pub enum DeviceCodePoll {
    Pending,
    SlowDown,
    Authorized(IdentityToken),
    AccessDenied,
    Expired,
}

impl BrokerClient {
    /// Request a device code and user code.
    pub async fn start_device_code_flow(&self) -> Result<DeviceCodeSession, Error> {
        let url = self.endpoints().await?.device_code;
        debug!("POST {url}");

        let mut form = vec![
            ("client_id", self.config().client_id.as_str()),
            ("scope", self.config().scope.as_str()),
        ];
        if let Some(audience) = &self.config().audience {
            form.push(("audience", audience.as_str()));
        }

        let resp = self
            .http()
            .post(url)
            .form(&form)
            .send()
            .await
            .map_err(|e| self.transport().classify(e))?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(Error::Server {
                status: status.as_u16(),
            });
        }
        let text = resp
            .text()
            .await
            .map_err(|e| self.transport().classify(e))?;

        if !status.is_success() {
            let err: OAuthErrorBody = serde_json::from_str(&text).unwrap_or_default();
            return Err(classify_rejection(status.as_u16(), err.error.as_deref()));
        }

        let parsed: DeviceCodeResponse =
            serde_json::from_str(&text).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: preview(&text).to_owned(),
            })?;

        info!(user_code = %parsed.user_code, "device authorization started");
        Ok(DeviceCodeSession {
            device_code: SecretString::from(parsed.device_code),
            user_code: parsed.user_code,
            verification_uri: parsed.verification_uri,
            verification_uri_complete: parsed.verification_uri_complete,
            interval: parsed
                .interval
                .map_or(DEFAULT_POLL_INTERVAL, Duration::from_secs),
            expires_in: parsed.expires_in.map_or(DEFAULT_EXPIRY, Duration::from_secs),
        })
    }

    /// Poll the token endpoint once.
    pub async fn poll_device_code_once(
        &self,
        session: &DeviceCodeSession,
    ) -> Result<DeviceCodePoll, Error> {
        let form = [
            ("grant_type", DEVICE_CODE_GRANT),
            ("device_code", session.device_code.expose_secret()),
        ];
        match self.post_grant(&form).await? {
            GrantReply::Issued(resp) => identity_from(resp).map(DeviceCodePoll::Authorized),
            GrantReply::Rejected { status, error } => match error.as_deref() {
                Some("authorization_pending") => Ok(DeviceCodePoll::Pending),
                Some("slow_down") => Ok(DeviceCodePoll::SlowDown),
                Some("access_denied") => Ok(DeviceCodePoll::AccessDenied),
                Some("expired_token") => Ok(DeviceCodePoll::Expired),
                other => Err(classify_rejection(status, other)),
            },
        }
    }

    /// Poll until the user approves, the code expires, `max_wait` elapses,
    /// or `cancel` fires.
    pub async fn poll_device_code_flow(
        &self,
        session: &DeviceCodeSession,
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<IdentityToken, Error> {
        drive_device_code_poll(session, max_wait, cancel, || self.poll_device_code_once(session))
            .await
    }
}

/// The bounded wait/poll loop, independent of transport.
///
/// The first poll is immediate. `authorization_pending` waits the current
/// interval; `slow_down` grows it by [`SLOW_DOWN_INCREMENT`] first. A wait
/// that would overrun the deadline ends the loop instead of sleeping.
pub(crate) async fn drive_device_code_poll<F, Fut>(
    session: &DeviceCodeSession,
    max_wait: Duration,
    cancel: &CancellationToken,
    mut poll: F,
) -> Result<IdentityToken, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<DeviceCodePoll, Error>>,
{
    let started = Instant::now();
    let capped_by_caller = max_wait < session.expires_in;
    let deadline = started + session.expires_in.min(max_wait);
    let mut interval = session.interval;

    loop {
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            outcome = poll() => outcome?,
        };

        match outcome {
            DeviceCodePoll::Authorized(token) => {
                info!("device authorization approved");
                return Ok(token);
            }
            DeviceCodePoll::AccessDenied => return Err(Error::DeviceCodeDenied),
            DeviceCodePoll::Expired => return Err(Error::DeviceCodeExpired),
            DeviceCodePoll::SlowDown => {
                interval += SLOW_DOWN_INCREMENT;
                debug!(interval_secs = interval.as_secs(), "broker asked to slow down");
            }
            DeviceCodePoll::Pending => {}
        }

        if Instant::now() + interval > deadline {
            return Err(if capped_by_caller {
                Error::DeviceCodeTimedOut {
                    waited_secs: started.elapsed().as_secs(),
                }
            } else {
                Error::DeviceCodeExpired
            });
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            () = tokio::time::sleep(interval) => {}
        }
    }
}

//! Session and sync layer between `sharkiq-api` and consumers (the CLI).
//!
//! - **[`AuthSession`]**: Two-hop sign-in state machine. Tries a persisted
//!   refresh token before the password, exchanges the broker's identity
//!   token for device-cloud tokens, and parks in
//!   [`AuthState::InteractionRequired`] with a PKCE flow when the broker or
//!   the cloud demands browser verification. Device-code login runs through
//!   [`start_device_code()`](AuthSession::start_device_code) /
//!   [`finish_device_code()`](AuthSession::finish_device_code).
//!
//! - **[`Coordinator`]**: Owns a session and a [`DeviceStore`]. Each
//!   [`tick()`](Coordinator::tick) signs in if needed, lists devices, and
//!   swaps in a whole new [`DeviceCache`]. Concurrent ticks coalesce.
//!   Failures never escape a tick untyped: they come back as [`SyncError`]
//!   and as a [`SyncEvent`] on the broadcast channel.
//!
//! - **[`DeviceStore`]**: `ArcSwap` snapshot plus `watch` notification.
//!   Readers never block on the writer.
//!
//! The core never reads or writes files. Callers build a [`SessionConfig`]
//! and persist whatever refresh token a sign-in hands back.

pub mod config;
pub mod convert;
pub mod coordinator;
pub mod error;
pub mod flow;
pub mod model;
pub mod session;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{Credentials, SessionConfig, StateValidation};
pub use coordinator::{Coordinator, SyncEvent};
pub use error::{CacheDisposition, CoreError, SyncError, SyncErrorKind};
pub use flow::{AuthFlowState, InteractionPrompt, RedirectParams, parse_redirect};
pub use model::{Device, ERROR_CODE_PROPERTY, mask_serial};
pub use session::{AuthSession, AuthState, SignInOutcome, SignedIn};
pub use store::{DeviceCache, DeviceStore};

// Types callers need to build a `SessionConfig` or handle login prompts.
pub use sharkiq_api::{
    AppCredentials, BrokerConfig, DatapointAck, DeviceCodeSession, Endpoints, Region, TlsMode,
};

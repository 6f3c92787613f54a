// First hop: the OAuth/OIDC identity broker.

pub mod client;
pub mod device_code;
mod grants;
pub mod interactive;
pub mod models;
pub mod pkce;

pub use client::{BrokerClient, BrokerConfig, DEFAULT_SCOPE};
pub use device_code::{DeviceCodePoll, DeviceCodeSession};
pub use interactive::AuthorizationRequest;
pub use pkce::PkcePair;

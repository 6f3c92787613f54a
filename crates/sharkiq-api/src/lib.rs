// sharkiq-api: Async Rust client for the SharkIQ identity broker and Ayla device cloud

pub mod broker;
pub mod cloud;
pub mod error;
pub mod region;
pub mod token;
pub mod transport;

pub use broker::{
    AuthorizationRequest, BrokerClient, BrokerConfig, DeviceCodePoll, DeviceCodeSession,
};
pub use cloud::{AppCredentials, CloudClient, DatapointAck, DeviceListing, DeviceRecord};
pub use error::Error;
pub use region::{Endpoints, Region};
pub use token::{IdentityToken, TokenPair};
pub use transport::{TlsMode, TransportConfig};

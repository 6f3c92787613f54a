use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;

/// Logical account region.
///
/// Determines which identity-broker and device-cloud hosts a session talks
/// to. The table is static; nothing is discovered at runtime.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Region {
    /// North America (default).
    #[default]
    #[strum(serialize = "north_america", serialize = "na", serialize = "us")]
    NorthAmerica,
    /// Europe.
    #[strum(serialize = "europe", serialize = "eu")]
    Europe,
}

impl Region {
    /// Identity broker origin.
    pub fn broker_host(self) -> &'static str {
        match self {
            Self::NorthAmerica => "https://login.sharkninja.com",
            Self::Europe => "https://logineu.sharkninja.com",
        }
    }

    /// Device-cloud user service origin (token exchange).
    pub fn user_service_host(self) -> &'static str {
        match self {
            Self::NorthAmerica => "https://user-sharkue1.aylanetworks.com",
            Self::Europe => "https://user-field-eu.aylanetworks.com",
        }
    }

    /// Device-cloud device service origin (listing, datapoints).
    pub fn device_service_host(self) -> &'static str {
        match self {
            Self::NorthAmerica => "https://ads-sharkue1.aylanetworks.com",
            Self::Europe => "https://ads-eu.aylanetworks.com",
        }
    }

    /// Resolve this region's hosts into parsed endpoints.
    pub fn endpoints(self) -> Result<Endpoints, Error> {
        Ok(Endpoints {
            broker: Url::parse(self.broker_host())?,
            user_service: Url::parse(self.user_service_host())?,
            device_service: Url::parse(self.device_service_host())?,
        })
    }
}

/// Concrete origins for one session.
///
/// Normally derived from [`Region::endpoints`]; tests and staging
/// deployments construct it directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub broker: Url,
    pub user_service: Url,
    pub device_service: Url,
}

impl Endpoints {
    /// Point every service at a single origin (mock servers).
    pub fn single_origin(origin: &Url) -> Self {
        Self {
            broker: origin.clone(),
            user_service: origin.clone(),
            device_service: origin.clone(),
        }
    }
}

/// Join `path` onto `base`, tolerating a trailing slash on either side.
pub(crate) fn join(base: &Url, path: &str) -> Result<Url, Error> {
    let full = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Ok(Url::parse(&full)?)
}

use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;

/// Identity token issued by the broker (first hop).
///
/// Only ever consumed by the device-cloud exchange; never logged.
#[derive(Debug, Clone)]
pub struct IdentityToken {
    pub token: SecretString,
    /// Broker refresh token, present when `offline_access` was granted.
    pub refresh_token: Option<SecretString>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Device-cloud access/refresh pair (second hop).
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenPair {
    /// Whether the access token is known to have expired at `now`.
    ///
    /// A pair without an expiry is treated as valid until the device cloud
    /// refuses it.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Convert a relative `expires_in` into an absolute deadline.
pub(crate) fn expiry_from(expires_in: Option<u64>) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(expires_in?).ok()?;
    Utc::now().checked_add_signed(Duration::seconds(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_without_expiry_never_expires() {
        let pair = TokenPair {
            access_token: SecretString::from("a"),
            refresh_token: None,
            expires_at: None,
        };
        assert!(!pair.is_expired_at(Utc::now()));
    }

    #[test]
    fn expiry_from_is_in_the_future() {
        let at = expiry_from(Some(3600)).expect("finite expiry");
        assert!(at > Utc::now());
        assert!(expiry_from(None).is_none());
    }
}

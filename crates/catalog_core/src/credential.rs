//! Credential selection for object store locations.
//!
//! A SAS token is used while it is still valid; once it has expired (or when
//! the location carries none) the account key is used instead. Credentials
//! are resolved on every access and never stored.

use crate::error::ConfigError;
use crate::location::{ObjectStoreLocation, keys};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;
use tracing::debug;

/// Format of the `expiryTime` parameter.
pub const EXPIRY_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Clone, PartialEq, Eq)]
pub enum Secret {
    SasToken(String),
    AccountKey(String),
}

impl Secret {
    pub fn expose(&self) -> &str {
        match self {
            Self::SasToken(s) | Self::AccountKey(s) => s,
        }
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SasToken(_) => f.write_str("SasToken(<redacted>)"),
            Self::AccountKey(_) => f.write_str("AccountKey(<redacted>)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub secret: Secret,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Parses an `expiryTime` value, e.g. `2030-01-31T23:59:59Z`.
pub fn parse_expiry(value: &str) -> Result<DateTime<Utc>, ConfigError> {
    NaiveDateTime::parse_from_str(value, EXPIRY_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| ConfigError::Invalid {
            key: keys::EXPIRY_TIME,
            value: value.to_string(),
            reason: format!("expected YYYY-MM-DDTHH:MM:SSZ ({e})"),
        })
}

/// Resolves the credential for `location` against the current wall clock.
pub fn resolve(location: &ObjectStoreLocation) -> Result<Credential, ConfigError> {
    resolve_at(location, Utc::now())
}

/// Resolves the credential for `location` as of `now`.
pub fn resolve_at(
    location: &ObjectStoreLocation,
    now: DateTime<Utc>,
) -> Result<Credential, ConfigError> {
    if location.account_url.is_empty() {
        return Err(ConfigError::Missing(keys::ACCOUNT_URL));
    }
    if location.container_name.is_empty() {
        return Err(ConfigError::Missing(keys::CONTAINER_NAME));
    }

    if let (Some(token), Some(expiry)) = (&location.sas_token, &location.expiry_time) {
        let expires_at = parse_expiry(expiry)?;
        if expires_at >= now {
            debug!(container = %location.container_name, %expires_at, "Using SAS token");
            return Ok(Credential {
                secret: Secret::SasToken(token.clone()),
                expires_at: Some(expires_at),
            });
        }
        debug!(container = %location.container_name, %expires_at, "SAS token expired");
    }

    match location.account_key.as_deref().filter(|k| !k.is_empty()) {
        Some(key) => {
            debug!(container = %location.container_name, "Using account key");
            Ok(Credential {
                secret: Secret::AccountKey(key.to_string()),
                expires_at: None,
            })
        }
        None => Err(ConfigError::Missing(keys::ACCOUNT_KEY)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn location() -> ObjectStoreLocation {
        ObjectStoreLocation::new("https://acc.blob.core.windows.net", "data")
    }

    fn stamp(t: DateTime<Utc>) -> String {
        t.format(EXPIRY_FORMAT).to_string()
    }

    #[test]
    fn valid_sas_token_is_preferred() {
        let now = Utc::now();
        let loc = location()
            .with_sas_token("T", stamp(now + Duration::hours(1)))
            .with_account_key("K");

        let credential = resolve_at(&loc, now).unwrap();
        assert_eq!(credential.secret, Secret::SasToken("T".into()));
        assert!(credential.expires_at.is_some());
    }

    #[test]
    fn expired_sas_token_falls_back_to_account_key() {
        let now = Utc::now();
        let loc = location()
            .with_sas_token("T", stamp(now - Duration::hours(1)))
            .with_account_key("K");

        let credential = resolve_at(&loc, now).unwrap();
        assert_eq!(credential.secret.expose(), "K");
        assert_eq!(credential.expires_at, None);
    }

    #[test]
    fn token_expiring_exactly_now_is_still_valid() {
        let now = parse_expiry("2030-06-01T12:00:00Z").unwrap();
        let loc = location().with_sas_token("T", "2030-06-01T12:00:00Z");
        assert_eq!(resolve_at(&loc, now).unwrap().secret.expose(), "T");
    }

    #[test]
    fn malformed_expiry_is_invalid_configuration() {
        let loc = location()
            .with_sas_token("T", "tomorrow")
            .with_account_key("K");

        match resolve_at(&loc, Utc::now()) {
            Err(ConfigError::Invalid { key, value, .. }) => {
                assert_eq!(key, keys::EXPIRY_TIME);
                assert_eq!(value, "tomorrow");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn token_without_expiry_is_ignored() {
        let mut loc = location().with_account_key("K");
        loc.sas_token = Some("T".into());
        assert_eq!(resolve_at(&loc, Utc::now()).unwrap().secret.expose(), "K");
    }

    #[test]
    fn expired_token_without_key_is_missing_configuration() {
        let now = Utc::now();
        let loc = location().with_sas_token("T", stamp(now - Duration::seconds(1)));
        assert_eq!(
            resolve_at(&loc, now),
            Err(ConfigError::Missing(keys::ACCOUNT_KEY))
        );
    }

    #[test]
    fn missing_container_fails_before_credentials() {
        let loc = ObjectStoreLocation::new("https://acc.blob.core.windows.net", "")
            .with_account_key("K");
        assert_eq!(
            resolve_at(&loc, Utc::now()),
            Err(ConfigError::Missing(keys::CONTAINER_NAME))
        );
    }
}

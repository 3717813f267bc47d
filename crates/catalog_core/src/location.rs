//! Where an asset's data lives.
//!
//! A [`Location`] is the loose shape the catalog service hands out: a type tag
//! and an ordered bag of string parameters. Before any I/O it is converted
//! into a [`ResolvedLocation`], whose variants hold their required parameters
//! as plain fields.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Parameter keys understood by the resolver.
pub mod keys {
    pub const URL: &str = "url";
    pub const ACCOUNT_URL: &str = "accountUrl";
    pub const CONTAINER_NAME: &str = "containerName";
    pub const SAS_TOKEN: &str = "sasToken";
    pub const EXPIRY_TIME: &str = "expiryTime";
    pub const ACCOUNT_KEY: &str = "accountKey";
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LocationType {
    Url,
    ObjectStore,
    Other(String),
}

impl LocationType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Url => "url",
            Self::ObjectStore => "objectStore",
            Self::Other(tag) => tag,
        }
    }
}

impl From<&str> for LocationType {
    fn from(tag: &str) -> Self {
        match tag {
            "url" => Self::Url,
            // `azureblob` is the tag older catalog entries were written with.
            "objectStore" | "azureblob" => Self::ObjectStore,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for LocationType {
    fn from(tag: String) -> Self {
        Self::from(tag.as_str())
    }
}

impl From<LocationType> for String {
    fn from(kind: LocationType) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for LocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub key: String,
    pub value: String,
}

/// An immutable, typed key/value description of where data lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(rename = "type")]
    kind: LocationType,
    #[serde(default)]
    parameters: Vec<Parameter>,
}

impl Location {
    pub fn new<K, V>(
        kind: impl Into<LocationType>,
        parameters: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            kind: kind.into(),
            parameters: parameters
                .into_iter()
                .map(|(key, value)| Parameter {
                    key: key.into(),
                    value: value.into(),
                })
                .collect(),
        }
    }

    pub fn kind(&self) -> &LocationType {
        &self.kind
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Returns the value of the first parameter named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or(ConfigError::Missing(key))
    }

    fn optional(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| !v.is_empty()).map(str::to_string)
    }

    /// Converts the parameter bag into the typed variant for its kind.
    pub fn resolve(&self) -> Result<ResolvedLocation, ConfigError> {
        match &self.kind {
            LocationType::Url => Ok(ResolvedLocation::Url(UrlLocation {
                url: self.required(keys::URL)?,
            })),
            LocationType::ObjectStore => Ok(ResolvedLocation::ObjectStore(ObjectStoreLocation {
                account_url: self.required(keys::ACCOUNT_URL)?,
                container_name: self.required(keys::CONTAINER_NAME)?,
                sas_token: self.optional(keys::SAS_TOKEN),
                expiry_time: self.optional(keys::EXPIRY_TIME),
                account_key: self.optional(keys::ACCOUNT_KEY),
            })),
            LocationType::Other(tag) => Err(ConfigError::UnsupportedLocationType(tag.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedLocation {
    Url(UrlLocation),
    ObjectStore(ObjectStoreLocation),
}

/// A single resource reachable with a plain HTTP GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlLocation {
    pub url: String,
}

/// A blob container addressed by account URL and container name.
#[derive(Clone, PartialEq, Eq)]
pub struct ObjectStoreLocation {
    pub account_url: String,
    pub container_name: String,
    pub sas_token: Option<String>,
    /// Raw `expiryTime` parameter, parsed by the credential resolver.
    pub expiry_time: Option<String>,
    pub account_key: Option<String>,
}

impl ObjectStoreLocation {
    pub fn new(account_url: impl Into<String>, container_name: impl Into<String>) -> Self {
        Self {
            account_url: account_url.into(),
            container_name: container_name.into(),
            sas_token: None,
            expiry_time: None,
            account_key: None,
        }
    }

    pub fn with_sas_token(mut self, token: impl Into<String>, expiry: impl Into<String>) -> Self {
        self.sas_token = Some(token.into());
        self.expiry_time = Some(expiry.into());
        self
    }

    pub fn with_account_key(mut self, key: impl Into<String>) -> Self {
        self.account_key = Some(key.into());
        self
    }
}

impl fmt::Debug for ObjectStoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreLocation")
            .field("account_url", &self.account_url)
            .field("container_name", &self.container_name)
            .field("sas_token", &self.sas_token.as_ref().map(|_| "<redacted>"))
            .field("expiry_time", &self.expiry_time)
            .field("account_key", &self.account_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

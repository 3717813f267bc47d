use crate::location::LocationType;
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

/// Problems with the parameters a location carries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing location parameter `{0}`")]
    Missing(&'static str),

    #[error("Invalid value {value:?} for location parameter `{key}`: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Unsupported location type: {0}")]
    UnsupportedLocationType(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Unsupported format: {0}")]
    Unsupported(String),

    #[error("Could not parse {format} data: {reason}")]
    Parse {
        format: &'static str,
        reason: String,
    },
}

impl FormatError {
    pub(crate) fn parse(format: &'static str, reason: impl fmt::Display) -> Self {
        Self::Parse {
            format,
            reason: reason.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Storage backend error: {0}")]
    Transfer(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Version `{version}` of asset `{asset_id}` not found")]
    NotFound { asset_id: String, version: String },

    #[error("Asset `{0}` not found")]
    AssetNotFound(String),

    #[error("Version service returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("Version service transport error: {0}")]
    Transport(String),
}

/// Why a versioned fetch refused an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    Missing,
    ModifiedAfter {
        last_modified: DateTime<Utc>,
        watermark: DateTime<Utc>,
    },
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "was not found"),
            Self::ModifiedAfter {
                last_modified,
                watermark,
            } => write!(
                f,
                "was modified at {last_modified}, after the recorded watermark {watermark}"
            ),
        }
    }
}

/// Errors surfaced by [`crate::fetcher::DataFetcher::get_data`].
///
/// Every variant names the asset it was raised for, and where it applies the
/// location type and the object involved.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Asset `{asset_id}` has no location")]
    MissingLocation { asset_id: String },

    #[error("Asset `{asset_id}` ({location_type} location) is missing parameter `{key}`")]
    MissingConfiguration {
        asset_id: String,
        location_type: LocationType,
        key: &'static str,
    },

    #[error(
        "Asset `{asset_id}` ({location_type} location) has invalid parameter `{key}` = {value:?}: {reason}"
    )]
    InvalidConfiguration {
        asset_id: String,
        location_type: LocationType,
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Asset `{asset_id}` has unsupported location type `{location_type}`")]
    UnsupportedLocationType {
        asset_id: String,
        location_type: String,
    },

    #[error("Asset `{asset_id}` has unsupported format `{format}`")]
    UnsupportedFormat { asset_id: String, format: String },

    #[error("Could not parse object `{object}` of asset `{asset_id}`: {source}")]
    ParseError {
        asset_id: String,
        object: String,
        #[source]
        source: FormatError,
    },

    #[error("Asset `{asset_id}` ({location_type} location): {what} not found")]
    NotFound {
        asset_id: String,
        location_type: LocationType,
        what: String,
    },

    #[error(
        "Version `{version}` of asset `{asset_id}` is stale or incomplete: object `{object}` {reason}"
    )]
    StaleOrMissingVersion {
        asset_id: String,
        version: String,
        object: String,
        reason: StaleReason,
    },

    #[error(
        "Transfer of `{object}` for asset `{asset_id}` ({location_type} location) failed: {source}"
    )]
    TransferError {
        asset_id: String,
        location_type: LocationType,
        object: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

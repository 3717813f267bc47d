use crate::error::{FetchError, VersionError};
use crate::fetcher::DataFetcher;
use crate::location::Location;
use crate::table::Table;
use crate::traits::*;
use crate::version::{ListFormat, Version, VersionListing};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Asset record as returned by the catalog service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetResponse {
    pub id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub location: Option<LocationResponse>,
    pub tags: Option<Vec<String>>,
    pub format: Option<String>,
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationResponse {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub parameters: Option<Vec<ParameterResponse>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterResponse {
    pub key: Option<String>,
    pub value: Option<String>,
}

/// A catalogued dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub location: Option<Location>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Declared data format, e.g. `csv` or `json`.
    pub format: Option<String>,
    pub namespace: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Asset {
    pub fn new(id: impl Into<String>, format: impl Into<String>, location: Location) -> Self {
        Self {
            id: id.into(),
            format: Some(format.into()),
            location: Some(location),
            ..Default::default()
        }
    }

    /// Maps the service representation into an [`Asset`].
    ///
    /// A location without a type tag is dropped, as are parameters without a key.
    pub fn from_response(response: AssetResponse) -> Self {
        let location = response.location.and_then(|loc| {
            let kind = loc.kind?;
            let parameters = loc
                .parameters
                .unwrap_or_default()
                .into_iter()
                .filter_map(|p| Some((p.key?, p.value.unwrap_or_default())));
            Some(Location::new(kind, parameters))
        });

        Self {
            id: response.id.unwrap_or_default(),
            name: response.name.unwrap_or_default(),
            description: response.description,
            short_description: response.short_description,
            location,
            tags: response.tags.unwrap_or_default(),
            format: response.format,
            namespace: response.namespace,
            created_at: response.created_at,
            updated_at: response.updated_at,
        }
    }
}

impl From<AssetResponse> for Asset {
    fn from(response: AssetResponse) -> Self {
        Self::from_response(response)
    }
}

/// An [`Asset`] bound to the collaborators that can load its data and versions.
pub struct AssetHandle<'a, V, S, H> {
    fetcher: &'a DataFetcher<V, S, H>,
    asset: &'a Asset,
}

impl<'a, V, S, H> AssetHandle<'a, V, S, H>
where
    V: VersionService,
    S: ObjectStore,
    H: HttpFetcher,
{
    pub(crate) fn new(fetcher: &'a DataFetcher<V, S, H>, asset: &'a Asset) -> Self {
        Self { fetcher, asset }
    }

    pub fn asset(&self) -> &Asset {
        self.asset
    }

    /// See [`DataFetcher::get_data`].
    pub async fn get_data(&self, version: Option<&str>) -> Result<Table, FetchError> {
        self.fetcher.get_data(self.asset, version).await
    }

    #[instrument(skip(self), fields(asset_id = %self.asset.id))]
    pub async fn get_version(&self, name: &str) -> Result<Version, VersionError> {
        self.fetcher
            .deadline(
                self.fetcher.versions().get_version(&self.asset.id, name),
                timed_out,
            )
            .await
    }

    #[instrument(skip(self), fields(asset_id = %self.asset.id))]
    pub async fn list_versions(&self, format: ListFormat) -> Result<VersionListing, VersionError> {
        let versions = self
            .fetcher
            .deadline(
                self.fetcher.versions().list_versions(&self.asset.id),
                timed_out,
            )
            .await?;
        Ok(VersionListing::build(versions, format))
    }

    /// Records the asset's current state as a new version.
    #[instrument(skip(self), fields(asset_id = %self.asset.id))]
    pub async fn create_version(&self) -> Result<Version, VersionError> {
        self.fetcher
            .deadline(
                self.fetcher.versions().create_version(&self.asset.id),
                timed_out,
            )
            .await
    }

    #[instrument(skip(self), fields(asset_id = %self.asset.id))]
    pub async fn delete_version(&self, name: &str) -> Result<(), VersionError> {
        self.fetcher
            .deadline(
                self.fetcher.versions().delete_version(&self.asset.id, name),
                timed_out,
            )
            .await
    }
}

fn timed_out() -> VersionError {
    VersionError::Transport("request to the version service timed out".into())
}

//! Resolving an asset's location into a [`Table`].

use crate::asset::{Asset, AssetHandle};
use crate::credential;
use crate::error::*;
use crate::format::{self, DataFormat};
use crate::location::{LocationType, ObjectStoreLocation, ResolvedLocation, UrlLocation};
use crate::table::Table;
use crate::traits::*;
use crate::version::Version;

use futures::{StreamExt, TryStreamExt, stream};
use std::pin::pin;
use std::time::Duration;
use tracing::{debug, instrument, warn};

#[derive(Clone, Debug)]
pub struct FetchConfig {
    /// Objects validated or downloaded at the same time within one call.
    ///
    /// Defaults to `4`.
    pub max_concurrency: usize,
    /// Deadline for every network call. `None` waits indefinitely.
    ///
    /// Defaults to 30 seconds.
    pub request_timeout: Option<Duration>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            request_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Fetches asset data through the injected collaborators.
#[derive(Clone)]
pub struct DataFetcher<V, S, H> {
    versions: V,
    store: S,
    http: H,
    config: FetchConfig,
}

impl<V, S, H> DataFetcher<V, S, H>
where
    V: VersionService,
    S: ObjectStore,
    H: HttpFetcher,
{
    pub fn new(versions: V, store: S, http: H) -> Self {
        Self {
            versions,
            store,
            http,
            config: FetchConfig::default(),
        }
    }

    pub fn with_config(mut self, config: FetchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn versions(&self) -> &V {
        &self.versions
    }

    /// Binds `asset` to this fetcher.
    pub fn asset<'a>(&'a self, asset: &'a Asset) -> AssetHandle<'a, V, S, H> {
        AssetHandle::new(self, asset)
    }

    /// Runs `fut` under the configured request timeout.
    pub(crate) async fn deadline<T, E>(
        &self,
        fut: impl Future<Output = Result<T, E>>,
        on_timeout: impl FnOnce() -> E,
    ) -> Result<T, E> {
        match self.config.request_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .unwrap_or_else(|_| Err(on_timeout())),
            None => fut.await,
        }
    }

    /// Loads the asset's data, optionally as recorded by version `version`.
    ///
    /// Versions only apply to object store locations and are ignored for
    /// single-resource `url` locations.
    #[instrument(skip(self, asset), fields(asset_id = %asset.id))]
    pub async fn get_data(&self, asset: &Asset, version: Option<&str>) -> Result<Table, FetchError> {
        let location = asset
            .location
            .as_ref()
            .ok_or_else(|| FetchError::MissingLocation {
                asset_id: asset.id.clone(),
            })?;

        let ctx = Context {
            asset_id: &asset.id,
            location_type: location.kind(),
        };

        let resolved = location.resolve().map_err(|e| ctx.config(e))?;
        let format = ctx.format(asset.format.as_deref())?;

        match resolved {
            ResolvedLocation::Url(url) => {
                if let Some(version) = version {
                    warn!(version, "Versions are not tracked for url locations, ignoring");
                }
                self.fetch_url(ctx, &url, format).await
            }
            ResolvedLocation::ObjectStore(store) => {
                self.fetch_store(ctx, &store, version, format).await
            }
        }
    }

    async fn fetch_url(
        &self,
        ctx: Context<'_>,
        location: &UrlLocation,
        format: DataFormat,
    ) -> Result<Table, FetchError> {
        let url = location.url.as_str();
        debug!(url, "Fetching single resource");

        let data = self
            .deadline(
                async { collect_stream(self.http.get(url).await?).await },
                || StorageError::Timeout(url.to_string()),
            )
            .await
            .map_err(|e| ctx.storage(url, e))?;

        format::parse(&data, format).map_err(|e| ctx.parse(url, e))
    }

    async fn fetch_store(
        &self,
        ctx: Context<'_>,
        location: &ObjectStoreLocation,
        version: Option<&str>,
        format: DataFormat,
    ) -> Result<Table, FetchError> {
        // Fail on unusable credentials before touching the network.
        credential::resolve(location).map_err(|e| ctx.config(e))?;

        let objects = match version {
            None => self
                .deadline(self.store.list_objects(location), || {
                    StorageError::Timeout(format!("listing {}", location.container_name))
                })
                .await
                .map_err(|e| ctx.storage(&location.container_name, e))?,
            Some(name) => {
                let manifest = self
                    .deadline(self.versions.get_version(ctx.asset_id, name), || {
                        VersionError::Transport(format!("timed out fetching version `{name}`"))
                    })
                    .await
                    .map_err(|e| ctx.version(name, e))?;
                self.validate(ctx, location, &manifest).await?
            }
        };

        debug!(
            container = %location.container_name,
            objects = objects.len(),
            "Downloading objects"
        );

        let tables = self
            .in_order(
                objects
                    .into_iter()
                    .map(|object| self.load(ctx, location, object, format)),
            )
            .await?;

        Ok(Table::concat(tables))
    }

    /// Looks up every manifest entry and rejects the version if any object is
    /// gone or was modified after its watermark.
    async fn validate(
        &self,
        ctx: Context<'_>,
        location: &ObjectStoreLocation,
        manifest: &Version,
    ) -> Result<Vec<PhysicalObject>, FetchError> {
        let stale = |object: &str, reason: StaleReason| {
            warn!(version = %manifest.name, object, %reason, "Version no longer matches the store");
            FetchError::StaleOrMissingVersion {
                asset_id: ctx.asset_id.to_string(),
                version: manifest.name.clone(),
                object: object.to_string(),
                reason,
            }
        };

        self.in_order(manifest.contents.iter().map(|entry| async move {
            let found = self
                .deadline(self.store.get_object(location, &entry.name), || {
                    StorageError::Timeout(entry.name.clone())
                })
                .await;

            match found {
                Ok(object) if object.last_modified > entry.last_modified => Err(stale(
                    &entry.name,
                    StaleReason::ModifiedAfter {
                        last_modified: object.last_modified,
                        watermark: entry.last_modified,
                    },
                )),
                Ok(object) => Ok(object),
                Err(StorageError::NotFound(_)) => Err(stale(&entry.name, StaleReason::Missing)),
                Err(e) => Err(ctx.storage(&entry.name, e)),
            }
        }))
        .await
    }

    /// Runs `tasks` at most `max_concurrency` at a time and returns their
    /// results in input order. The first error drops every task still running.
    async fn in_order<T, F>(&self, tasks: impl IntoIterator<Item = F>) -> Result<Vec<T>, FetchError>
    where
        F: Future<Output = Result<T, FetchError>>,
    {
        let mut running = pin!(
            stream::iter(tasks.into_iter().enumerate())
                .map(|(i, task)| async move { task.await.map(|value| (i, value)) })
                .buffer_unordered(self.config.max_concurrency.max(1))
        );

        let mut done = Vec::new();
        while let Some(item) = running.try_next().await? {
            done.push(item);
        }
        done.sort_unstable_by_key(|(i, _)| *i);
        Ok(done.into_iter().map(|(_, value)| value).collect())
    }

    async fn load(
        &self,
        ctx: Context<'_>,
        location: &ObjectStoreLocation,
        object: PhysicalObject,
        format: DataFormat,
    ) -> Result<Table, FetchError> {
        debug!(object = %object.name, "Downloading object");
        let data = self
            .deadline(
                async { collect_stream(self.store.download(location, &object).await?).await },
                || StorageError::Timeout(object.name.clone()),
            )
            .await
            .map_err(|e| ctx.storage(&object.name, e))?;

        format::parse(&data, format).map_err(|e| ctx.parse(&object.name, e))
    }
}

/// What every error raised during one `get_data` call is tagged with.
#[derive(Clone, Copy)]
struct Context<'a> {
    asset_id: &'a str,
    location_type: &'a LocationType,
}

impl Context<'_> {
    fn format(&self, format: Option<&str>) -> Result<DataFormat, FetchError> {
        let tag = format.unwrap_or_default();
        tag.parse().map_err(|_| FetchError::UnsupportedFormat {
            asset_id: self.asset_id.to_string(),
            format: tag.to_string(),
        })
    }

    fn config(&self, err: ConfigError) -> FetchError {
        let asset_id = self.asset_id.to_string();
        let location_type = self.location_type.clone();
        match err {
            ConfigError::Missing(key) => FetchError::MissingConfiguration {
                asset_id,
                location_type,
                key,
            },
            ConfigError::Invalid { key, value, reason } => FetchError::InvalidConfiguration {
                asset_id,
                location_type,
                key,
                value,
                reason,
            },
            ConfigError::UnsupportedLocationType(tag) => FetchError::UnsupportedLocationType {
                asset_id,
                location_type: tag,
            },
        }
    }

    fn storage(&self, object: &str, err: StorageError) -> FetchError {
        match err {
            StorageError::NotFound(name) => FetchError::NotFound {
                asset_id: self.asset_id.to_string(),
                location_type: self.location_type.clone(),
                what: format!("object `{name}`"),
            },
            StorageError::Config(e) => self.config(e),
            other => FetchError::TransferError {
                asset_id: self.asset_id.to_string(),
                location_type: self.location_type.clone(),
                object: object.to_string(),
                source: Box::new(other),
            },
        }
    }

    fn version(&self, version: &str, err: VersionError) -> FetchError {
        let what = match &err {
            VersionError::NotFound { .. } => format!("version `{version}`"),
            VersionError::AssetNotFound(id) => format!("asset `{id}`"),
            _ => {
                return FetchError::TransferError {
                    asset_id: self.asset_id.to_string(),
                    location_type: self.location_type.clone(),
                    object: format!("version `{version}`"),
                    source: Box::new(err),
                };
            }
        };
        FetchError::NotFound {
            asset_id: self.asset_id.to_string(),
            location_type: self.location_type.clone(),
            what,
        }
    }

    fn parse(&self, object: &str, err: FormatError) -> FetchError {
        match err {
            FormatError::Unsupported(format) => FetchError::UnsupportedFormat {
                asset_id: self.asset_id.to_string(),
                format,
            },
            source => FetchError::ParseError {
                asset_id: self.asset_id.to_string(),
                object: object.to_string(),
                source,
            },
        }
    }
}

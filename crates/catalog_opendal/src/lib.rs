//! Blob container access through [OpenDAL](https://opendal.apache.org).
//!
//! [`OpendalStore::azblob`] talks to Azure Blob Storage. A fresh operator is
//! built for every call from the credential resolved at that moment, so an
//! expired SAS token is replaced by the account key without restarting.
//! [`OpendalStore::new`] wraps an already configured operator instead, which
//! lets any other OpenDAL service (s3, gcs, fs, ...) stand in for a container.

use catalog_core::credential::{self, Credential, Secret};
use catalog_core::prelude::*;
use chrono::{DateTime, NaiveDateTime, Utc};
use opendal::layers::TimeoutLayer;
use opendal::services::Azblob;
use opendal::{ErrorKind, Metadata, Operator};
use std::time::Duration;
use tracing::{debug, error, instrument};
use url::{Host, Url};

#[derive(Clone)]
enum Backend {
    Azblob,
    Fixed(Operator),
}

#[derive(Clone)]
pub struct OpendalStore {
    backend: Backend,
    timeout: Option<Duration>,
}

impl OpendalStore {
    /// Create a new store from an OpenDAL Operator rooted at the container.
    ///
    /// Locations are still resolved (and their credentials checked) on every
    /// call, but the operator itself is reused.
    pub fn new(op: Operator) -> Self {
        Self {
            backend: Backend::Fixed(op),
            timeout: None,
        }
    }

    /// Create a store that connects to the Azure Blob container each location names.
    pub fn azblob() -> Self {
        Self {
            backend: Backend::Azblob,
            timeout: None,
        }
    }

    /// Applies a per-operation timeout to every operator this store uses.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn operator(&self, location: &ObjectStoreLocation) -> Result<Operator, StorageError> {
        let credential = credential::resolve(location)?;
        let op = match &self.backend {
            Backend::Fixed(op) => op.clone(),
            Backend::Azblob => azblob_operator(location, &credential)?,
        };

        Ok(match self.timeout {
            Some(timeout) => op.layer(TimeoutLayer::new().with_timeout(timeout)),
            None => op,
        })
    }
}

/// Extracts the storage account name from an account URL.
///
/// `https://myaccount.blob.core.windows.net` gives `myaccount`; emulator
/// style URLs such as `http://127.0.0.1:10000/devstoreaccount1` carry the
/// account as their first path segment.
pub fn account_name(account_url: &str) -> Result<String, ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        key: keys::ACCOUNT_URL,
        value: account_url.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(account_url).map_err(|e| invalid(&e.to_string()))?;
    let name = match url.host() {
        Some(Host::Domain(domain)) if domain != "localhost" => {
            domain.split('.').next().map(str::to_string)
        }
        Some(_) => url
            .path_segments()
            .and_then(|mut segments| segments.next())
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        None => None,
    };

    name.filter(|n| !n.is_empty())
        .ok_or_else(|| invalid("cannot determine the storage account name"))
}

fn azblob_operator(
    location: &ObjectStoreLocation,
    credential: &Credential,
) -> Result<Operator, StorageError> {
    let builder = Azblob::default()
        .endpoint(&location.account_url)
        .container(&location.container_name)
        .root("/");

    let builder = match &credential.secret {
        Secret::SasToken(token) => builder.sas_token(token),
        Secret::AccountKey(key) => builder
            .account_name(&account_name(&location.account_url)?)
            .account_key(key),
    };

    Operator::new(builder)
        .map(|b| b.finish())
        .map_err(|e| StorageError::Transfer(format!("OpenDAL Azblob Error: {e}")))
}

fn map_err(name: &str, e: opendal::Error) -> StorageError {
    if e.kind() == ErrorKind::NotFound {
        debug!(name, "Object not found");
        return StorageError::NotFound(name.to_string());
    }
    error!("OpenDAL operation on {name} failed: {e}");
    StorageError::Transfer(format!("OpenDAL Error: {e}"))
}

/// Normalizes OpenDAL's timestamp through its text rendering.
fn last_modified(meta: &Metadata) -> Option<DateTime<Utc>> {
    let rendered = meta.last_modified()?.to_string();
    DateTime::parse_from_rfc3339(&rendered)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            let trimmed = rendered.strip_suffix(" UTC")?;
            NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(|t| t.and_utc())
        })
}

async fn describe(op: &Operator, name: &str, meta: Option<&Metadata>) -> Result<PhysicalObject, StorageError> {
    let stat;
    let meta = match meta.filter(|m| last_modified(m).is_some()) {
        Some(meta) => meta,
        None => {
            stat = op.stat(name).await.map_err(|e| map_err(name, e))?;
            &stat
        }
    };

    if !meta.is_file() {
        return Err(StorageError::NotFound(name.to_string()));
    }
    let last_modified = last_modified(meta).ok_or_else(|| {
        StorageError::Transfer(format!("Store reported no last-modified time for {name}"))
    })?;

    Ok(PhysicalObject {
        name: name.to_string(),
        last_modified,
        size: Some(meta.content_length()),
    })
}

impl ObjectStore for OpendalStore {
    #[instrument(skip(self, location), fields(container = %location.container_name))]
    async fn list_objects(
        &self,
        location: &ObjectStoreLocation,
    ) -> Result<Vec<PhysicalObject>, StorageError> {
        let op = self.operator(location)?;

        debug!("Listing container...");
        let entries = op
            .list("/")
            .await
            .map_err(|e| map_err(&location.container_name, e))?;

        let mut objects = Vec::with_capacity(entries.len());
        for entry in entries.iter().filter(|e| e.metadata().is_file()) {
            objects.push(describe(&op, entry.path(), Some(entry.metadata())).await?);
        }

        debug!(count = objects.len(), "Listed container");
        Ok(objects)
    }

    #[instrument(skip(self, location), fields(container = %location.container_name))]
    async fn get_object(
        &self,
        location: &ObjectStoreLocation,
        name: &str,
    ) -> Result<PhysicalObject, StorageError> {
        let op = self.operator(location)?;
        describe(&op, name, None).await
    }

    #[instrument(skip(self, location, object), fields(container = %location.container_name, object = %object.name))]
    async fn download(
        &self,
        location: &ObjectStoreLocation,
        object: &PhysicalObject,
    ) -> Result<ByteStream, StorageError> {
        let op = self.operator(location)?;

        debug!("Reading object...");
        let buffer = op
            .read(&object.name)
            .await
            .map_err(|e| map_err(&object.name, e))?;
        Ok(once_stream(buffer.to_bytes()))
    }
}

//! In-memory stand-ins for the collaborators of a
//! [`DataFetcher`](catalog_core::fetcher::DataFetcher).
//!
//! Don't use these in production! They exist for tests and examples.

use catalog_core::credential;
use catalog_core::prelude::*;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone)]
struct StoredObject {
    name: String,
    data: Bytes,
    last_modified: DateTime<Utc>,
    delay: Option<Duration>,
}

type ContainerKey = (String, String);

fn key(location: &ObjectStoreLocation) -> ContainerKey {
    (
        location.account_url.clone(),
        location.container_name.clone(),
    )
}

/// Blob containers held in memory. Objects are listed in insertion order.
#[derive(Clone, Default)]
pub struct MemoryStore {
    containers: Arc<Mutex<HashMap<ContainerKey, Vec<StoredObject>>>>,
    downloads: Arc<Mutex<Vec<String>>>,
    calls: Arc<Mutex<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `data` as `name`, last modified now.
    pub fn put(&self, location: &ObjectStoreLocation, name: &str, data: impl Into<Bytes>) {
        self.put_at(location, name, data, Utc::now());
    }

    pub fn put_at(
        &self,
        location: &ObjectStoreLocation,
        name: &str,
        data: impl Into<Bytes>,
        last_modified: DateTime<Utc>,
    ) {
        let mut containers = lock(&self.containers);
        let objects = containers.entry(key(location)).or_default();
        let object = StoredObject {
            name: name.to_string(),
            data: data.into(),
            last_modified,
            delay: None,
        };
        match objects.iter_mut().find(|o| o.name == name) {
            Some(existing) => *existing = object,
            None => objects.push(object),
        }
    }

    pub fn remove(&self, location: &ObjectStoreLocation, name: &str) {
        if let Some(objects) = lock(&self.containers).get_mut(&key(location)) {
            objects.retain(|o| o.name != name);
        }
    }

    /// Makes downloads of `name` take at least `delay`.
    pub fn delay(&self, location: &ObjectStoreLocation, name: &str, delay: Duration) {
        if let Some(object) = lock(&self.containers)
            .get_mut(&key(location))
            .and_then(|objects| objects.iter_mut().find(|o| o.name == name))
        {
            object.delay = Some(delay);
        }
    }

    /// Names of downloaded objects, in the order the downloads finished.
    pub fn downloads(&self) -> Vec<String> {
        lock(&self.downloads).clone()
    }

    /// Number of store operations served so far.
    pub fn calls(&self) -> usize {
        *lock(&self.calls)
    }

    fn connect(&self, location: &ObjectStoreLocation) -> Result<(), StorageError> {
        *lock(&self.calls) += 1;
        credential::resolve(location)?;
        Ok(())
    }

    fn find(&self, location: &ObjectStoreLocation, name: &str) -> Option<StoredObject> {
        lock(&self.containers)
            .get(&key(location))
            .and_then(|objects| objects.iter().find(|o| o.name == name).cloned())
    }
}

fn physical(object: &StoredObject) -> PhysicalObject {
    PhysicalObject {
        name: object.name.clone(),
        last_modified: object.last_modified,
        size: Some(object.data.len() as u64),
    }
}

impl ObjectStore for MemoryStore {
    async fn list_objects(
        &self,
        location: &ObjectStoreLocation,
    ) -> Result<Vec<PhysicalObject>, StorageError> {
        self.connect(location)?;
        Ok(lock(&self.containers)
            .get(&key(location))
            .map(|objects| objects.iter().map(physical).collect())
            .unwrap_or_default())
    }

    async fn get_object(
        &self,
        location: &ObjectStoreLocation,
        name: &str,
    ) -> Result<PhysicalObject, StorageError> {
        self.connect(location)?;
        self.find(location, name)
            .map(|o| physical(&o))
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    async fn download(
        &self,
        location: &ObjectStoreLocation,
        object: &PhysicalObject,
    ) -> Result<ByteStream, StorageError> {
        self.connect(location)?;
        let stored = self
            .find(location, &object.name)
            .ok_or_else(|| StorageError::NotFound(object.name.clone()))?;

        if let Some(delay) = stored.delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.downloads).push(stored.name.clone());
        Ok(once_stream(stored.data))
    }
}

/// Version records held in memory, per asset.
#[derive(Clone, Default)]
pub struct MemoryVersions {
    versions: Arc<Mutex<HashMap<String, Vec<Version>>>>,
}

impl MemoryVersions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, asset_id: &str, version: Version) {
        lock(&self.versions)
            .entry(asset_id.to_string())
            .or_default()
            .push(version);
    }
}

impl VersionService for MemoryVersions {
    async fn get_version(&self, asset_id: &str, name: &str) -> Result<Version, VersionError> {
        lock(&self.versions)
            .get(asset_id)
            .and_then(|versions| versions.iter().find(|v| v.name == name).cloned())
            .ok_or_else(|| VersionError::NotFound {
                asset_id: asset_id.to_string(),
                version: name.to_string(),
            })
    }

    async fn list_versions(&self, asset_id: &str) -> Result<Vec<Version>, VersionError> {
        Ok(lock(&self.versions)
            .get(asset_id)
            .cloned()
            .unwrap_or_default())
    }

    /// Creates an empty version named `v{n}`.
    async fn create_version(&self, asset_id: &str) -> Result<Version, VersionError> {
        let mut versions = lock(&self.versions);
        let versions = versions.entry(asset_id.to_string()).or_default();
        let n = versions.len() + 1;
        let version = Version {
            id: n.to_string(),
            name: format!("v{n}"),
            created_at: Some(Utc::now()),
            contents: Vec::new(),
        };
        versions.push(version.clone());
        Ok(version)
    }

    async fn delete_version(&self, asset_id: &str, name: &str) -> Result<(), VersionError> {
        let mut versions = lock(&self.versions);
        let list = versions.get_mut(asset_id).ok_or_else(|| VersionError::NotFound {
            asset_id: asset_id.to_string(),
            version: name.to_string(),
        })?;
        let before = list.len();
        list.retain(|v| v.name != name);
        if list.len() == before {
            return Err(VersionError::NotFound {
                asset_id: asset_id.to_string(),
                version: name.to_string(),
            });
        }
        Ok(())
    }
}

/// Canned HTTP resources keyed by URL.
#[derive(Clone, Default)]
pub struct MemoryHttp {
    resources: Arc<Mutex<HashMap<String, Bytes>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MemoryHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, body: impl Into<Bytes>) {
        lock(&self.resources).insert(url.to_string(), body.into());
    }

    pub fn requests(&self) -> Vec<String> {
        lock(&self.requests).clone()
    }
}

impl HttpFetcher for MemoryHttp {
    async fn get(&self, url: &str) -> Result<ByteStream, StorageError> {
        lock(&self.requests).push(url.to_string());
        lock(&self.resources)
            .get(url)
            .cloned()
            .map(once_stream)
            .ok_or_else(|| StorageError::NotFound(url.to_string()))
    }
}

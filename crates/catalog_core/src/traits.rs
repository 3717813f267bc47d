use crate::error::*;
use crate::location::ObjectStoreLocation;
use crate::version::Version;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};

/// Chunks of an object's content.
pub type ByteStream = BoxStream<'static, Result<Bytes, StorageError>>;

/// Wraps an already buffered body as a [`ByteStream`].
pub fn once_stream(data: Bytes) -> ByteStream {
    futures::stream::once(async move { Ok(data) }).boxed()
}

/// Drains a [`ByteStream`] into one contiguous buffer.
pub async fn collect_stream(stream: ByteStream) -> Result<Bytes, StorageError> {
    let chunks: Vec<Bytes> = stream.try_collect().await?;
    Ok(match chunks.len() {
        1 => chunks.into_iter().next().unwrap_or_default(),
        _ => Bytes::from(chunks.concat()),
    })
}

/// One stored blob as it currently exists in a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalObject {
    pub name: String,
    pub last_modified: DateTime<Utc>,
    pub size: Option<u64>,
}

/// Enumerates and reads objects of a container addressed by an [`ObjectStoreLocation`].
///
/// Implementations resolve the credential on every call and keep no cache.
pub trait ObjectStore: Send + Sync + 'static + Clone {
    fn list_objects(
        &self,
        location: &ObjectStoreLocation,
    ) -> impl Future<Output = Result<Vec<PhysicalObject>, StorageError>> + Send;

    /// Fails with [`StorageError::NotFound`] when `name` does not exist.
    fn get_object(
        &self,
        location: &ObjectStoreLocation,
        name: &str,
    ) -> impl Future<Output = Result<PhysicalObject, StorageError>> + Send;

    fn download(
        &self,
        location: &ObjectStoreLocation,
        object: &PhysicalObject,
    ) -> impl Future<Output = Result<ByteStream, StorageError>> + Send;
}

/// The catalog's version metadata service.
pub trait VersionService: Send + Sync + 'static + Clone {
    fn get_version(
        &self,
        asset_id: &str,
        name: &str,
    ) -> impl Future<Output = Result<Version, VersionError>> + Send;

    fn list_versions(
        &self,
        asset_id: &str,
    ) -> impl Future<Output = Result<Vec<Version>, VersionError>> + Send;

    fn create_version(
        &self,
        asset_id: &str,
    ) -> impl Future<Output = Result<Version, VersionError>> + Send;

    fn delete_version(
        &self,
        asset_id: &str,
        name: &str,
    ) -> impl Future<Output = Result<(), VersionError>> + Send;
}

/// Plain GET of a single resource.
pub trait HttpFetcher: Send + Sync + 'static + Clone {
    /// Fails with [`StorageError::NotFound`] on a 404.
    fn get(&self, url: &str) -> impl Future<Output = Result<ByteStream, StorageError>> + Send;
}

//! # Data Catalog FileSystem Store
//!
//! A local filesystem object store for the data catalog.
//!
//! This crate implements the [`ObjectStore`] trait over a directory tree:
//! every container is a directory below the root, and its objects are the
//! regular files directly inside it. The account URL of a location is not
//! used for addressing, but the location's credentials are still resolved
//! on every call so a local mirror behaves like the remote container.
//!
//! ## Usage
//!
//! ```no_run
//! use catalog_fs::FileSystemStore;
//!
//! let store = FileSystemStore::new("./catalog_data");
//! ```

use catalog_core::credential;
use catalog_core::prelude::*;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument};

#[derive(Clone, Debug)]
pub struct FileSystemStore {
    root: PathBuf,
}

impl FileSystemStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { root: path.into() }
    }

    fn container_path(&self, location: &ObjectStoreLocation) -> Result<PathBuf, StorageError> {
        credential::resolve(location)?;
        Ok(self.root.join(checked(&location.container_name)?))
    }

    fn object_path(
        &self,
        location: &ObjectStoreLocation,
        name: &str,
    ) -> Result<PathBuf, StorageError> {
        Ok(self.container_path(location)?.join(checked(name)?))
    }
}

/// Rejects names that would escape the container directory.
fn checked(name: &str) -> Result<&Path, StorageError> {
    let path = Path::new(name);
    let plain = path
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if name.is_empty() || !plain {
        return Err(StorageError::NotFound(name.to_string()));
    }
    Ok(path)
}

fn not_found_or_io(name: &str, e: std::io::Error) -> StorageError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(name.to_string())
    } else {
        StorageError::Io(e)
    }
}

fn describe(name: String, metadata: &std::fs::Metadata) -> Result<PhysicalObject, StorageError> {
    let modified = metadata.modified().map_err(StorageError::Io)?;
    Ok(PhysicalObject {
        name,
        last_modified: DateTime::<Utc>::from(modified),
        size: Some(metadata.len()),
    })
}

impl ObjectStore for FileSystemStore {
    #[instrument(skip(self, location), fields(container = %location.container_name))]
    async fn list_objects(
        &self,
        location: &ObjectStoreLocation,
    ) -> Result<Vec<PhysicalObject>, StorageError> {
        let dir = self.container_path(location)?;
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| not_found_or_io(&location.container_name, e))?;

        let mut objects = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(StorageError::Io)? {
            let metadata = entry.metadata().await.map_err(StorageError::Io)?;
            if !metadata.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            objects.push(describe(name, &metadata)?);
        }

        objects.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(count = objects.len(), "Listed container");
        Ok(objects)
    }

    #[instrument(skip(self, location), fields(container = %location.container_name))]
    async fn get_object(
        &self,
        location: &ObjectStoreLocation,
        name: &str,
    ) -> Result<PhysicalObject, StorageError> {
        let path = self.object_path(location, name)?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| not_found_or_io(name, e))?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound(name.to_string()));
        }
        describe(name.to_string(), &metadata)
    }

    #[instrument(skip(self, location, object), fields(container = %location.container_name, object = %object.name))]
    async fn download(
        &self,
        location: &ObjectStoreLocation,
        object: &PhysicalObject,
    ) -> Result<ByteStream, StorageError> {
        let path = self.object_path(location, &object.name)?;
        let file = fs::File::open(&path)
            .await
            .map_err(|e| not_found_or_io(&object.name, e))?;

        debug!("Streaming file");
        Ok(Box::pin(ReaderStream::new(file).map_err(StorageError::Io)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn location() -> ObjectStoreLocation {
        ObjectStoreLocation::new("file://local", "data").with_account_key("K")
    }

    async fn store_with(files: &[(&str, &str)]) -> (tempfile::TempDir, FileSystemStore) {
        let dir = tempfile::tempdir().unwrap();
        let container = dir.path().join("data");
        fs::create_dir_all(&container).await.unwrap();
        for (name, content) in files {
            fs::write(container.join(name), content).await.unwrap();
        }
        let store = FileSystemStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn lists_files_in_name_order() {
        let (dir, store) = store_with(&[("b.csv", "x\n2\n"), ("a.csv", "x\n1\n")]).await;
        fs::create_dir_all(dir.path().join("data/nested")).await.unwrap();

        let objects = store.list_objects(&location()).await.unwrap();
        let names: Vec<_> = objects.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, ["a.csv", "b.csv"]);
        assert_eq!(objects[0].size, Some(4));
    }

    #[tokio::test]
    async fn last_modified_follows_file_mtime() {
        let (dir, store) = store_with(&[("a.csv", "x\n1\n")]).await;
        let past = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        std::fs::File::options()
            .write(true)
            .open(dir.path().join("data/a.csv"))
            .unwrap()
            .set_modified(past)
            .unwrap();

        let object = store.get_object(&location(), "a.csv").await.unwrap();
        assert_eq!(object.last_modified, DateTime::<Utc>::from(past));
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let (_dir, store) = store_with(&[]).await;
        let err = store.get_object(&location(), "nope.csv").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(name) if name == "nope.csv"));
    }

    #[tokio::test]
    async fn names_cannot_escape_the_container() {
        let (_dir, store) = store_with(&[("a.csv", "x")]).await;
        let err = store
            .get_object(&location(), "../data/a.csv")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn download_streams_file_content() {
        let (_dir, store) = store_with(&[("a.csv", "x\n1\n")]).await;
        let object = store.get_object(&location(), "a.csv").await.unwrap();
        let stream = store.download(&location(), &object).await.unwrap();
        let data = collect_stream(stream).await.unwrap();
        assert_eq!(&data[..], b"x\n1\n");
    }

    #[tokio::test]
    async fn unresolvable_credentials_fail_without_io() {
        let (_dir, store) = store_with(&[("a.csv", "x")]).await;
        let location = ObjectStoreLocation::new("file://local", "data");
        let err = store.list_objects(&location).await.unwrap_err();
        assert!(matches!(err, StorageError::Config(ConfigError::Missing("accountKey"))));
    }
}

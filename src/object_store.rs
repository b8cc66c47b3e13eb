//! object_store adapters implementing the BackingStore trait.

use crate::storage::{BackingStore, ObjectEntry, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::{local::LocalFileSystem, ClientOptions, ObjectStore};
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Per-request deadline for remote calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How many objects the remote adapter downloads at once during a scan.
const DOWNLOAD_CONCURRENCY: usize = 4;

/// Region used when the credential environment does not name one.
const DEFAULT_REGION: &str = "us-east-1";

/// BackingStore implementation backed by the object_store crate.
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    kind: &'static str,
    scan_width: usize,
    /// When the configured path is a single file, restrict listing to it.
    only: Option<object_store::path::Path>,
}

impl ObjectStoreBackend {
    /// Create a backend over a local file or directory tree.
    ///
    /// A directory is walked recursively and every regular file becomes an
    /// object; a single file becomes the store's only object.
    pub fn local(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        let meta = std::fs::metadata(&path)
            .map_err(|e| StorageError::Unavailable(format!("{}: {}", path.display(), e)))?;

        let (root, only) = if meta.is_file() {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| {
                    StorageError::Unavailable(format!("unusable file name: {}", path.display()))
                })?
                .to_string();
            let root = path.parent().map(PathBuf::from).unwrap_or_else(|| ".".into());
            (root, Some(object_store::path::Path::from(name)))
        } else {
            (path, None)
        };

        let store = LocalFileSystem::new_with_prefix(&root)
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(Self {
            store: Arc::new(store),
            kind: "LocalFS",
            scan_width: 1,
            only,
        })
    }

    /// Create a backend over an S3 bucket.
    ///
    /// Credentials come from the SDK default chain (environment, shared
    /// credentials file, instance role). Every request carries a 10-second
    /// deadline; a timeout surfaces as a transient backend error.
    pub fn s3(bucket: &str) -> StorageResult<Self> {
        let client_options = ClientOptions::new().with_timeout(REQUEST_TIMEOUT);
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_client_options(client_options);
        if std::env::var("AWS_REGION").is_err() {
            builder = builder.with_region(DEFAULT_REGION);
        }
        let store = builder
            .build()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(Self {
            store: Arc::new(store),
            kind: "AmazonS3",
            scan_width: DOWNLOAD_CONCURRENCY,
            only: None,
        })
    }

    #[cfg(test)]
    fn with_store(store: Arc<dyn ObjectStore>, kind: &'static str) -> Self {
        Self {
            store,
            kind,
            scan_width: 1,
            only: None,
        }
    }
}

#[async_trait]
impl BackingStore for ObjectStoreBackend {
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn scan_width(&self) -> usize {
        self.scan_width
    }

    async fn list(&self) -> StorageResult<Vec<ObjectEntry>> {
        use futures::TryStreamExt;

        let stream = self.store.list(None);
        let metas: Vec<_> = stream
            .try_collect()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(metas
            .into_iter()
            .filter(|meta| match &self.only {
                Some(only) => &meta.location == only,
                None => true,
            })
            .map(|meta| ObjectEntry {
                address: meta.location.to_string(),
                size: meta.size as u64,
            })
            .collect())
    }

    async fn get(&self, address: &str) -> StorageResult<Bytes> {
        let location = object_store::path::Path::from(address);

        let result = self.store.get(&location).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => StorageError::NotFound(address.to_string()),
            _ => StorageError::Backend(e.to_string()),
        })?;

        result
            .bytes()
            .await
            .map_err(|e| StorageError::Io(e.to_string()))
    }

    async fn get_range(&self, address: &str, range: Range<u64>) -> StorageResult<Bytes> {
        let location = object_store::path::Path::from(address);
        let opts = object_store::GetOptions {
            range: Some(object_store::GetRange::Bounded(
                range.start as usize..range.end as usize,
            )),
            ..Default::default()
        };

        let result = self
            .store
            .get_opts(&location, opts)
            .await
            .map_err(|e| match e {
                object_store::Error::NotFound { .. } => StorageError::NotFound(address.to_string()),
                _ => StorageError::Backend(e.to_string()),
            })?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| StorageError::Io(e.to_string()))?;

        let wanted = range.end - range.start;
        if (bytes.len() as u64) < wanted {
            return Err(StorageError::OutOfRange {
                address: address.to_string(),
                start: range.start,
                end: range.end,
                got: bytes.len() as u64,
            });
        }
        Ok(bytes)
    }
}

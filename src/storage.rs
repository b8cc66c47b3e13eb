//! Backing-store abstraction: listing, whole-object reads, and range reads.

use async_trait::async_trait;
use bytes::Bytes;
use std::ops::Range;
use std::sync::Arc;
use thiserror::Error;

/// Storage-related errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backing store cannot be reached or enumerated. Fatal at startup.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Object not found in storage.
    #[error("object not found: {0}")]
    NotFound(String),

    /// A range read returned fewer bytes than requested.
    #[error("range {start}..{end} of {address} out of range: got {got} bytes")]
    OutOfRange {
        address: String,
        start: u64,
        end: u64,
        got: u64,
    },

    /// I/O error during a storage operation.
    #[error("storage I/O error: {0}")]
    Io(String),

    /// Error from the underlying storage backend.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// One object enumerated from the backing store.
#[derive(Debug, Clone)]
pub struct ObjectEntry {
    /// Address within the store (filesystem path or object key).
    pub address: String,
    /// Object length in bytes.
    pub size: u64,
}

/// Abstraction over the store holding the raw record files.
///
/// The scan pipeline uses `list` and `get`; the read path uses `get_range`
/// to fetch exactly one block's bytes.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Adapter tag recorded on block descriptors.
    fn kind(&self) -> &'static str;

    /// How many objects the scan pipeline downloads concurrently.
    fn scan_width(&self) -> usize {
        1
    }

    /// Enumerate every object under the configured path.
    async fn list(&self) -> StorageResult<Vec<ObjectEntry>>;

    /// Read an entire object.
    async fn get(&self, address: &str) -> StorageResult<Bytes>;

    /// Read exactly `[range.start, range.end)` from an object.
    async fn get_range(&self, address: &str, range: Range<u64>) -> StorageResult<Bytes>;

    /// Probe the store once at startup. Listing failure is fatal.
    async fn validate(&self) -> StorageResult<()> {
        let objects = self
            .list()
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        tracing::info!(kind = self.kind(), objects = objects.len(), "backing store is accessible");
        Ok(())
    }
}

/// Prefix selecting the remote adapter.
const S3_URL_PREFIX: &str = "https://s3.amazonaws.com/";

/// Select a backing store for a storage path.
///
/// Paths of the form `https://s3.amazonaws.com/<bucket>/...` select the
/// remote adapter; every other path is treated as a local file or
/// directory.
pub fn connect(storage_path: &str) -> StorageResult<Arc<dyn BackingStore>> {
    if let Some(rest) = storage_path.strip_prefix(S3_URL_PREFIX) {
        let bucket = rest.split('/').next().unwrap_or_default();
        if bucket.is_empty() {
            return Err(StorageError::Unavailable(format!(
                "no bucket in storage path: {storage_path}"
            )));
        }
        Ok(Arc::new(crate::object_store::ObjectStoreBackend::s3(bucket)?))
    } else {
        Ok(Arc::new(crate::object_store::ObjectStoreBackend::local(
            storage_path,
        )?))
    }
}

//! Error types for the recordlens library.

use thiserror::Error;

/// Top-level error type for recordlens operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Backing-store errors.
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    /// Index errors.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// Retrieval errors.
    #[error("retrieval error: {0}")]
    Retrieve(#[from] RetrieveError),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A background indexing task panicked or was cancelled.
    #[error("indexing task failed: {0}")]
    Task(String),
}

/// Errors raised by the search and block indexes.
#[derive(Error, Debug)]
pub enum IndexError {
    /// A query produced zero hits.
    #[error("no search hits found")]
    Empty,

    /// An expected block descriptor is missing.
    #[error("no block descriptor found for ref key {0}")]
    NotFound(String),

    /// More than one block descriptor shares a ref key. The scan pipeline
    /// guarantees ref keys are unique, so this is an invariant violation.
    #[error("ref key {0} resolves to more than one block descriptor")]
    Ambiguous(String),

    /// Persistence or deserialization failure in the index subsystem.
    #[error("index internal error: {0}")]
    Internal(String),
}

/// Errors on the read path between a search hit and the returned record.
#[derive(Error, Debug)]
pub enum RetrieveError {
    /// A search hit's stored fields carry no ref key.
    #[error("search hit is missing a ref key")]
    MalformedHit,

    /// The block was fetched but no record in it satisfied the query.
    #[error("no matching record in block: {0}")]
    NoMatch(String),

    /// The matched bytes do not parse as JSON.
    #[error("retrieved record but data is malformed")]
    MalformedRecord,
}

/// Result type for recordlens operations.
pub type Result<T> = std::result::Result<T, Error>;

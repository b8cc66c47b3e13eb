//! recordlens - turn newline-delimited JSON on local or cloud storage into
//! a searchable HTTP API.
//!
//! Records are indexed once and never duplicated: a scan pipeline splits
//! every backing-store object into fixed-size blocks of records, writing
//! per-record documents into a full-text index and per-block locators into
//! a block index. At query time a hit resolves to a block descriptor, the
//! block's byte range is fetched from the originating object, and a linear
//! rescan of that block yields the record's original bytes.
//!
//! The backing store is pluggable (local filesystem tree or S3 bucket,
//! selected by the storage path) and the indexes persist on local disk,
//! so restarts reopen rather than rebuild.

pub mod api;
pub mod block_index;
pub mod builder;
pub mod engine;
pub mod error;
pub mod object_store;
pub mod planner;
pub mod schema;
pub mod search_index;
pub mod splitter;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use block_index::BlockIndex;
pub use engine::{Config, Engine};
pub use error::{Error, IndexError, Result, RetrieveError};
pub use schema::{FieldKind, FieldMapping, SAMPLE_SIZE};
pub use search_index::{SearchIndex, SearchQuery};
pub use storage::{BackingStore, StorageError, StorageResult};
pub use types::{BlockDescriptor, FieldValue, Hit, IndexDoc, BLOCK_SIZE};

//! Persistence seams for the catalog gateway.
//!
//! The gateway only talks to the [`DocumentStore`] and [`BlobStore`] traits.
//! Production wiring uses [`SqliteDocumentStore`] and [`LocalBlobStore`]; the
//! in-memory variants back the integration tests.

mod blob;
mod memory;
mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::catalog::{Collection, ContentRecord};

pub use blob::LocalBlobStore;
pub use memory::{MemoryBlobStore, MemoryDocumentStore};
pub use sqlite::SqliteDocumentStore;

// ============================================================================
// Errors
// ============================================================================

/// Errors surfaced by document and blob stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another process holds the database lock
    #[error("database is locked by another process")]
    Locked,

    /// Schema migration failed
    #[error("database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored fields could not be encoded or decoded
    #[error("malformed record fields: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error from the blob store
    #[error("blob I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No record or blob under the given id/key
    #[error("not found: {0}")]
    NotFound(String),

    /// Blob key is empty, absolute, or climbs out of the store root
    #[error("invalid blob key: {0}")]
    InvalidKey(String),

    /// Public base URL cannot carry a path
    #[error("invalid public base URL: {0}")]
    InvalidBaseUrl(String),

    /// Store refused the call (backend down or failure injected)
    #[error("store unavailable")]
    Unavailable,
}

impl StoreError {
    /// Maps lock-related sqlx errors to [`StoreError::Locked`].
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let message = err.to_string().to_lowercase();
        if message.contains("database is locked")
            || message.contains("database table is locked")
            || message.contains("sqlite_busy")
            || message.contains("sqlite_locked")
        {
            return StoreError::Locked;
        }
        StoreError::Database(err)
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Field a collection query is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Date,
    Title,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Structured record persistence, one namespace per collection.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// All records of `collection` in the requested order.
    async fn query(
        &self,
        collection: Collection,
        order_by: SortField,
        direction: Direction,
    ) -> Result<Vec<ContentRecord>, StoreError>;

    /// Persists `record` and returns the id the store assigned. Any `id` on
    /// the input is ignored.
    async fn insert(
        &self,
        collection: Collection,
        record: &ContentRecord,
    ) -> Result<String, StoreError>;

    /// Removes the record with `id`. Returns [`StoreError::NotFound`] when no
    /// such record exists.
    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError>;
}

/// Binary object persistence addressed by slash-separated keys.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError>;

    /// Durable public URL of an existing object.
    async fn public_url(&self, key: &str) -> Result<String, StoreError>;
}

/// Rejects keys that are empty, absolute, or contain `..`.
pub(crate) fn validate_blob_key(key: &str) -> Result<(), StoreError> {
    if key.trim().is_empty()
        || key.contains("..")
        || key.starts_with('/')
        || key.starts_with('\\')
        || key.contains('\0')
    {
        return Err(StoreError::InvalidKey(key.to_owned()));
    }
    Ok(())
}

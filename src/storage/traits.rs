use async_trait::async_trait;

use crate::telemetry::{PersistedRecord, Record, RecordId};

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("Store API returned status {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("Store returned {returned} records for a batch of {expected}")]
    CountMismatch { expected: usize, returned: usize },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Durable sink for validated batches.
///
/// Implementations return one persisted record per input, in input order,
/// each carrying the owner of the record it came from.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn store(&self, batch: &[Record]) -> StorageResult<Vec<PersistedRecord>>;
}

/// Local record store with the full CRUD surface
#[async_trait]
pub trait RecordStore: PersistenceGateway {
    /// List records ordered by id
    async fn list(&self, limit: i64, offset: i64) -> StorageResult<Vec<PersistedRecord>>;

    /// Get a record by id
    async fn get(&self, id: RecordId) -> StorageResult<PersistedRecord>;

    /// Replace the contents of a record, keeping its id
    async fn update(&self, id: RecordId, record: &Record) -> StorageResult<PersistedRecord>;

    /// Delete a record, returning what was removed
    async fn delete(&self, id: RecordId) -> StorageResult<PersistedRecord>;
}

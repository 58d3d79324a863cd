use async_trait::async_trait;

use crate::telemetry::QueueEntry;

/// Result type for buffer operations
pub type BufferResult<T> = Result<T, BufferError>;

/// Errors that can occur talking to the buffer backend
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Shared FIFO of serialized records awaiting batching.
///
/// Entries are appended at the tail and claimed from the head. `claim` and
/// `restore` must each be a single indivisible step with respect to every
/// other caller, so no entry is ever handed to two claimers and none is lost.
#[async_trait]
pub trait SharedBuffer: Send + Sync {
    /// Append an entry, returning the buffer length after the append
    async fn insert(&self, entry: QueueEntry) -> BufferResult<usize>;

    /// Take exactly `n` entries from the head, or nothing if fewer are present
    async fn claim(&self, n: usize) -> BufferResult<Vec<QueueEntry>>;

    /// Put previously claimed entries back at the head, keeping their order
    async fn restore(&self, entries: Vec<QueueEntry>) -> BufferResult<()>;

    /// Current number of buffered entries
    async fn len(&self) -> BufferResult<usize>;

    /// Park entries that could not be persisted
    async fn dead_letter(&self, entries: Vec<QueueEntry>) -> BufferResult<usize>;

    /// Number of parked entries
    async fn dead_letter_len(&self) -> BufferResult<usize>;

    /// Remove up to `max` parked entries, oldest first
    async fn take_dead_letters(&self, max: usize) -> BufferResult<Vec<QueueEntry>>;

    /// Move up to `max` parked entries, oldest first, to the tail of the
    /// buffer as one step. Returns how many moved.
    async fn requeue_dead_letters(&self, max: usize) -> BufferResult<usize>;
}

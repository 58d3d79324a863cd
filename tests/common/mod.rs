#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use roadvision_hub::buffer::{BufferError, BufferResult, MemoryBuffer, SharedBuffer};
use roadvision_hub::flush::{FlushConfig, FlushController};
use roadvision_hub::storage::{
    MemoryRecordStore, PersistenceGateway, StorageError, StorageResult,
};
use roadvision_hub::sync::{BroadcastDispatcher, SubscriptionRegistry};
use roadvision_hub::telemetry::{
    Accelerometer, Gps, OwnerId, PersistedRecord, QueueEntry, Record, RoadState,
};

/// Build a valid record; `seq` doubles as the accelerometer x value and
/// the timestamp offset so records are easy to tell apart.
pub fn record(owner: OwnerId, seq: i32) -> Record {
    let base = Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap();
    Record::new(
        RoadState::Normal,
        owner,
        Accelerometer {
            x: seq,
            y: 0,
            z: 16500,
        },
        Gps {
            latitude: 50.45,
            longitude: 30.52,
        },
        base + ChronoDuration::seconds(seq as i64),
    )
}

pub fn entry(owner: OwnerId, seq: i32) -> QueueEntry {
    record(owner, seq).to_entry().unwrap()
}

/// Gateway that records every batch and can be told to fail
pub struct RecordingGateway {
    store: MemoryRecordStore,
    batches: Mutex<Vec<Vec<Record>>>,
    attempts: AtomicUsize,
    failures_left: AtomicUsize,
}

impl RecordingGateway {
    pub fn new(first_id: i64) -> Self {
        Self::failing(first_id, 0)
    }

    /// Fail the first `failures` calls with a 500 status
    pub fn failing(first_id: i64, failures: usize) -> Self {
        Self {
            store: MemoryRecordStore::starting_at(first_id),
            batches: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(failures),
        }
    }

    pub fn batches(&self) -> Vec<Vec<Record>> {
        self.batches.lock().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistenceGateway for RecordingGateway {
    async fn store(&self, batch: &[Record]) -> StorageResult<Vec<PersistedRecord>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(StorageError::Status {
                status: 500,
                detail: "store unavailable".to_string(),
            });
        }

        self.batches.lock().push(batch.to_vec());
        self.store.store(batch).await
    }
}

fn connection_reset() -> BufferError {
    BufferError::Redis(redis::RedisError::from((
        redis::ErrorKind::IoError,
        "connection reset",
    )))
}

/// Memory buffer whose `restore` and/or `dead_letter` calls fail
pub struct FailingBuffer {
    pub inner: MemoryBuffer,
    fail_restore: bool,
    fail_dead_letter: bool,
}

impl FailingBuffer {
    pub fn new(fail_restore: bool, fail_dead_letter: bool) -> Self {
        Self {
            inner: MemoryBuffer::new(),
            fail_restore,
            fail_dead_letter,
        }
    }
}

#[async_trait]
impl SharedBuffer for FailingBuffer {
    async fn insert(&self, entry: QueueEntry) -> BufferResult<usize> {
        self.inner.insert(entry).await
    }

    async fn claim(&self, n: usize) -> BufferResult<Vec<QueueEntry>> {
        self.inner.claim(n).await
    }

    async fn restore(&self, entries: Vec<QueueEntry>) -> BufferResult<()> {
        if self.fail_restore {
            return Err(connection_reset());
        }
        self.inner.restore(entries).await
    }

    async fn len(&self) -> BufferResult<usize> {
        self.inner.len().await
    }

    async fn dead_letter(&self, entries: Vec<QueueEntry>) -> BufferResult<usize> {
        if self.fail_dead_letter {
            return Err(connection_reset());
        }
        self.inner.dead_letter(entries).await
    }

    async fn dead_letter_len(&self) -> BufferResult<usize> {
        self.inner.dead_letter_len().await
    }

    async fn take_dead_letters(&self, max: usize) -> BufferResult<Vec<QueueEntry>> {
        self.inner.take_dead_letters(max).await
    }

    async fn requeue_dead_letters(&self, max: usize) -> BufferResult<usize> {
        self.inner.requeue_dead_letters(max).await
    }
}

/// Controller over an arbitrary buffer, backed by a recording gateway
pub fn controller_over(
    buffer: Arc<dyn SharedBuffer>,
    batch_size: usize,
    gateway: Arc<RecordingGateway>,
) -> Arc<FlushController> {
    let sink: Arc<dyn PersistenceGateway> = gateway;
    Arc::new(FlushController::new(
        buffer,
        sink,
        BroadcastDispatcher::new(SubscriptionRegistry::new()),
        FlushConfig {
            batch_size,
            max_retries: 2,
            retry_backoff: Duration::from_millis(1),
        },
    ))
}

pub struct Pipeline {
    pub buffer: Arc<MemoryBuffer>,
    pub gateway: Arc<RecordingGateway>,
    pub registry: SubscriptionRegistry,
    pub controller: Arc<FlushController>,
}

pub fn pipeline(batch_size: usize, gateway: RecordingGateway) -> Pipeline {
    let buffer = Arc::new(MemoryBuffer::new());
    let gateway = Arc::new(gateway);
    let registry = SubscriptionRegistry::new();

    let shared: Arc<dyn SharedBuffer> = buffer.clone();
    let sink: Arc<dyn PersistenceGateway> = gateway.clone();
    let controller = Arc::new(FlushController::new(
        shared,
        sink,
        BroadcastDispatcher::new(registry.clone()),
        FlushConfig {
            batch_size,
            max_retries: 2,
            retry_backoff: Duration::from_millis(1),
        },
    ));

    Pipeline {
        buffer,
        gateway,
        registry,
        controller,
    }
}

/// Ids carried by one pushed group message
pub fn ids(payload: &str) -> Vec<i64> {
    let records: Vec<PersistedRecord> = serde_json::from_str(payload).unwrap();
    records.iter().map(|r| r.id).collect()
}

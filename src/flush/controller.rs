use std::sync::Arc;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::buffer::{BufferResult, SharedBuffer};
use crate::flush::types::{FlushConfig, FlushOutcome, FlushStats, FlushStatsSnapshot};
use crate::storage::{PersistenceGateway, StorageResult};
use crate::sync::BroadcastDispatcher;
use crate::telemetry::{PersistedRecord, QueueEntry, Record};

/// Drives full batches from the shared buffer to the store and out to
/// subscribers.
///
/// Holds no lock of its own: atomicity comes from the buffer's `claim` and
/// `restore`, so any number of callers may flush concurrently.
pub struct FlushController {
    buffer: Arc<dyn SharedBuffer>,
    gateway: Arc<dyn PersistenceGateway>,
    dispatcher: BroadcastDispatcher,
    config: FlushConfig,
    stats: FlushStats,
}

impl FlushController {
    pub fn new(
        buffer: Arc<dyn SharedBuffer>,
        gateway: Arc<dyn PersistenceGateway>,
        dispatcher: BroadcastDispatcher,
        config: FlushConfig,
    ) -> Self {
        Self {
            buffer,
            gateway,
            dispatcher,
            config,
            stats: FlushStats::default(),
        }
    }

    pub fn buffer(&self) -> &Arc<dyn SharedBuffer> {
        &self.buffer
    }

    pub fn dispatcher(&self) -> &BroadcastDispatcher {
        &self.dispatcher
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    pub fn stats(&self) -> FlushStatsSnapshot {
        self.stats.snapshot()
    }

    /// Append an entry to the buffer, returning the new length
    pub async fn insert(&self, entry: QueueEntry) -> BufferResult<usize> {
        self.buffer.insert(entry).await
    }

    /// Insert and then flush inline
    pub async fn submit(&self, entry: QueueEntry) -> BufferResult<(usize, FlushOutcome)> {
        let len = self.insert(entry).await?;
        let outcome = self.flush_if_ready(len).await?;
        Ok((len, outcome))
    }

    /// Run `flush_if_ready` on a background task; errors are logged
    pub fn spawn_flush(self: &Arc<Self>, len: usize) {
        if len < self.config.batch_size {
            return;
        }
        let controller = self.clone();
        tokio::spawn(async move {
            if let Err(e) = controller.flush_if_ready(len).await {
                error!("Flush failed: {}", e);
            }
        });
    }

    /// Claim and persist one batch if `len` reached the batch size
    pub async fn flush_if_ready(&self, len: usize) -> BufferResult<FlushOutcome> {
        let batch_size = self.config.batch_size;
        if batch_size == 0 || len < batch_size {
            return Ok(FlushOutcome::NotReady);
        }

        let claimed = self.buffer.claim(batch_size).await?;
        if claimed.is_empty() {
            debug!("Buffer drained by another flush, nothing to claim");
            self.stats.record_race();
            return Ok(FlushOutcome::Raced);
        }

        let (valid, invalid) = validate_claim(&claimed);
        if invalid > 0 {
            warn!(
                "{} of {} claimed entries are malformed, restoring batch",
                invalid,
                claimed.len()
            );
            if let Err(e) = self.buffer.restore(claimed.clone()).await {
                error!("Failed to restore claimed batch: {}; parking it instead", e);
                let count = claimed.len();
                self.park(claimed).await?;
                return Ok(FlushOutcome::DeadLettered { count });
            }
            self.stats.record_restore(invalid);
            return Ok(FlushOutcome::Restored { invalid });
        }

        match self.store_with_retry(&valid).await {
            Ok(records) => {
                self.stats.record_persisted(records.len());
                let report = self.dispatcher.dispatch(&records);
                info!(
                    "Persisted batch of {} records ({} groups, {} deliveries)",
                    records.len(),
                    report.groups,
                    report.deliveries
                );
                Ok(FlushOutcome::Persisted { records, report })
            }
            Err(e) => {
                let count = claimed.len();
                error!(
                    "Giving up on batch of {} after {} attempts: {}",
                    count,
                    self.config.max_retries + 1,
                    e
                );
                self.park(claimed).await?;
                Ok(FlushOutcome::DeadLettered { count })
            }
        }
    }

    /// Move a claim to the dead-letter list. If even that fails the raw
    /// entries are written to the error log, the last place they exist.
    async fn park(&self, entries: Vec<QueueEntry>) -> BufferResult<()> {
        let count = entries.len();
        match self.buffer.dead_letter(entries.clone()).await {
            Ok(_) => {
                self.stats.record_dead_letter(count);
                Ok(())
            }
            Err(e) => {
                error!("Failed to dead-letter {} entries: {}", count, e);
                for entry in &entries {
                    error!("Unparked entry: {}", entry.as_str());
                }
                Err(e)
            }
        }
    }

    async fn store_with_retry(&self, batch: &[Record]) -> StorageResult<Vec<PersistedRecord>> {
        let mut backoff = self.config.retry_backoff;
        let mut attempt = 0;

        loop {
            match self.gateway.store(batch).await {
                Ok(records) => return Ok(records),
                Err(e) => {
                    self.stats.record_gateway_failure();
                    if attempt >= self.config.max_retries {
                        return Err(e);
                    }
                    attempt += 1;
                    warn!(
                        "Store attempt {} failed: {}; retrying in {:?}",
                        attempt, e, backoff
                    );
                    time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
            }
        }
    }
}

/// Parse every claimed entry, logging the ones that fail
fn validate_claim(claimed: &[QueueEntry]) -> (Vec<Record>, usize) {
    let mut valid = Vec::with_capacity(claimed.len());
    let mut invalid = 0;

    for entry in claimed {
        match Record::from_entry(entry) {
            Ok(record) => valid.push(record),
            Err(e) => {
                invalid += 1;
                warn!("Malformed buffer entry: {} ({})", e, entry.as_str());
            }
        }
    }

    (valid, invalid)
}

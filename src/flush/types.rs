use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::sync::DispatchReport;
use crate::telemetry::PersistedRecord;

/// Configuration for the flush controller
#[derive(Debug, Clone)]
pub struct FlushConfig {
    /// Entries per batch; shorter buffers never flush
    pub batch_size: usize,
    /// Extra store attempts after the first failure
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further attempt
    pub retry_backoff: Duration,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_retries: 3,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

/// Result of one flush attempt
#[derive(Debug, Clone, PartialEq)]
pub enum FlushOutcome {
    /// Buffer shorter than a batch
    NotReady,
    /// Another caller drained the buffer first
    Raced,
    /// Claim contained malformed entries and was put back whole
    Restored { invalid: usize },
    /// Batch committed and fanned out
    Persisted {
        records: Vec<PersistedRecord>,
        report: DispatchReport,
    },
    /// Store kept failing; the claim went to the dead-letter list
    DeadLettered { count: usize },
}

impl FlushOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(self, FlushOutcome::Persisted { .. })
    }
}

/// Running counters for the flush path
#[derive(Debug, Default)]
pub struct FlushStats {
    flushes: AtomicU64,
    persisted_records: AtomicU64,
    restores: AtomicU64,
    invalid_entries: AtomicU64,
    raced_claims: AtomicU64,
    gateway_failures: AtomicU64,
    dead_lettered: AtomicU64,
}

/// Point-in-time copy of [`FlushStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushStatsSnapshot {
    pub flushes: u64,
    pub persisted_records: u64,
    pub restores: u64,
    pub invalid_entries: u64,
    pub raced_claims: u64,
    pub gateway_failures: u64,
    pub dead_lettered: u64,
}

impl FlushStats {
    pub(crate) fn record_persisted(&self, count: usize) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.persisted_records
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_restore(&self, invalid: usize) {
        self.restores.fetch_add(1, Ordering::Relaxed);
        self.invalid_entries
            .fetch_add(invalid as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_race(&self) {
        self.raced_claims.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_gateway_failure(&self) {
        self.gateway_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dead_letter(&self, count: usize) {
        self.dead_lettered.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FlushStatsSnapshot {
        FlushStatsSnapshot {
            flushes: self.flushes.load(Ordering::Relaxed),
            persisted_records: self.persisted_records.load(Ordering::Relaxed),
            restores: self.restores.load(Ordering::Relaxed),
            invalid_entries: self.invalid_entries.load(Ordering::Relaxed),
            raced_claims: self.raced_claims.load(Ordering::Relaxed),
            gateway_failures: self.gateway_failures.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
        }
    }
}

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

use crate::storage::traits::{PersistenceGateway, RecordStore, StorageError, StorageResult};
use crate::telemetry::{PersistedRecord, Record, RecordId};

struct Table {
    rows: BTreeMap<RecordId, PersistedRecord>,
    next_id: RecordId,
}

/// In-process record store with sequential ids
pub struct MemoryRecordStore {
    table: RwLock<Table>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Create a store whose first assigned id is `first_id`
    pub fn starting_at(first_id: RecordId) -> Self {
        Self {
            table: RwLock::new(Table {
                rows: BTreeMap::new(),
                next_id: first_id,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.table.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryRecordStore {
    async fn store(&self, batch: &[Record]) -> StorageResult<Vec<PersistedRecord>> {
        let mut table = self.table.write();
        let mut persisted = Vec::with_capacity(batch.len());

        for record in batch {
            let id = table.next_id;
            table.next_id += 1;
            let row = PersistedRecord::from_record(id, record);
            table.rows.insert(id, row.clone());
            persisted.push(row);
        }

        Ok(persisted)
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn list(&self, limit: i64, offset: i64) -> StorageResult<Vec<PersistedRecord>> {
        let table = self.table.read();
        Ok(table
            .rows
            .values()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn get(&self, id: RecordId) -> StorageResult<PersistedRecord> {
        self.table
            .read()
            .rows
            .get(&id)
            .cloned()
            .ok_or(StorageError::RecordNotFound(id))
    }

    async fn update(&self, id: RecordId, record: &Record) -> StorageResult<PersistedRecord> {
        let mut table = self.table.write();
        let row = table
            .rows
            .get_mut(&id)
            .ok_or(StorageError::RecordNotFound(id))?;
        *row = PersistedRecord::from_record(id, record);
        Ok(row.clone())
    }

    async fn delete(&self, id: RecordId) -> StorageResult<PersistedRecord> {
        self.table
            .write()
            .rows
            .remove(&id)
            .ok_or(StorageError::RecordNotFound(id))
    }
}

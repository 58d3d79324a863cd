use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::buffer::traits::{BufferResult, SharedBuffer};
use crate::telemetry::QueueEntry;

#[derive(Default)]
struct Lists {
    pending: VecDeque<QueueEntry>,
    dead_letters: VecDeque<QueueEntry>,
}

/// In-process buffer backed by a mutex-guarded deque.
///
/// Every operation takes the lock once, so `claim` and `restore` are
/// indivisible with respect to concurrent inserts.
#[derive(Default)]
pub struct MemoryBuffer {
    lists: Mutex<Lists>,
}

impl MemoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the pending entries, head first
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.lists.lock().pending.iter().cloned().collect()
    }
}

#[async_trait]
impl SharedBuffer for MemoryBuffer {
    async fn insert(&self, entry: QueueEntry) -> BufferResult<usize> {
        let mut lists = self.lists.lock();
        lists.pending.push_back(entry);
        Ok(lists.pending.len())
    }

    async fn claim(&self, n: usize) -> BufferResult<Vec<QueueEntry>> {
        let mut lists = self.lists.lock();
        if n == 0 || lists.pending.len() < n {
            return Ok(Vec::new());
        }
        Ok(lists.pending.drain(..n).collect())
    }

    async fn restore(&self, entries: Vec<QueueEntry>) -> BufferResult<()> {
        let mut lists = self.lists.lock();
        for entry in entries.into_iter().rev() {
            lists.pending.push_front(entry);
        }
        Ok(())
    }

    async fn len(&self) -> BufferResult<usize> {
        Ok(self.lists.lock().pending.len())
    }

    async fn dead_letter(&self, entries: Vec<QueueEntry>) -> BufferResult<usize> {
        let mut lists = self.lists.lock();
        lists.dead_letters.extend(entries);
        Ok(lists.dead_letters.len())
    }

    async fn dead_letter_len(&self) -> BufferResult<usize> {
        Ok(self.lists.lock().dead_letters.len())
    }

    async fn take_dead_letters(&self, max: usize) -> BufferResult<Vec<QueueEntry>> {
        let mut lists = self.lists.lock();
        let count = max.min(lists.dead_letters.len());
        Ok(lists.dead_letters.drain(..count).collect())
    }

    async fn requeue_dead_letters(&self, max: usize) -> BufferResult<usize> {
        let mut lists = self.lists.lock();
        let count = max.min(lists.dead_letters.len());
        let moved: Vec<QueueEntry> = lists.dead_letters.drain(..count).collect();
        lists.pending.extend(moved);
        Ok(count)
    }
}

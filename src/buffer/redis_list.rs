use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::info;

use crate::buffer::traits::{BufferResult, SharedBuffer};
use crate::telemetry::QueueEntry;

/// Take `ARGV[1]` entries from the head of `KEYS[1]`, or none if the list is
/// shorter. Runs as a single script so no other client observes a partial take.
const CLAIM_SCRIPT: &str = r#"
local n = tonumber(ARGV[1])
if n <= 0 or redis.call('LLEN', KEYS[1]) < n then
    return {}
end
local items = redis.call('LRANGE', KEYS[1], 0, n - 1)
redis.call('LTRIM', KEYS[1], n, -1)
return items
"#;

/// Take up to `ARGV[1]` entries from the head of `KEYS[1]`
const TAKE_UP_TO_SCRIPT: &str = r#"
local n = tonumber(ARGV[1])
if n <= 0 then
    return {}
end
local items = redis.call('LRANGE', KEYS[1], 0, n - 1)
redis.call('LTRIM', KEYS[1], #items, -1)
return items
"#;

/// Pop up to `ARGV[1]` entries off the head of `KEYS[1]` and append them to
/// `KEYS[2]`, returning how many moved
const REQUEUE_SCRIPT: &str = r#"
local n = tonumber(ARGV[1])
local moved = 0
while moved < n do
    local item = redis.call('LPOP', KEYS[1])
    if not item then
        break
    end
    redis.call('RPUSH', KEYS[2], item)
    moved = moved + 1
end
return moved
"#;

/// Shared buffer stored as a Redis list.
///
/// Inserts go to the tail (`RPUSH`), claims come off the head. Restores are a
/// single multi-value `LPUSH`, which Redis applies atomically.
#[derive(Clone)]
pub struct RedisBuffer {
    conn: ConnectionManager,
    queue_key: String,
    dead_letter_key: String,
    claim_script: Script,
    take_script: Script,
    requeue_script: Script,
}

impl RedisBuffer {
    /// Connect to Redis; fails if the server is unreachable
    pub async fn connect(url: &str, queue_key: &str) -> BufferResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Connected to Redis buffer at {} (key: {})", url, queue_key);

        Ok(Self {
            conn,
            queue_key: queue_key.to_string(),
            dead_letter_key: format!("{}:dead_letter", queue_key),
            claim_script: Script::new(CLAIM_SCRIPT),
            take_script: Script::new(TAKE_UP_TO_SCRIPT),
            requeue_script: Script::new(REQUEUE_SCRIPT),
        })
    }

    pub fn queue_key(&self) -> &str {
        &self.queue_key
    }

    pub fn dead_letter_key(&self) -> &str {
        &self.dead_letter_key
    }
}

fn into_raw(entries: Vec<QueueEntry>) -> Vec<String> {
    entries.into_iter().map(QueueEntry::into_inner).collect()
}

fn from_raw(raw: Vec<String>) -> Vec<QueueEntry> {
    raw.into_iter().map(QueueEntry::from).collect()
}

#[async_trait]
impl SharedBuffer for RedisBuffer {
    async fn insert(&self, entry: QueueEntry) -> BufferResult<usize> {
        let mut conn = self.conn.clone();
        let len: usize = conn.rpush(&self.queue_key, entry.into_inner()).await?;
        Ok(len)
    }

    async fn claim(&self, n: usize) -> BufferResult<Vec<QueueEntry>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = self
            .claim_script
            .key(&self.queue_key)
            .arg(n)
            .invoke_async(&mut conn)
            .await?;
        Ok(from_raw(raw))
    }

    async fn restore(&self, entries: Vec<QueueEntry>) -> BufferResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        // LPUSH prepends each value in turn, so push the last entry first
        let mut raw = into_raw(entries);
        raw.reverse();

        let mut conn = self.conn.clone();
        let _: usize = conn.lpush(&self.queue_key, raw).await?;
        Ok(())
    }

    async fn len(&self) -> BufferResult<usize> {
        let mut conn = self.conn.clone();
        let len: usize = conn.llen(&self.queue_key).await?;
        Ok(len)
    }

    async fn dead_letter(&self, entries: Vec<QueueEntry>) -> BufferResult<usize> {
        let mut conn = self.conn.clone();
        if entries.is_empty() {
            let len: usize = conn.llen(&self.dead_letter_key).await?;
            return Ok(len);
        }
        let len: usize = conn.rpush(&self.dead_letter_key, into_raw(entries)).await?;
        Ok(len)
    }

    async fn dead_letter_len(&self) -> BufferResult<usize> {
        let mut conn = self.conn.clone();
        let len: usize = conn.llen(&self.dead_letter_key).await?;
        Ok(len)
    }

    async fn take_dead_letters(&self, max: usize) -> BufferResult<Vec<QueueEntry>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = self
            .take_script
            .key(&self.dead_letter_key)
            .arg(max)
            .invoke_async(&mut conn)
            .await?;
        Ok(from_raw(raw))
    }

    async fn requeue_dead_letters(&self, max: usize) -> BufferResult<usize> {
        let mut conn = self.conn.clone();
        let moved: usize = self
            .requeue_script
            .key(&self.dead_letter_key)
            .key(&self.queue_key)
            .arg(max)
            .invoke_async(&mut conn)
            .await?;
        Ok(moved)
    }
}

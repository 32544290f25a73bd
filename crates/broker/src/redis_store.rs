use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::info;

use crate::cache::{ResultCache, decode_result, encode_result};
use crate::error::{CacheError, CacheResult, QueueError, QueueResult};
use crate::job::{ExecutionResult, Job};
use crate::queue::{SubmissionQueue, decode_job, encode_job};

/// Server-side BRPOP timeout; `dequeue` re-issues the pop until an entry arrives.
const POP_WAIT_SECS: f64 = 1.0;

async fn connect(url: &str) -> redis::RedisResult<ConnectionManager> {
    let client = redis::Client::open(url)?;
    let mut conn = client.get_connection_manager().await?;
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;
    Ok(conn)
}

/// Submission queue backed by a Redis list: LPUSH to enqueue, BRPOP to dequeue.
#[derive(Clone)]
pub struct RedisQueue {
    name: String,
    push: ConnectionManager,
    /// Dedicated connection for BRPOP. Redis serves one connection's commands
    /// in order, so a pending pop would otherwise stall every push behind it.
    pop: ConnectionManager,
}

impl RedisQueue {
    /// Connect and PING. Fails if the broker is unreachable.
    pub async fn connect(url: &str, name: impl Into<String>) -> QueueResult<Self> {
        let push = connect(url)
            .await
            .map_err(|e| QueueError::Unavailable(format!("connect: {e}")))?;
        let pop = connect(url)
            .await
            .map_err(|e| QueueError::Unavailable(format!("connect: {e}")))?;
        let name = name.into();
        info!(queue = %name, "submission queue connected");
        Ok(Self { name, push, pop })
    }
}

#[async_trait]
impl SubmissionQueue for RedisQueue {
    async fn enqueue(&self, job: &Job) -> QueueResult<()> {
        let raw = encode_job(job)?;
        let mut conn = self.push.clone();
        let _: i64 = conn
            .lpush(&self.name, raw)
            .await
            .map_err(|e| QueueError::Unavailable(format!("lpush: {e}")))?;
        Ok(())
    }

    /// Dropping this future while a BRPOP is in flight can discard an entry
    /// the server has already popped (the at-least-once gap).
    async fn dequeue(&self) -> QueueResult<Job> {
        let mut conn = self.pop.clone();
        loop {
            let popped: Option<(String, String)> = conn
                .brpop(&self.name, POP_WAIT_SECS)
                .await
                .map_err(|e| QueueError::Unavailable(format!("brpop: {e}")))?;
            if let Some((_, raw)) = popped {
                return decode_job(raw);
            }
        }
    }
}

/// Result cache backed by Redis string keys with `SET .. EX`.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connect and PING. Fails if the cache is unreachable.
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let conn = connect(url)
            .await
            .map_err(|e| CacheError::Unavailable(format!("connect: {e}")))?;
        info!("result cache connected");
        Ok(Self { conn })
    }
}

#[async_trait]
impl ResultCache for RedisCache {
    async fn put(&self, key: &str, result: &ExecutionResult, ttl: Duration) -> CacheResult<()> {
        let raw = encode_result(result)?;
        // Redis rejects EX 0; sub-second TTLs round up to one second.
        let secs = ttl.as_secs().max(1);
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(key, raw, secs)
            .await
            .map_err(|e| CacheError::Unavailable(format!("set: {e}")))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<ExecutionResult>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| CacheError::Unavailable(format!("get: {e}")))?;
        raw.map(|raw| decode_result(key, &raw)).transpose()
    }
}

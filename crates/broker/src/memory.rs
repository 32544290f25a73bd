use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::cache::{ResultCache, decode_result, encode_result};
use crate::error::{CacheResult, QueueResult};
use crate::job::{ExecutionResult, Job};
use crate::queue::{SubmissionQueue, decode_job, encode_job};

/// In-process queue holding the same JSON records the Redis adapter pushes.
/// Used for single-process deployments and tests.
#[derive(Default)]
pub struct MemoryQueue {
    entries: Mutex<VecDeque<String>>,
    notify: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an already-encoded entry, bypassing serialization.
    pub async fn push_raw(&self, raw: impl Into<String>) {
        self.entries.lock().await.push_back(raw.into());
        self.notify.notify_one();
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl SubmissionQueue for MemoryQueue {
    async fn enqueue(&self, job: &Job) -> QueueResult<()> {
        let raw = encode_job(job)?;
        self.push_raw(raw).await;
        Ok(())
    }

    async fn dequeue(&self) -> QueueResult<Job> {
        loop {
            if let Some(raw) = self.entries.lock().await.pop_front() {
                return decode_job(raw);
            }
            // A push between the check and here leaves a stored permit.
            self.notify.notified().await;
        }
    }
}

struct Entry {
    raw: String,
    expires_at: Instant,
}

/// In-process cache with lazy expiry, keyed and encoded like the Redis adapter.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unexpired entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn put(&self, key: &str, result: &ExecutionResult, ttl: Duration) -> CacheResult<()> {
        let raw = encode_result(result)?;
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, e| e.expires_at > now);
        entries.insert(
            key.to_string(),
            Entry {
                raw,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<ExecutionResult>> {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get(key) else {
            return Ok(None);
        };
        if entry.expires_at <= Instant::now() {
            entries.remove(key);
            return Ok(None);
        }
        decode_result(key, &entry.raw).map(Some)
    }
}

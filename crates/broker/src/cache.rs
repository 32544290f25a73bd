use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CacheError, CacheResult};
use crate::job::ExecutionResult;

/// Short-lived hand-off of results from a worker to a polling client.
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Store `result` under `key`, replacing any previous value.
    async fn put(&self, key: &str, result: &ExecutionResult, ttl: Duration) -> CacheResult<()>;

    /// `Ok(None)` when the key is absent or expired.
    async fn get(&self, key: &str) -> CacheResult<Option<ExecutionResult>>;
}

pub(crate) fn encode_result(result: &ExecutionResult) -> CacheResult<String> {
    serde_json::to_string(result).map_err(CacheError::Encode)
}

pub(crate) fn decode_result(key: &str, raw: &str) -> CacheResult<ExecutionResult> {
    serde_json::from_str(raw).map_err(|source| CacheError::Decode {
        key: key.to_string(),
        source,
    })
}

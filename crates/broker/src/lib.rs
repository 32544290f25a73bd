//! Transient stores between ingress and the worker fleet: a submission queue
//! carrying [`Job`]s in and a short-TTL cache carrying [`ExecutionResult`]s out.

mod cache;
mod error;
mod job;
mod memory;
mod queue;
mod redis_store;

pub use cache::ResultCache;
pub use error::{CacheError, CacheResult, QueueError, QueueResult};
pub use job::{ExecutionResult, Failure, FailureKind, Job, UNKNOWN_EXIT_CODE};
pub use memory::{MemoryCache, MemoryQueue};
pub use queue::{DEFAULT_QUEUE_NAME, SubmissionQueue};
pub use redis_store::{RedisCache, RedisQueue};

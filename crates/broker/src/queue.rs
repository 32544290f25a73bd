use async_trait::async_trait;

use crate::error::{QueueError, QueueResult};
use crate::job::Job;

/// Name of the list jobs are pushed to unless configured otherwise.
pub const DEFAULT_QUEUE_NAME: &str = "code-submissions";

/// Durable hand-off of jobs from ingress to the worker fleet.
///
/// Delivery is at-least-once: an entry removed by `dequeue` is gone from the
/// broker, so a consumer that crashes before handling it loses the job.
#[async_trait]
pub trait SubmissionQueue: Send + Sync {
    async fn enqueue(&self, job: &Job) -> QueueResult<()>;

    /// Wait until an entry is available and remove it.
    ///
    /// Cancel by dropping the future. A malformed entry yields
    /// [`QueueError::Decode`](crate::QueueError::Decode) without blocking later calls.
    async fn dequeue(&self) -> QueueResult<Job>;
}

pub(crate) fn encode_job(job: &Job) -> QueueResult<String> {
    serde_json::to_string(job).map_err(QueueError::Encode)
}

pub(crate) fn decode_job(raw: String) -> QueueResult<Job> {
    match serde_json::from_str(&raw) {
        Ok(job) => Ok(job),
        Err(source) => Err(QueueError::Decode { raw, source }),
    }
}

use std::sync::Arc;
use std::time::Duration;

use broker::{QueueError, SubmissionQueue};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::pool::{PoolClosed, WorkerPool};

/// Delay before retrying after the broker fails.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Moves jobs from the submission queue into the pool's dispatch channel.
pub struct IngestBridge {
    queue: Arc<dyn SubmissionQueue>,
    pool: Arc<WorkerPool>,
    retry_delay: Duration,
}

impl IngestBridge {
    pub fn new(queue: Arc<dyn SubmissionQueue>, pool: Arc<WorkerPool>) -> Self {
        Self {
            queue,
            pool,
            retry_delay: RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Run until `token` is cancelled or the pool closes.
    ///
    /// Cancellation interrupts a pending dequeue but not a pending submit; a
    /// job already taken from the queue is either dispatched or, if the pool
    /// closes first, pushed back onto the queue.
    pub async fn run(self, token: CancellationToken) {
        info!("ingest bridge started");
        loop {
            let dequeued = tokio::select! {
                _ = token.cancelled() => break,
                dequeued = self.queue.dequeue() => dequeued,
            };

            let job = match dequeued {
                Ok(job) => job,
                Err(QueueError::Decode { raw, source }) => {
                    warn!(error = %source, bytes = raw.len(), "dropping malformed submission");
                    continue;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        retry_ms = self.retry_delay.as_millis(),
                        "dequeue failed, retrying"
                    );
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(self.retry_delay) => continue,
                    }
                }
            };

            debug!(job_id = %job.id, depth = self.pool.depth(), "dispatching job");
            if let Err(PoolClosed(job)) = self.pool.submit(job).await {
                warn!(job_id = %job.id, "worker pool closed, returning job to queue");
                if let Err(e) = self.queue.enqueue(&job).await {
                    error!(job_id = %job.id, error = %e, "failed to re-enqueue job, job lost");
                }
                break;
            }
        }
        info!("ingest bridge stopped");
    }
}

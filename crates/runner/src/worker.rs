use std::sync::Arc;
use std::time::Duration;

use async_channel::Receiver;
use broker::{ExecutionResult, FailureKind, Job, ResultCache};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SandboxSettings;
use crate::executor::SandboxRunner;
use crate::language::Language;

/// Everything a worker needs besides its job feed. Shared by the whole pool.
pub struct WorkerContext {
    runner: SandboxRunner,
    cache: Arc<dyn ResultCache>,
    settings: SandboxSettings,
    result_ttl: Duration,
}

impl WorkerContext {
    pub fn new(
        runner: SandboxRunner,
        cache: Arc<dyn ResultCache>,
        settings: SandboxSettings,
        result_ttl: Duration,
    ) -> Self {
        Self {
            runner,
            cache,
            settings,
            result_ttl,
        }
    }
}

/// Pull jobs from `jobs` until the channel closes or `token` is cancelled.
///
/// Cancellation is only observed between jobs; a job in progress runs to
/// completion or to its time budget.
pub(crate) async fn run_worker(
    worker_id: usize,
    jobs: Receiver<Job>,
    ctx: Arc<WorkerContext>,
    token: CancellationToken,
) {
    debug!(worker_id, "worker started");
    loop {
        let job = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            received = jobs.recv() => match received {
                Ok(job) => job,
                Err(_) => break,
            },
        };

        let job_id = job.id.clone();
        let task_ctx = Arc::clone(&ctx);
        // Own task so a panic inside one job cannot take the worker down.
        let handled = tokio::spawn(async move { handle_job(&task_ctx, worker_id, job).await });
        if let Err(e) = handled.await {
            error!(worker_id, job_id = %job_id, error = %e, "job task panicked");
            let result =
                ExecutionResult::failed(FailureKind::SandboxRuntime, format!("job aborted: {e}"));
            if let Err(e) = ctx.cache.put(&job_id, &result, ctx.result_ttl).await {
                error!(job_id = %job_id, error = %e, "failed to cache result, result lost");
            }
        }
    }
    debug!(worker_id, "worker exited");
}

/// Execute one job and cache its result.
pub(crate) async fn handle_job(ctx: &WorkerContext, worker_id: usize, job: Job) {
    let queued_ms = Utc::now()
        .signed_duration_since(job.submitted_at)
        .num_milliseconds();
    debug!(worker_id, job_id = %job.id, language = %job.language, queued_ms, "job claimed");

    let result = execute(ctx, &job).await;

    info!(
        worker_id,
        job_id = %job.id,
        language = %job.language,
        exit_code = result.exit_code,
        failure = ?result.failure_kind(),
        "job finished"
    );

    if let Err(e) = ctx.cache.put(&job.id, &result, ctx.result_ttl).await {
        error!(job_id = %job.id, error = %e, "failed to cache result, result lost");
    }
}

async fn execute(ctx: &WorkerContext, job: &Job) -> ExecutionResult {
    let language = match job.language.parse::<Language>() {
        Ok(language) => language,
        Err(e) => {
            warn!(job_id = %job.id, language = %job.language, "unsupported language");
            return ExecutionResult::failed(FailureKind::UnsupportedLanguage, e.to_string());
        }
    };

    let spec = language.execution_spec(&job.code, &ctx.settings);
    match ctx.runner.run(&spec).await {
        Ok(result) => result,
        Err(e) => {
            warn!(job_id = %job.id, error = %e, "sandbox could not be started");
            ExecutionResult::failed(FailureKind::SandboxCreation, e.to_string())
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use broker::{ExecutionResult, Failure, FailureKind, UNKNOWN_EXIT_CODE};
use sandbox::{Sandbox, SandboxError, SandboxFactory, SandboxState};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::language::ExecutionSpec;

/// Drives one sandbox per run from creation to removal.
#[derive(Clone)]
pub struct SandboxRunner {
    factory: Arc<dyn SandboxFactory>,
}

impl SandboxRunner {
    pub fn new(factory: Arc<dyn SandboxFactory>) -> Self {
        Self { factory }
    }

    /// Run `spec` in a fresh sandbox and report the outcome.
    ///
    /// Returns `Err` only when the sandbox could not be created or started.
    /// Timeouts, runtime faults and log failures are recorded in the result.
    /// Once created, the sandbox is destroyed exactly once on every path,
    /// including a panic or cancellation of the caller.
    pub async fn run(&self, spec: &ExecutionSpec) -> Result<ExecutionResult, SandboxError> {
        let sandbox_id = Uuid::new_v4();
        let sandbox = self.factory.create(spec.sandbox_config(sandbox_id)).await?;
        debug!(
            sandbox_id = %sandbox_id,
            backend = self.factory.name(),
            language = %spec.language,
            image = %spec.image,
            state = %SandboxState::Created,
            "sandbox transition"
        );

        let mut lease = SandboxLease::new(Arc::clone(&self.factory), sandbox);
        let outcome = match lease.sandbox.as_deref_mut() {
            Some(sandbox) => drive(sandbox, &sandbox_id, spec.time_budget).await,
            None => Err(SandboxError::StartFailed("sandbox already released".into())),
        };

        lease.release().await;
        debug!(sandbox_id = %sandbox_id, state = %SandboxState::Removed, "sandbox transition");
        outcome
    }
}

/// Owns a created sandbox until it is handed back to the factory.
///
/// An unreleased lease that is dropped, because the run panicked or its task
/// was aborted, destroys the sandbox from a background task.
struct SandboxLease {
    factory: Arc<dyn SandboxFactory>,
    sandbox: Option<Box<dyn Sandbox>>,
}

impl SandboxLease {
    fn new(factory: Arc<dyn SandboxFactory>, sandbox: Box<dyn Sandbox>) -> Self {
        Self {
            factory,
            sandbox: Some(sandbox),
        }
    }

    async fn release(mut self) {
        if let Some(sandbox) = self.sandbox.take() {
            self.factory.destroy(sandbox).await;
        }
    }
}

impl Drop for SandboxLease {
    fn drop(&mut self) {
        let Some(sandbox) = self.sandbox.take() else {
            return;
        };
        warn!(sandbox_id = sandbox.id(), "run abandoned, destroying sandbox in background");
        let factory = Arc::clone(&self.factory);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { factory.destroy(sandbox).await });
            }
            Err(_) => warn!("no runtime to destroy abandoned sandbox, it is leaked"),
        }
    }
}

/// Start the sandbox, then supervise it to completion.
async fn drive(
    sandbox: &mut dyn Sandbox,
    sandbox_id: &Uuid,
    budget: Duration,
) -> Result<ExecutionResult, SandboxError> {
    sandbox.start().await?;
    debug!(sandbox_id = %sandbox_id, state = %SandboxState::Started, "sandbox transition");
    Ok(supervise(sandbox, sandbox_id, budget).await)
}

/// Wait for exit within `budget`, then collect output.
async fn supervise(
    sandbox: &mut dyn Sandbox,
    sandbox_id: &Uuid,
    budget: Duration,
) -> ExecutionResult {
    debug!(sandbox_id = %sandbox_id, state = %SandboxState::Running, "sandbox transition");

    let waited = tokio::time::timeout(budget, sandbox.wait()).await;
    let (state, exit_code, mut failure) = match waited {
        Ok(Ok(code)) => (SandboxState::Exited, code, None),
        Ok(Err(e)) => {
            warn!(sandbox_id = %sandbox_id, error = %e, "sandbox runtime fault");
            (
                SandboxState::Faulted,
                UNKNOWN_EXIT_CODE,
                Some(Failure::new(FailureKind::SandboxRuntime, e.to_string())),
            )
        }
        Err(_) => {
            if let Err(e) = sandbox.kill().await {
                warn!(sandbox_id = %sandbox_id, error = %e, "kill after timeout failed");
            }
            (
                SandboxState::TimedOut,
                UNKNOWN_EXIT_CODE,
                Some(Failure::new(
                    FailureKind::Timeout,
                    format!("exceeded time budget of {}ms", budget.as_millis()),
                )),
            )
        }
    };
    debug!(sandbox_id = %sandbox_id, state = %state, exit_code, "sandbox transition");

    let output = match sandbox.logs().await {
        Ok(output) => {
            debug!(
                sandbox_id = %sandbox_id,
                state = %SandboxState::LogsCollected,
                bytes = output.len(),
                "sandbox transition"
            );
            output
        }
        Err(e) => {
            warn!(sandbox_id = %sandbox_id, error = %e, "log collection failed");
            failure.get_or_insert_with(|| Failure::new(FailureKind::LogCollection, e.to_string()));
            String::new()
        }
    };

    ExecutionResult {
        exit_code,
        output,
        failure,
    }
}

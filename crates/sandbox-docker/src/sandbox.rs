use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::query_parameters::{
    KillContainerOptions, LogsOptions, StartContainerOptions, WaitContainerOptions,
};
use futures_util::StreamExt;
use sandbox::{Sandbox, SandboxError};
use tracing::{debug, info};

const TRUNCATED_MARKER: &str = "\n[output truncated]\n";

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContainerState {
    Created = 0,
    Running = 1,
    Stopped = 2,
}

impl ContainerState {
    fn from_u8(v: u8) -> Self {
        debug_assert!(v <= 2, "invalid ContainerState: {v}");
        match v {
            0 => Self::Created,
            1 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::Running => f.write_str("running"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

pub struct DockerSandbox {
    docker: Docker,
    /// Sandbox id (the `SandboxConfig::id` as a string).
    pub(crate) id: String,
    /// Docker-assigned container id.
    pub(crate) container_id: String,
    max_output_bytes: usize,
    state: AtomicU8,
}

impl DockerSandbox {
    pub(crate) fn new(
        docker: Docker,
        id: String,
        container_id: String,
        max_output_bytes: usize,
    ) -> Self {
        Self {
            docker,
            id,
            container_id,
            max_output_bytes,
            state: AtomicU8::new(ContainerState::Created as u8),
        }
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    fn current_state(&self) -> ContainerState {
        ContainerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Atomically transition between states using CAS. Returns `true` if the
    /// transition succeeded, `false` if the current state did not match `from`.
    fn transition(&self, from: ContainerState, to: ContainerState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// `true` for daemon responses meaning "already in the requested state".
pub(crate) fn is_benign_conflict(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError {
            status_code: 304 | 404 | 409,
            ..
        }
    )
}

/// Append `chunk` to `out`, keeping `out` within `limit` bytes.
/// Returns `false` once the limit has been reached.
fn append_capped(out: &mut String, chunk: &[u8], limit: usize) -> bool {
    let remaining = limit.saturating_sub(out.len());
    if remaining == 0 {
        return false;
    }
    let text = String::from_utf8_lossy(chunk);
    if text.len() <= remaining {
        out.push_str(&text);
        return true;
    }
    let mut cut = remaining;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    out.push_str(text.get(..cut).unwrap_or_default());
    false
}

#[async_trait]
impl Sandbox for DockerSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(&mut self) -> sandbox::Result<()> {
        if self.current_state() != ContainerState::Created {
            return Err(SandboxError::StartFailed(format!(
                "sandbox not startable (state: {})",
                self.current_state()
            )));
        }

        self.docker
            .start_container(&self.container_id, None::<StartContainerOptions>)
            .await
            .map_err(|e| SandboxError::StartFailed(format!("start container: {e}")))?;

        // The container may already have exited and been observed by `wait`;
        // only move forward from Created.
        self.transition(ContainerState::Created, ContainerState::Running);
        info!(id = %self.id, container_id = %self.container_id, "sandbox started");
        Ok(())
    }

    async fn wait(&self) -> sandbox::Result<i64> {
        let options = WaitContainerOptions {
            condition: "not-running".to_string(),
        };
        let mut stream = self
            .docker
            .wait_container(&self.container_id, Some(options));

        let code = match stream.next().await {
            Some(Ok(response)) => response.status_code,
            // bollard reports a non-zero exit status as an error.
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => code,
            Some(Err(e)) => return Err(SandboxError::WaitFailed(e.to_string())),
            None => {
                return Err(SandboxError::WaitFailed(
                    "wait stream ended unexpectedly".into(),
                ));
            }
        };

        self.state
            .store(ContainerState::Stopped as u8, Ordering::Release);
        debug!(id = %self.id, exit_code = code, "sandbox exited");
        Ok(code)
    }

    async fn logs(&self) -> sandbox::Result<String> {
        let options = LogsOptions {
            stdout: true,
            stderr: true,
            follow: false,
            ..Default::default()
        };
        let mut stream = self.docker.logs(&self.container_id, Some(options));

        let mut output = String::new();
        let mut truncated = false;
        while let Some(item) = stream.next().await {
            let chunk = item.map_err(|e| SandboxError::LogsFailed(e.to_string()))?;
            let message = match chunk {
                LogOutput::StdOut { message }
                | LogOutput::StdErr { message }
                | LogOutput::Console { message } => message,
                LogOutput::StdIn { .. } => continue,
            };
            if !append_capped(&mut output, &message, self.max_output_bytes) {
                truncated = true;
                break;
            }
        }

        if truncated {
            output.push_str(TRUNCATED_MARKER);
        }
        Ok(output)
    }

    async fn kill(&mut self) -> sandbox::Result<()> {
        if self.current_state() == ContainerState::Stopped {
            return Ok(());
        }

        let options = KillContainerOptions {
            signal: "SIGKILL".to_string(),
        };
        match self
            .docker
            .kill_container(&self.container_id, Some(options))
            .await
        {
            Ok(()) => {}
            Err(e) if is_benign_conflict(&e) => {}
            Err(e) => return Err(SandboxError::KillFailed(e.to_string())),
        }

        self.state
            .store(ContainerState::Stopped as u8, Ordering::Release);
        info!(id = %self.id, "sandbox killed");
        Ok(())
    }
}

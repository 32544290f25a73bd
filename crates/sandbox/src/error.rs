#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("backend not available: {0}")]
    BackendNotAvailable(String),

    #[error("sandbox creation failed: {0}")]
    CreationFailed(String),

    #[error("sandbox start failed: {0}")]
    StartFailed(String),

    #[error("wait failed: {0}")]
    WaitFailed(String),

    #[error("log collection failed: {0}")]
    LogsFailed(String),

    #[error("kill failed: {0}")]
    KillFailed(String),
}

pub type Result<T> = std::result::Result<T, SandboxError>;

use crate::language::UnsupportedLanguage;

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("config error: {0}")]
    Config(String),

    #[error("queue error: {0}")]
    Queue(#[from] broker::QueueError),

    #[error("cache error: {0}")]
    Cache(#[from] broker::CacheError),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] sandbox::SandboxError),

    #[error(transparent)]
    Language(#[from] UnsupportedLanguage),

    #[error("worker pool error: {0}")]
    Pool(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RunnerResult<T> = Result<T, RunnerError>;

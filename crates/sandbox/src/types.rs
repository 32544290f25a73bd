use std::fmt;

/// Lifecycle of a single sandbox from creation to removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    Created,
    Started,
    Running,
    Exited,
    TimedOut,
    Faulted,
    LogsCollected,
    Removed,
}

impl fmt::Display for SandboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::Started => f.write_str("started"),
            Self::Running => f.write_str("running"),
            Self::Exited => f.write_str("exited"),
            Self::TimedOut => f.write_str("timed_out"),
            Self::Faulted => f.write_str("faulted"),
            Self::LogsCollected => f.write_str("logs_collected"),
            Self::Removed => f.write_str("removed"),
        }
    }
}

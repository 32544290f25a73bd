use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub language: String,
    pub code: String,
    pub submitted_at: DateTime<Utc>,
}

impl Job {
    /// A new job with a fresh, never-reused id.
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            language: language.into(),
            code: code.into(),
            submitted_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Exit code recorded when the real one is unavailable.
pub const UNKNOWN_EXIT_CODE: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnsupportedLanguage,
    SandboxCreation,
    SandboxRuntime,
    Timeout,
    LogCollection,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedLanguage => f.write_str("unsupported_language"),
            Self::SandboxCreation => f.write_str("sandbox_creation"),
            Self::SandboxRuntime => f.write_str("sandbox_runtime"),
            Self::Timeout => f.write_str("timeout"),
            Self::LogCollection => f.write_str("log_collection"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub exit_code: i64,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
}

impl ExecutionResult {
    pub fn exited(exit_code: i64, output: String) -> Self {
        Self {
            exit_code,
            output,
            failure: None,
        }
    }

    /// A result for a job that never produced an exit code.
    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            exit_code: UNKNOWN_EXIT_CODE,
            output: String::new(),
            failure: Some(Failure::new(kind, message)),
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure.as_ref().map(|f| f.kind)
    }

    pub fn timed_out(&self) -> bool {
        self.failure_kind() == Some(FailureKind::Timeout)
    }
}

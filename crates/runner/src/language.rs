use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use sandbox::{NetworkPolicy, ResourceLimits, SandboxConfig};
use serde::Serialize;
use uuid::Uuid;

use crate::config::SandboxSettings;

/// Name of the environment variable carrying the submitted source.
pub const CODE_ENV: &str = "CODE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    Node,
    Golang,
    Cpp,
    C,
    Java,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported language: {0}")]
pub struct UnsupportedLanguage(pub String);

impl Language {
    pub const ALL: [Language; 6] = [
        Language::Python,
        Language::Node,
        Language::Golang,
        Language::Cpp,
        Language::C,
        Language::Java,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Node => "node",
            Self::Golang => "golang",
            Self::Cpp => "cpp",
            Self::C => "c",
            Self::Java => "java",
        }
    }

    pub fn image(self) -> &'static str {
        match self {
            Self::Python => "python:3.9",
            Self::Node => "node:14.17",
            Self::Golang => "golang:1.21",
            Self::Cpp | Self::C => "gcc:10.3",
            Self::Java => "openjdk:11.0.12",
        }
    }

    /// Shell script that writes `$CODE` to a source file, then builds and runs it.
    fn script(self) -> &'static str {
        match self {
            Self::Python => r#"printf '%s' "$CODE" > /tmp/main.py && exec python /tmp/main.py"#,
            Self::Node => r#"printf '%s' "$CODE" > /tmp/main.js && exec node /tmp/main.js"#,
            Self::Golang => {
                r#"mkdir -p /tmp/app && cd /tmp/app && printf '%s' "$CODE" > main.go && exec go run main.go"#
            }
            Self::Cpp => {
                r#"printf '%s' "$CODE" > /tmp/main.cpp && g++ -O2 -o /tmp/main /tmp/main.cpp && exec /tmp/main"#
            }
            Self::C => {
                r#"printf '%s' "$CODE" > /tmp/main.c && gcc -O2 -o /tmp/main /tmp/main.c && exec /tmp/main"#
            }
            Self::Java => {
                r#"mkdir -p /tmp/app && cd /tmp/app && printf '%s' "$CODE" > Solution.java && javac Solution.java && exec java Solution"#
            }
        }
    }

    pub fn execution_spec(self, code: &str, settings: &SandboxSettings) -> ExecutionSpec {
        ExecutionSpec {
            language: self,
            image: self.image().to_string(),
            command: vec!["sh".into(), "-c".into(), self.script().into()],
            env: vec![format!("{CODE_ENV}={code}")],
            limits: ResourceLimits {
                memory_mb: settings.memory_mb,
                cpu_count: settings.cpu_count,
            },
            network: NetworkPolicy::Isolated,
            time_budget: settings.time_budget(),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "python3" => Ok(Self::Python),
            "node" | "javascript" | "js" => Ok(Self::Node),
            "golang" | "go" => Ok(Self::Golang),
            "cpp" | "c++" => Ok(Self::Cpp),
            "c" => Ok(Self::C),
            "java" => Ok(Self::Java),
            _ => Err(UnsupportedLanguage(s.to_string())),
        }
    }
}

/// Entry in the public language listing.
#[derive(Debug, Serialize)]
pub struct LanguageInfo {
    pub language: &'static str,
    pub image: &'static str,
}

impl From<Language> for LanguageInfo {
    fn from(language: Language) -> Self {
        Self {
            language: language.name(),
            image: language.image(),
        }
    }
}

/// Everything needed to run one job, fixed before a sandbox exists.
#[derive(Debug, Clone)]
pub struct ExecutionSpec {
    pub language: Language,
    pub image: String,
    pub command: Vec<String>,
    pub env: Vec<String>,
    pub limits: ResourceLimits,
    pub network: NetworkPolicy,
    pub time_budget: Duration,
}

impl ExecutionSpec {
    pub fn sandbox_config(&self, id: Uuid) -> SandboxConfig {
        SandboxConfig {
            id,
            image: self.image.clone(),
            command: self.command.clone(),
            env: self.env.clone(),
            resources: self.limits,
            network: self.network,
        }
    }
}

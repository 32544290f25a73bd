use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RunnerError, RunnerResult};

pub(crate) const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
pub(crate) const DEFAULT_MAX_CODE_BYTES: usize = 64 * 1024;
pub(crate) const DEFAULT_MIN_WORKERS: usize = 1;
pub(crate) const DEFAULT_MAX_WORKERS: usize = 4;
pub(crate) const DEFAULT_HIGH_WATER_MARK: usize = 10;
pub(crate) const DEFAULT_CHANNEL_CAPACITY: usize = 32;
pub(crate) const DEFAULT_MONITOR_INTERVAL_MS: u64 = 5_000;
pub(crate) const DEFAULT_SCALE_STEP: usize = 1;
pub(crate) const DEFAULT_MEMORY_MB: u32 = 250;
pub(crate) const DEFAULT_TIME_BUDGET_MS: u64 = 5_000;
pub(crate) const DEFAULT_RESULT_TTL_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodexecConfig {
    pub broker: BrokerConfig,
    pub server: ServerConfig,
    pub pool: PoolConfig,
    pub sandbox: SandboxSettings,
    pub result_ttl_secs: u64,
}

impl Default for CodexecConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            server: ServerConfig::default(),
            pool: PoolConfig::default(),
            sandbox: SandboxSettings::default(),
            result_ttl_secs: DEFAULT_RESULT_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// `redis://` URL for the queue and cache. Unset runs both in-process.
    pub redis_url: Option<String>,
    pub queue_name: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            queue_name: broker::DEFAULT_QUEUE_NAME.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
    /// Largest accepted submission. Code travels in an environment variable,
    /// so this stays well under the kernel's argument size limit.
    pub max_code_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.into(),
            max_code_bytes: DEFAULT_MAX_CODE_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    /// Dispatch-channel depth above which the monitor adds workers.
    pub high_water_mark: usize,
    pub channel_capacity: usize,
    pub monitor_interval_ms: u64,
    /// Workers added or removed per monitor tick.
    pub scale_step: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_workers: DEFAULT_MIN_WORKERS,
            max_workers: DEFAULT_MAX_WORKERS,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            monitor_interval_ms: DEFAULT_MONITOR_INTERVAL_MS,
            scale_step: DEFAULT_SCALE_STEP,
        }
    }
}

impl PoolConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn validate(&self) -> RunnerResult<()> {
        if self.min_workers == 0 {
            return Err(RunnerError::Config(
                "pool.min_workers must be at least 1".into(),
            ));
        }
        if self.min_workers > self.max_workers {
            return Err(RunnerError::Config(format!(
                "pool.min_workers ({}) exceeds pool.max_workers ({})",
                self.min_workers, self.max_workers
            )));
        }
        if self.channel_capacity == 0 {
            return Err(RunnerError::Config(
                "pool.channel_capacity must be at least 1".into(),
            ));
        }
        // Depth can never exceed capacity, so the monitor would never grow.
        if self.high_water_mark >= self.channel_capacity {
            return Err(RunnerError::Config(format!(
                "pool.high_water_mark ({}) must be below pool.channel_capacity ({})",
                self.high_water_mark, self.channel_capacity
            )));
        }
        if self.monitor_interval_ms == 0 {
            return Err(RunnerError::Config(
                "pool.monitor_interval_ms must be positive".into(),
            ));
        }
        if self.scale_step == 0 {
            return Err(RunnerError::Config(
                "pool.scale_step must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    pub memory_mb: u32,
    pub cpu_count: Option<f64>,
    pub time_budget_ms: u64,
    pub pull_images: bool,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            memory_mb: DEFAULT_MEMORY_MB,
            cpu_count: None,
            time_budget_ms: DEFAULT_TIME_BUDGET_MS,
            pull_images: true,
        }
    }
}

impl SandboxSettings {
    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }

    pub fn docker_config(&self) -> sandbox_docker::DockerConfig {
        sandbox_docker::DockerConfig {
            pull_images: self.pull_images,
            ..Default::default()
        }
    }
}

impl CodexecConfig {
    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }

    pub fn validate(&self) -> RunnerResult<()> {
        self.pool.validate()?;
        if self.result_ttl_secs == 0 {
            return Err(RunnerError::Config(
                "result_ttl_secs must be positive".into(),
            ));
        }
        if self.sandbox.time_budget_ms == 0 {
            return Err(RunnerError::Config(
                "sandbox.time_budget_ms must be positive".into(),
            ));
        }
        if self.sandbox.memory_mb == 0 {
            return Err(RunnerError::Config(
                "sandbox.memory_mb must be positive".into(),
            ));
        }
        if self.server.max_code_bytes == 0 {
            return Err(RunnerError::Config(
                "server.max_code_bytes must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Load and validate a config from a YAML file. Missing sections take their defaults.
pub async fn load(path: &Path) -> RunnerResult<CodexecConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RunnerError::Config(format!("read {}: {e}", path.display())))?;
    let config: CodexecConfig = serde_yaml_ng::from_str(&content)
        .map_err(|e| RunnerError::Config(format!("parse {}: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}

/// Write `config` as YAML to `path`, creating parent directories.
pub async fn generate(config: &CodexecConfig, path: &Path) -> RunnerResult<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| RunnerError::Config(format!("create {}: {e}", dir.display())))?;
    }

    let content = serde_yaml_ng::to_string(config)
        .map_err(|e| RunnerError::Config(format!("serialize config: {e}")))?;

    tokio::fs::write(path, content)
        .await
        .map_err(|e| RunnerError::Config(format!("write {}: {e}", path.display())))?;
    Ok(())
}

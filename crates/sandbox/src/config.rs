#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceLimits {
    pub memory_mb: u32,
    /// Fractional CPU quota (e.g. `0.5`). `None` leaves the engine default.
    pub cpu_count: Option<f64>,
}

impl ResourceLimits {
    pub fn memory_bytes(&self) -> i64 {
        i64::from(self.memory_mb) * 1024 * 1024
    }

    /// CPU quota in units of 10^-9 CPUs, or `None` when unset or non-positive.
    pub fn nano_cpus(&self) -> Option<i64> {
        self.cpu_count
            .filter(|c| *c > 0.0)
            .map(|c| (c * 1_000_000_000.0) as i64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkPolicy {
    /// No network interfaces besides loopback.
    #[default]
    Isolated,
}

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub id: uuid::Uuid,
    pub image: String,
    pub command: Vec<String>,
    /// `KEY=value` pairs passed to the sandboxed process.
    pub env: Vec<String>,
    pub resources: ResourceLimits,
    pub network: NetworkPolicy,
}

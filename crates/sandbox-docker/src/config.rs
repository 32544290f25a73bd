/// Default cap on captured output per sandbox (64 KiB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 64 * 1024;
/// Default process-count ceiling inside a sandbox.
pub const DEFAULT_PIDS_LIMIT: i64 = 128;

#[derive(Debug, Clone)]
pub struct DockerConfig {
    /// Pull images that are missing locally before creating a container.
    pub pull_images: bool,
    /// Prefix for container names (`{prefix}{sandbox_id}`).
    pub name_prefix: String,
    /// Output beyond this many bytes is dropped and marked as truncated.
    pub max_output_bytes: usize,
    /// Maximum number of processes inside one sandbox. `None` leaves the daemon default.
    pub pids_limit: Option<i64>,
    /// Remove leftover labelled containers on startup and shutdown. Disable
    /// when another process on the same daemon owns live sandboxes.
    pub sweep_stale: bool,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            pull_images: true,
            name_prefix: "codexec-".into(),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            pids_limit: Some(DEFAULT_PIDS_LIMIT),
            sweep_stale: true,
        }
    }
}

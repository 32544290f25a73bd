use async_trait::async_trait;

use crate::config::SandboxConfig;
use crate::error::Result;
use crate::sandbox::Sandbox;

#[async_trait]
pub trait SandboxFactory: Send + Sync {
    /// Human-readable name for this factory implementation (e.g. "docker").
    fn name(&self) -> &str;
    /// Verify the backend is reachable and initialize shared resources.
    /// Must be called before `create()` or `destroy()`.
    async fn startup(&mut self) -> Result<()>;
    /// Create a new sandbox with its resource ceilings applied.
    ///
    /// On error nothing is left behind; a partially created sandbox is
    /// removed by the factory before returning.
    async fn create(&self, config: SandboxConfig) -> Result<Box<dyn Sandbox>>;
    /// Kill and remove a sandbox. Never fails; problems are logged.
    async fn destroy(&self, sandbox: Box<dyn Sandbox>);
    /// Release all factory-level resources.
    async fn shutdown(&mut self);
}

use std::any::Any;

use async_trait::async_trait;

use crate::error::Result;

/// The `Any` bound allows `SandboxFactory::destroy()` to downcast
/// `Box<dyn Sandbox>` back to the concrete type for backend-specific cleanup.
#[async_trait]
pub trait Sandbox: Send + Sync + Any {
    // -- identity --
    fn id(&self) -> &str;

    // -- lifecycle --
    async fn start(&mut self) -> Result<()>;
    /// Immediate, non-graceful termination. A no-op if already stopped.
    async fn kill(&mut self) -> Result<()>;

    // -- operations --
    /// Wait for the sandboxed process to exit and return its exit code.
    ///
    /// Not bounded by any deadline; callers race it against their own budget.
    async fn wait(&self) -> Result<i64>;
    /// Combined stdout and stderr captured so far.
    async fn logs(&self) -> Result<String>;
}

mod exec;
mod init;
mod start;

pub use exec::{ExecArgs, run_exec};
pub use init::{InitArgs, run_init};
pub use start::{StartArgs, run_start};

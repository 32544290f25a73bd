use std::path::PathBuf;

use clap::Args;

use crate::config::{self, CodexecConfig};
use crate::error::{RunnerError, RunnerResult};

#[derive(Args)]
pub struct InitArgs {
    /// Where to write the config file
    #[arg(long, short, default_value = "codexec.yaml")]
    output: PathBuf,
    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
}

/// Write a config file populated with defaults.
pub async fn run_init(args: InitArgs) -> RunnerResult<()> {
    let exists = tokio::fs::try_exists(&args.output)
        .await
        .map_err(|e| RunnerError::Config(format!("check {}: {e}", args.output.display())))?;
    if exists && !args.force {
        return Err(RunnerError::Config(format!(
            "{} already exists (use --force to overwrite)",
            args.output.display()
        )));
    }

    config::generate(&CodexecConfig::default(), &args.output).await?;
    println!("wrote {}", args.output.display());
    Ok(())
}

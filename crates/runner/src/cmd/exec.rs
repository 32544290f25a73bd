use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use sandbox::SandboxFactory;
use sandbox_docker::{DockerConfig, DockerFactory};

use crate::config::{self, CodexecConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::executor::SandboxRunner;
use crate::language::Language;

#[derive(Args)]
pub struct ExecArgs {
    /// Language of the source file (e.g. python, node, go, c++)
    #[arg(long, short)]
    language: String,
    /// Source file to run
    file: PathBuf,
    /// Path to codexec.yaml for sandbox limits
    #[arg(long, short, env = "CODEXEC_CONFIG")]
    config: Option<PathBuf>,
    /// Wall-clock budget in milliseconds (overrides config)
    #[arg(long)]
    time_budget_ms: Option<u64>,
}

/// Run one file in a sandbox, print its output, and exit with its status.
pub async fn run_exec(args: ExecArgs) -> RunnerResult<ExitCode> {
    let language: Language = args.language.parse()?;
    let code = tokio::fs::read_to_string(&args.file)
        .await
        .map_err(|e| RunnerError::Config(format!("read {}: {e}", args.file.display())))?;

    let mut config = match &args.config {
        Some(path) => config::load(path).await?,
        None => CodexecConfig::default(),
    };
    if let Some(budget) = args.time_budget_ms {
        config.sandbox.time_budget_ms = budget;
    }
    config.validate()?;

    // A running service on the same daemon owns its labelled containers.
    let docker_config = DockerConfig {
        sweep_stale: false,
        ..config.sandbox.docker_config()
    };
    let mut factory = DockerFactory::new(docker_config)?;
    factory.startup().await?;
    let factory = Arc::new(factory);

    let runner = SandboxRunner::new(factory.clone());
    let spec = language.execution_spec(&code, &config.sandbox);
    let result = runner.run(&spec).await;

    drop(runner);
    if let Ok(mut factory) = Arc::try_unwrap(factory) {
        factory.shutdown().await;
    }

    let result = result?;
    print!("{}", result.output);
    if let Some(failure) = &result.failure {
        eprintln!("{}: {}", failure.kind, failure.message);
    }

    Ok(u8::try_from(result.exit_code)
        .map(ExitCode::from)
        .unwrap_or(ExitCode::FAILURE))
}

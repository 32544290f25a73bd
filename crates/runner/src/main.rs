mod api;
mod bridge;
mod cmd;
mod config;
mod error;
mod executor;
mod language;
mod pool;
#[cfg(test)]
mod testing;
mod worker;

use std::fmt;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct Elapsed(Instant);

impl FormatTime for Elapsed {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        let d = self.0.elapsed();
        let total_secs = d.as_secs();
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        let millis = d.subsec_millis();
        write!(w, "[{mins:02}:{secs:02}:{millis:03}]")
    }
}

#[derive(Parser)]
#[command(name = "codexec", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API, ingest bridge and worker pool
    Start(Box<cmd::StartArgs>),
    /// Run a single source file in a sandbox and exit with its status
    Exec(cmd::ExecArgs),
    /// Write a default codexec.yaml
    Init(cmd::InitArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    // stderr keeps `exec` output on stdout clean.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(Elapsed(Instant::now()))
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Start(args) => cmd::run_start(*args).await.map(|()| ExitCode::SUCCESS),
        Command::Exec(args) => cmd::run_exec(args).await,
        Command::Init(args) => cmd::run_init(args).await.map(|()| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

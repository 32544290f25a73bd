use std::path::PathBuf;
use std::sync::Arc;

use broker::{MemoryCache, MemoryQueue, RedisCache, RedisQueue, ResultCache, SubmissionQueue};
use clap::Args;
use sandbox::SandboxFactory;
use sandbox_docker::DockerFactory;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api::{self, ApiState};
use crate::bridge::IngestBridge;
use crate::config::{self, BrokerConfig, CodexecConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::executor::SandboxRunner;
use crate::pool::WorkerPool;
use crate::worker::WorkerContext;

#[derive(Args)]
pub struct StartArgs {
    /// Path to codexec.yaml (defaults apply when omitted)
    #[arg(long, short, env = "CODEXEC_CONFIG")]
    config: Option<PathBuf>,
    /// HTTP listen address (overrides config)
    #[arg(long, env = "CODEXEC_LISTEN")]
    listen: Option<String>,
    /// Redis URL for the queue and cache (overrides config)
    #[arg(long, env = "CODEXEC_REDIS_URL")]
    redis_url: Option<String>,
}

/// Load config, wire the service together and run until SIGINT/SIGTERM.
pub async fn run_start(args: StartArgs) -> RunnerResult<()> {
    let mut config = match &args.config {
        Some(path) => config::load(path).await?,
        None => CodexecConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if let Some(url) = args.redis_url {
        config.broker.redis_url = Some(url);
    }
    config.validate()?;

    run(config).await
}

async fn connect_broker(
    config: &BrokerConfig,
) -> RunnerResult<(Arc<dyn SubmissionQueue>, Arc<dyn ResultCache>)> {
    let Some(url) = &config.redis_url else {
        warn!("no redis_url configured, using in-process queue and cache");
        let queue: Arc<dyn SubmissionQueue> = Arc::new(MemoryQueue::new());
        let cache: Arc<dyn ResultCache> = Arc::new(MemoryCache::new());
        return Ok((queue, cache));
    };

    let queue: Arc<dyn SubmissionQueue> =
        Arc::new(RedisQueue::connect(url, config.queue_name.clone()).await?);
    let cache: Arc<dyn ResultCache> = Arc::new(RedisCache::connect(url).await?);
    Ok((queue, cache))
}

async fn run(config: CodexecConfig) -> RunnerResult<()> {
    let (queue, cache) = connect_broker(&config.broker).await?;

    let mut factory = DockerFactory::new(config.sandbox.docker_config())?;
    factory.startup().await?;
    info!(backend = factory.name(), "sandbox backend ready");
    let factory = Arc::new(factory);

    let ctx = WorkerContext::new(
        SandboxRunner::new(factory.clone()),
        Arc::clone(&cache),
        config.sandbox.clone(),
        config.result_ttl(),
    );
    let pool = Arc::new(WorkerPool::start(config.pool.clone(), ctx)?);

    let monitor = tokio::spawn({
        let pool = Arc::clone(&pool);
        async move { pool.monitor_load().await }
    });

    let bridge_token = CancellationToken::new();
    let bridge = tokio::spawn(
        IngestBridge::new(Arc::clone(&queue), Arc::clone(&pool)).run(bridge_token.clone()),
    );

    let listener = TcpListener::bind(&config.server.listen).await?;
    info!(listen = %config.server.listen, "http server listening");
    let server_token = CancellationToken::new();
    let mut server = tokio::spawn(api::serve(
        listener,
        ApiState {
            queue,
            cache,
            pool: Arc::clone(&pool),
            max_code_bytes: config.server.max_code_bytes,
        },
        server_token.clone(),
    ));

    info!(
        min_workers = config.pool.min_workers,
        max_workers = config.pool.max_workers,
        time_budget_ms = config.sandbox.time_budget_ms,
        "codexec started"
    );

    // -----------------------------------------------------------------------
    // Wait for a signal, or for the server to die on its own
    // -----------------------------------------------------------------------
    let server_finished = tokio::select! {
        _ = shutdown_signal() => None,
        result = &mut server => Some(result),
    };

    // -----------------------------------------------------------------------
    // Shutdown: stop intake, drain the pool, then close the server
    // -----------------------------------------------------------------------
    bridge_token.cancel();
    pool.stop().await?;
    if let Err(e) = bridge.await {
        error!(error = %e, "bridge task panicked");
    }
    if let Err(e) = monitor.await {
        error!(error = %e, "monitor task panicked");
    }

    server_token.cancel();
    let server_result = match server_finished {
        Some(result) => result,
        None => server.await,
    };
    match server_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "http server failed"),
        Err(e) => error!(error = %e, "http server task panicked"),
    }

    drop(pool);
    info!("shutting down factory");
    let mut factory = Arc::try_unwrap(factory)
        .map_err(|_| RunnerError::Internal("factory still referenced at shutdown".into()))?;
    factory.shutdown().await;

    info!("codexec stopped");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate()).ok();
    let mut sigint = signal(SignalKind::interrupt()).ok();

    tokio::select! {
        _ = recv_signal(&mut sigterm) => {
            info!("received SIGTERM, draining");
        }
        _ = recv_signal(&mut sigint) => {
            info!("received SIGINT, draining");
        }
    }
}

/// Await a signal if registered, or pend forever if registration failed.
async fn recv_signal(sig: &mut Option<tokio::signal::unix::Signal>) {
    match sig {
        Some(s) => {
            s.recv().await;
        }
        None => std::future::pending().await,
    }
}

//! In-process doubles for the sandbox backend and the broker.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use broker::{
    CacheError, CacheResult, ExecutionResult, Job, QueueError, QueueResult, ResultCache,
    SubmissionQueue,
};
use sandbox::{Sandbox, SandboxConfig, SandboxError, SandboxFactory};

use crate::config::{PoolConfig, SandboxSettings};
use crate::executor::SandboxRunner;
use crate::language::CODE_ENV;
use crate::worker::WorkerContext;

/// How a fake sandbox behaves once started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Exit with this code after the factory's run time. Output echoes `$CODE`.
    Exit(i64),
    /// Never exit on its own.
    Hang,
    /// `wait` fails.
    Fault,
    /// Exit with this code, then fail to produce logs.
    LogsFail(i64),
    /// Never exit, and fail to produce logs.
    HangLogsFail,
    /// `start` fails.
    StartFail,
    /// `create` fails.
    CreateFail,
    /// `wait` panics.
    Panic,
}

#[derive(Default)]
pub struct Counters {
    created: AtomicUsize,
    destroyed: AtomicUsize,
    killed: AtomicUsize,
    live: AtomicUsize,
    peak_live: AtomicUsize,
}

impl Counters {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn killed(&self) -> usize {
        self.killed.load(Ordering::SeqCst)
    }

    pub fn peak_live(&self) -> usize {
        self.peak_live.load(Ordering::SeqCst)
    }
}

pub struct FakeFactory {
    outcome: Outcome,
    by_code: HashMap<String, Outcome>,
    run_time: Duration,
    pub counters: Arc<Counters>,
}

impl FakeFactory {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            by_code: HashMap::new(),
            run_time: Duration::ZERO,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Use `outcome` for jobs whose code is exactly `code`.
    pub fn with_code_outcome(mut self, code: &str, outcome: Outcome) -> Self {
        self.by_code.insert(code.to_string(), outcome);
        self
    }

    /// How long an `Exit` sandbox runs before exiting.
    pub fn with_run_time(mut self, run_time: Duration) -> Self {
        self.run_time = run_time;
        self
    }
}

fn code_of(config: &SandboxConfig) -> String {
    let prefix = format!("{CODE_ENV}=");
    config
        .env
        .iter()
        .find_map(|kv| kv.strip_prefix(&prefix))
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl SandboxFactory for FakeFactory {
    fn name(&self) -> &str {
        "fake"
    }

    async fn startup(&mut self) -> sandbox::Result<()> {
        Ok(())
    }

    async fn create(&self, config: SandboxConfig) -> sandbox::Result<Box<dyn Sandbox>> {
        let code = code_of(&config);
        let outcome = self.by_code.get(&code).copied().unwrap_or(self.outcome);
        if outcome == Outcome::CreateFail {
            return Err(SandboxError::CreationFailed("scripted".into()));
        }

        let counters = &self.counters;
        counters.created.fetch_add(1, Ordering::SeqCst);
        let live = counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak_live.fetch_max(live, Ordering::SeqCst);

        Ok(Box::new(FakeSandbox {
            id: config.id.to_string(),
            code,
            outcome,
            run_time: self.run_time,
            counters: Arc::clone(&self.counters),
        }))
    }

    async fn destroy(&self, sandbox: Box<dyn Sandbox>) {
        assert!((sandbox as Box<dyn std::any::Any>).is::<FakeSandbox>());
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
        self.counters.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    async fn shutdown(&mut self) {}
}

pub struct FakeSandbox {
    id: String,
    code: String,
    outcome: Outcome,
    run_time: Duration,
    counters: Arc<Counters>,
}

#[async_trait]
impl Sandbox for FakeSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(&mut self) -> sandbox::Result<()> {
        match self.outcome {
            Outcome::StartFail => Err(SandboxError::StartFailed("scripted".into())),
            _ => Ok(()),
        }
    }

    async fn kill(&mut self) -> sandbox::Result<()> {
        self.counters.killed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn wait(&self) -> sandbox::Result<i64> {
        match self.outcome {
            Outcome::Exit(code) | Outcome::LogsFail(code) => {
                tokio::time::sleep(self.run_time).await;
                Ok(code)
            }
            Outcome::Fault => Err(SandboxError::WaitFailed("scripted".into())),
            Outcome::Panic => panic!("scripted panic"),
            Outcome::Hang | Outcome::HangLogsFail | Outcome::StartFail | Outcome::CreateFail => {
                std::future::pending().await
            }
        }
    }

    async fn logs(&self) -> sandbox::Result<String> {
        match self.outcome {
            Outcome::LogsFail(_) | Outcome::HangLogsFail => {
                Err(SandboxError::LogsFailed("scripted".into()))
            }
            _ => Ok(self.code.clone()),
        }
    }
}

/// Queue whose broker is always unreachable.
pub struct FailingQueue;

#[async_trait]
impl SubmissionQueue for FailingQueue {
    async fn enqueue(&self, _job: &Job) -> QueueResult<()> {
        Err(QueueError::Unavailable("connection refused".into()))
    }

    async fn dequeue(&self) -> QueueResult<Job> {
        Err(QueueError::Unavailable("connection refused".into()))
    }
}

/// Cache whose backend is always unreachable.
pub struct FailingCache;

#[async_trait]
impl ResultCache for FailingCache {
    async fn put(&self, _key: &str, _result: &ExecutionResult, _ttl: Duration) -> CacheResult<()> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn get(&self, _key: &str) -> CacheResult<Option<ExecutionResult>> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
}

/// Yield to other tasks until `done` holds, for work handed to background tasks.
pub async fn settle(done: impl Fn() -> bool) {
    for _ in 0..1_000 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
}

pub fn settings(time_budget: Duration) -> SandboxSettings {
    SandboxSettings {
        time_budget_ms: u64::try_from(time_budget.as_millis()).unwrap(),
        ..SandboxSettings::default()
    }
}

pub fn worker_context(
    factory: Arc<FakeFactory>,
    cache: Arc<dyn ResultCache>,
    time_budget: Duration,
) -> WorkerContext {
    WorkerContext::new(
        SandboxRunner::new(factory),
        cache,
        settings(time_budget),
        Duration::from_secs(60),
    )
}

pub fn pool_config(min_workers: usize, max_workers: usize) -> PoolConfig {
    PoolConfig {
        min_workers,
        max_workers,
        high_water_mark: 2,
        channel_capacity: 16,
        monitor_interval_ms: 5_000,
        scale_step: 1,
    }
}

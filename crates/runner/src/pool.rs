use std::sync::Arc;

use async_channel::{Receiver, Sender};
use broker::Job;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::PoolConfig;
use crate::error::{RunnerError, RunnerResult};
use crate::worker::{self, WorkerContext};

/// The dispatch channel is closed. Carries the job back to the caller.
#[derive(Debug, thiserror::Error)]
#[error("worker pool is closed")]
pub struct PoolClosed(pub Job);

/// Point-in-time view of the pool for logs and the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub min: usize,
    pub max: usize,
    pub active: usize,
    pub draining: usize,
    pub depth: usize,
}

struct Slot {
    id: usize,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Workers {
    active: Vec<Slot>,
    /// Shrunk workers that may still be finishing a job.
    draining: Vec<JoinHandle<()>>,
    next_id: usize,
    stopped: bool,
}

/// A bounded, resizable fleet of workers sharing one dispatch channel.
///
/// Holds `min_workers <= active <= max_workers` from `start` until `stop`.
pub struct WorkerPool {
    config: PoolConfig,
    ctx: Arc<WorkerContext>,
    tx: Sender<Job>,
    rx: Receiver<Job>,
    token: CancellationToken,
    workers: Mutex<Workers>,
}

impl WorkerPool {
    /// Validate `config` and spawn `min_workers` workers.
    pub fn start(config: PoolConfig, ctx: WorkerContext) -> RunnerResult<Self> {
        config.validate()?;

        let (tx, rx) = async_channel::bounded(config.channel_capacity);
        let mut pool = Self {
            ctx: Arc::new(ctx),
            tx,
            rx,
            token: CancellationToken::new(),
            workers: Mutex::new(Workers::default()),
            config,
        };

        let mut workers = Workers::default();
        for _ in 0..pool.config.min_workers {
            pool.spawn_worker(&mut workers);
        }
        pool.workers = Mutex::new(workers);

        info!(
            min = pool.config.min_workers,
            max = pool.config.max_workers,
            capacity = pool.config.channel_capacity,
            "worker pool started"
        );
        Ok(pool)
    }

    fn spawn_worker(&self, workers: &mut Workers) {
        let id = workers.next_id;
        workers.next_id += 1;
        let token = self.token.child_token();
        let handle = tokio::spawn(worker::run_worker(
            id,
            self.rx.clone(),
            Arc::clone(&self.ctx),
            token.clone(),
        ));
        workers.active.push(Slot { id, token, handle });
    }

    /// Add up to `n` workers without exceeding `max_workers`. Returns how many were added.
    pub async fn grow(&self, n: usize) -> usize {
        let mut workers = self.workers.lock().await;
        if workers.stopped {
            return 0;
        }
        let room = self.config.max_workers.saturating_sub(workers.active.len());
        let count = n.min(room);
        for _ in 0..count {
            self.spawn_worker(&mut workers);
        }
        count
    }

    /// Retire up to `n` workers without going below `min_workers`. Returns how many were retired.
    ///
    /// A retired worker finishes its current job before exiting.
    pub async fn shrink(&self, n: usize) -> usize {
        let mut workers = self.workers.lock().await;
        if workers.stopped {
            return 0;
        }
        workers.draining.retain(|h| !h.is_finished());
        let surplus = workers.active.len().saturating_sub(self.config.min_workers);
        let count = n.min(surplus);
        for _ in 0..count {
            if let Some(slot) = workers.active.pop() {
                slot.token.cancel();
                info!(worker_id = slot.id, "worker retired");
                workers.draining.push(slot.handle);
            }
        }
        count
    }

    /// Hand `job` to the next idle worker, waiting while the channel is full.
    pub async fn submit(&self, job: Job) -> Result<(), PoolClosed> {
        self.tx.send(job).await.map_err(|e| PoolClosed(e.into_inner()))
    }

    /// Jobs waiting in the dispatch channel.
    pub fn depth(&self) -> usize {
        self.tx.len()
    }

    pub async fn snapshot(&self) -> PoolSnapshot {
        let mut workers = self.workers.lock().await;
        workers.draining.retain(|h| !h.is_finished());
        PoolSnapshot {
            min: self.config.min_workers,
            max: self.config.max_workers,
            active: workers.active.len(),
            draining: workers.draining.len(),
            depth: self.depth(),
        }
    }

    /// Resize the pool from channel depth every `monitor_interval` until the pool stops.
    pub async fn monitor_load(&self) {
        let mut ticker = tokio::time::interval(self.config.monitor_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = ticker.tick() => self.rebalance().await,
            }
        }
    }

    async fn rebalance(&self) {
        let depth = self.depth();
        let active = self.workers.lock().await.active.len();
        let step = self.config.scale_step;

        if depth > self.config.high_water_mark {
            let added = self.grow(step).await;
            if added > 0 {
                info!(depth, added, active = active + added, "scaled up");
            }
        } else if depth == 0 && active > self.config.min_workers {
            let retired = self.shrink(step).await;
            if retired > 0 {
                info!(retired, active = active - retired, "scaled down");
            }
        }
    }

    /// Close the channel, wait for every worker to drain it and exit, then
    /// cancel the pool scope. Fails if the pool was already stopped.
    pub async fn stop(&self) -> RunnerResult<()> {
        let (active, draining) = {
            let mut workers = self.workers.lock().await;
            if workers.stopped {
                return Err(RunnerError::Pool("worker pool already stopped".into()));
            }
            workers.stopped = true;
            (
                std::mem::take(&mut workers.active),
                std::mem::take(&mut workers.draining),
            )
        };

        self.tx.close();
        info!(
            active = active.len(),
            draining = draining.len(),
            pending = self.depth(),
            "stopping worker pool"
        );

        let handles = active.into_iter().map(|slot| slot.handle).chain(draining);
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task panicked");
            }
        }

        self.token.cancel();
        info!("worker pool stopped");
        Ok(())
    }
}

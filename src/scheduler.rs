//! Cooperative job scheduler (§5).
//!
//! One `tokio::spawn` + `tokio::time::interval` loop per background concern
//! (snapshot builds, feature refreshes, ranking passes, …), each with its own
//! exclusivity lock keyed the way §5 specifies (per-window, per-network, per-
//! horizon, or global), so "no other run for the same window may be in
//! progress" is a property of the table rather than something every job
//! author has to remember to implement.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub type JobFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
pub type JobFn = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// The exclusivity boundary a job runs under. Two jobs that share an
/// `ExclusivityKey` can never run concurrently; distinct keys run
/// independently, matching the per-window/per-network/per-horizon/global
/// mutexes enumerated in §5's job table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExclusivityKey(pub String);

impl ExclusivityKey {
    pub fn window(job: &str, window: crate::snapshot::Window) -> Self {
        Self(format!("{job}:{}", window.as_str()))
    }

    pub fn network(job: &str, network: &str) -> Self {
        Self(format!("{job}:{network}"))
    }

    pub fn horizon(job: &str, horizon: crate::outcome::Horizon) -> Self {
        let h = match horizon {
            crate::outcome::Horizon::OneDay => "1d",
            crate::outcome::Horizon::SevenDay => "7d",
            crate::outcome::Horizon::ThirtyDay => "30d",
        };
        Self(format!("{job}:{h}"))
    }

    pub fn global(job: &str) -> Self {
        Self(format!("{job}:global"))
    }
}

struct JobSpec {
    name: String,
    key: ExclusivityKey,
    period: Duration,
    timeout: Duration,
    task: JobFn,
}

/// Owns a table of jobs and their exclusivity locks. `spawn_all` starts one
/// Tokio task per job; each task ticks on its own period and, before running,
/// attempts to acquire its slot's lock with `try_lock` — if another run for
/// the same exclusivity key is still in flight, this tick is skipped rather
/// than queued.
pub struct Scheduler {
    jobs: Vec<JobSpec>,
    locks: HashMap<ExclusivityKey, Arc<AsyncMutex<()>>>,
    cancelled: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            locks: HashMap::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Registers a periodic job. `task` is called fresh on every tick that
    /// successfully acquires the lock; it must be cheap to construct (it is
    /// typically a closure capturing `Arc`-wrapped store handles).
    pub fn register(
        &mut self,
        name: impl Into<String>,
        key: ExclusivityKey,
        period: Duration,
        timeout: Duration,
        task: JobFn,
    ) {
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        self.jobs.push(JobSpec {
            name: name.into(),
            key,
            period,
            timeout,
            task,
        });
        let _ = lock;
    }

    /// Cooperative cancellation: a job task checks this flag before starting
    /// its next run and, if set, exits without acquiring a lock or writing
    /// anything. In-flight store writes are allowed to finish.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// Starts every registered job as its own Tokio task and returns their
    /// join handles; the caller decides whether to await them (a long-running
    /// process) or detach them.
    pub fn spawn_all(self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(self.jobs.len());
        for job in self.jobs {
            let lock = self.locks[&job.key].clone();
            let cancelled = self.cancelled.clone();
            handles.push(tokio::spawn(run_job_loop(job, lock, cancelled)));
        }
        handles
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_job_loop(job: JobSpec, lock: Arc<AsyncMutex<()>>, cancelled: Arc<AtomicBool>) {
    let mut ticker = tokio::time::interval(job.period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if cancelled.load(Ordering::Relaxed) {
            info!(job = %job.name, "scheduler cancelled, exiting job loop");
            return;
        }

        let Ok(guard) = lock.try_lock() else {
            debug!(job = %job.name, key = %job.key.0, "skipping tick: run already in progress");
            continue;
        };

        let run = (job.task)();
        match tokio::time::timeout(job.timeout, run).await {
            Ok(Ok(())) => debug!(job = %job.name, "run completed"),
            Ok(Err(e)) => error!(job = %job.name, error = %e, "run failed"),
            Err(_) => warn!(job = %job.name, timeout_ms = job.timeout.as_millis() as u64, "run timed out"),
        }
        drop(guard);
    }
}

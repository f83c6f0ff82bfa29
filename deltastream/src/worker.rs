//! Worker identity signal
//!
//! A data-loading pool that runs several consumers of the same dataset tells
//! each of them which worker it is. The dataset only ever asks one question,
//! "which worker am I, out of how many?", through [`WorkerContext`].

use std::future::Future;
use tracing::warn;

pub const WORKER_ID_VAR: &str = "DELTASTREAM_WORKER_ID";
pub const NUM_WORKERS_VAR: &str = "DELTASTREAM_NUM_WORKERS";

/// Ordinal of the current worker and the size of its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerInfo {
    pub id: usize,
    pub num_workers: usize,
}

impl WorkerInfo {
    pub fn new(id: usize, num_workers: usize) -> Self {
        Self { id, num_workers }
    }
}

/// Source of the current worker identity; `None` means single-worker context
pub trait WorkerContext: Send + Sync {
    fn current(&self) -> Option<WorkerInfo>;
}

impl<F> WorkerContext for F
where
    F: Fn() -> Option<WorkerInfo> + Send + Sync,
{
    fn current(&self) -> Option<WorkerInfo> {
        self()
    }
}

/// Always single-worker
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWorkers;

impl WorkerContext for NoWorkers {
    fn current(&self) -> Option<WorkerInfo> {
        None
    }
}

tokio::task_local! {
    static CURRENT_WORKER: WorkerInfo;
}

/// Worker identity scoped to a tokio task
///
/// An in-process pool wraps each worker's future with [`TaskLocalWorkers::scope`];
/// datasets polled inside that future see the scoped identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskLocalWorkers;

impl TaskLocalWorkers {
    /// Run `fut` as worker `info`
    pub async fn scope<F: Future>(info: WorkerInfo, fut: F) -> F::Output {
        CURRENT_WORKER.scope(info, fut).await
    }
}

impl WorkerContext for TaskLocalWorkers {
    fn current(&self) -> Option<WorkerInfo> {
        CURRENT_WORKER.try_with(|info| *info).ok()
    }
}

/// Worker identity read from environment variables, for pools that launch
/// one process per worker
#[derive(Debug, Clone)]
pub struct EnvWorkers {
    id_var: String,
    count_var: String,
}

impl Default for EnvWorkers {
    fn default() -> Self {
        Self::new(WORKER_ID_VAR, NUM_WORKERS_VAR)
    }
}

impl EnvWorkers {
    /// Use custom variable names, e.g. `RANK` and `WORLD_SIZE`
    pub fn new(id_var: impl Into<String>, count_var: impl Into<String>) -> Self {
        Self {
            id_var: id_var.into(),
            count_var: count_var.into(),
        }
    }

    fn read(var: &str) -> Option<usize> {
        let raw = std::env::var(var).ok()?;
        match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring {}={:?}: not a non-negative integer", var, raw);
                None
            }
        }
    }
}

impl WorkerContext for EnvWorkers {
    fn current(&self) -> Option<WorkerInfo> {
        let id = Self::read(&self.id_var)?;
        let num_workers = Self::read(&self.count_var)?;
        Some(WorkerInfo::new(id, num_workers))
    }
}

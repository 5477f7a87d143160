/*!
 * Fixed-size worker pool.
 *
 * Each worker loops on `TaskQueue::recv` until it returns `None`, executing
 * whatever task it hands back with the queue's mutex released.
 */
use crate::proxy::queue::TaskQueue;
use crate::proxy::{Task, MAX_WORKERS};
use log::{info, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Raised by `WorkerPool::new` when construction cannot complete.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("worker count {0} exceeds MAX_WORKERS ({MAX_WORKERS})")]
    TooManyWorkers(usize),
    #[error("failed to spawn worker thread: {0}")]
    SpawnFailed(#[from] std::io::Error),
}

/// A fixed set of worker threads draining a shared `TaskQueue`.
pub struct WorkerPool {
    queue: Arc<TaskQueue>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `worker_count` threads against a fresh queue. If a thread fails
    /// to spawn partway through, every already-spawned worker is torn down
    /// (signal shutdown, join) before returning the error - no partially
    /// built pool escapes this function.
    pub fn new(worker_count: usize) -> Result<Self, PoolError> {
        if worker_count > MAX_WORKERS {
            return Err(PoolError::TooManyWorkers(worker_count));
        }
        let queue = Arc::new(TaskQueue::new());
        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let queue_cl = Arc::clone(&queue);
            match thread::Builder::new()
                .name(format!("proxy-worker-{id}"))
                .spawn(move || worker_loop(queue_cl))
            {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    warn!("worker {id} failed to spawn: {e}; tearing down partial pool");
                    queue.signal_shutdown();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(PoolError::SpawnFailed(e));
                }
            }
        }
        info!("worker pool started with {worker_count} workers");
        Ok(WorkerPool { queue, workers })
    }

    /// Non-blocking for the caller: enqueue one task, or silently drop it if
    /// the pool is already quiescing.
    pub fn dispatch(&self, task: Task) {
        self.queue.dispatch(task);
    }

    pub fn queue(&self) -> Arc<TaskQueue> {
        Arc::clone(&self.queue)
    }

    /// Three-phase teardown: stop accepting new tasks, wait for the queue
    /// to drain, then signal shutdown and join every worker.
    pub fn shutdown(mut self) {
        self.queue.quiesce();
        self.queue.signal_shutdown();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        info!("worker pool shut down");
    }
}

fn worker_loop(queue: Arc<TaskQueue>) {
    while let Some(task) = queue.recv() {
        task();
    }
}

//! Blocking worker pool with drain and coordinated shutdown.
//!
//! This module defines the [`WorkerPool`] struct, which owns a fixed set of
//! OS threads that pull [`Job`]s from one shared FIFO queue. Coordination is
//! done entirely with mutex/condition-variable pairs:
//!
//! - `queue` + `available`: producers push and signal one idle worker.
//! - `pending` + `drained`: every submitted job (and every synthetic wake-up
//!   job) is counted until it finishes; waiters block until the count is 0.
//!
//! Shutdown sets the `held` flag once the pool is drained. Idle workers are
//! woken, handed a synthetic no-op job instead of real work, and exit after
//! running it.

use crate::{
    Job,
    error::{PoolError, Result},
    worker::worker_loop,
};
use parking_lot::{Condvar, Mutex};
use portable_atomic::{AtomicBool, AtomicU64, Ordering};
use std::{collections::VecDeque, sync::Arc, thread};

/// State shared between the pool handle and every worker thread.
pub(crate) struct Shared {
    pub(crate) queue: Mutex<VecDeque<Job>>,
    pub(crate) available: Condvar,
    pub(crate) pending: Mutex<usize>,
    pub(crate) drained: Condvar,
    pub(crate) held: AtomicBool,
    pub(crate) executed: AtomicU64,
    pub(crate) panicked: AtomicU64,
}

impl Shared {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            pending: Mutex::new(0),
            drained: Condvar::new(),
            held: AtomicBool::new(false),
            executed: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
        }
    }

    /// Blocks until a job is queued or the pool is held.
    ///
    /// Returns the job and whether it is synthetic. Once held, a no-op is
    /// handed out instead of real work and counted as pending like any other
    /// job, so the caller runs it, settles the counter, and re-checks the
    /// flag.
    pub(crate) fn next_job(&self) -> (Job, bool) {
        let mut queue = self.queue.lock();
        self.available.wait_while(&mut queue, |queue| {
            queue.is_empty() && !self.held.load(Ordering::Acquire)
        });

        if !self.held.load(Ordering::Acquire) {
            if let Some(job) = queue.pop_front() {
                return (job, false);
            }
        }

        *self.pending.lock() += 1;
        (Box::new(|| {}), true)
    }

    /// Marks one job as finished and wakes drain waiters when none remain.
    pub(crate) fn complete_one(&self) {
        let mut pending = self.pending.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.drained.notify_all();
        }
    }

    fn wait_drained(&self) {
        let mut pending = self.pending.lock();
        self.drained.wait_while(&mut pending, |pending| *pending > 0);
    }
}

/// Point-in-time counters for a [`WorkerPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolStats {
    /// Worker threads still owned by the pool.
    pub workers: usize,
    /// Jobs submitted but not yet finished, including running ones.
    pub pending: usize,
    /// Real jobs run to completion, whether or not they panicked.
    pub executed: u64,
    /// Jobs that panicked.
    pub panicked: u64,
}

/// A fixed-size pool of threads executing [`Job`]s in FIFO order.
///
/// Dropping the pool performs [`WorkerPool::shutdown`].
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    /// Held for the whole of [`WorkerPool::shutdown`].
    joining: Mutex<()>,
    finished: AtomicBool,
}

impl WorkerPool {
    /// Spawns `num_workers` threads named `bidrelay-worker-{n}`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::NoWorkers`] for an empty pool and
    /// [`PoolError::Spawn`] if a thread cannot be started. Threads spawned
    /// before the failure are shut down again.
    pub fn new(num_workers: usize) -> Result<Self> {
        Self::with_name(num_workers, "bidrelay-worker")
    }

    /// Like [`WorkerPool::new`], naming threads `{name}-{n}`.
    pub fn with_name(num_workers: usize, name: &str) -> Result<Self> {
        if num_workers == 0 {
            return Err(PoolError::NoWorkers);
        }

        let pool = Self {
            shared: Arc::new(Shared::new()),
            workers: Mutex::new(Vec::with_capacity(num_workers)),
            joining: Mutex::new(()),
            finished: AtomicBool::new(false),
        };

        for worker_id in 0..num_workers {
            let shared = Arc::clone(&pool.shared);
            let handle = thread::Builder::new()
                .name(format!("{name}-{worker_id}"))
                .spawn(move || worker_loop(worker_id, shared))
                .map_err(|source| PoolError::Spawn { worker_id, source })?;
            pool.workers.lock().push(handle);
        }

        tracing::debug!(num_workers, "Worker pool started");
        Ok(pool)
    }

    /// Enqueues a job and signals one idle worker.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ShutDown`] once shutdown has begun. The rejected
    /// job is dropped without running.
    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut queue = self.shared.queue.lock();
            if self.shared.held.load(Ordering::Acquire) || self.finished.load(Ordering::Acquire) {
                return Err(PoolError::ShutDown);
            }
            *self.shared.pending.lock() += 1;
            queue.push_back(Box::new(job));
        }
        self.shared.available.notify_one();
        Ok(())
    }

    /// Blocks until every submitted job has finished.
    ///
    /// Must not be called from inside a job: the caller's own job keeps the
    /// pending count above zero.
    pub fn await_drain(&self) {
        self.shared.wait_drained();
    }

    /// Drains the queue, stops every worker and joins its thread.
    ///
    /// Repeated calls do no further work, but a call racing the first one
    /// still returns only after every worker has been joined. Must not be
    /// called from inside a job.
    pub fn shutdown(&self) {
        let _joining = self.joining.lock();
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }

        tracing::debug!("Draining worker pool before shutdown");

        // Hold only once drained; a submit racing the drain wait pushes the
        // pending count back up and we wait again.
        loop {
            self.shared.wait_drained();
            let queue = self.shared.queue.lock();
            if queue.is_empty() && *self.shared.pending.lock() == 0 {
                self.shared.held.store(true, Ordering::Release);
                break;
            }
        }
        self.shared.available.notify_all();

        let workers = core::mem::take(&mut *self.workers.lock());
        for (worker_id, handle) in workers.into_iter().enumerate() {
            if handle.join().is_err() {
                tracing::error!(worker_id, "Worker thread terminated abnormally");
            }
        }

        tracing::debug!("Worker pool shutdown complete");
    }

    /// Returns `true` once [`WorkerPool::shutdown`] has been called.
    pub fn is_shut_down(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.workers.lock().len(),
            pending: *self.shared.pending.lock(),
            executed: self.shared.executed.load(Ordering::Relaxed),
            panicked: self.shared.panicked.load(Ordering::Relaxed),
        }
    }

    #[cfg(test)]
    pub(crate) fn shared_refs(&self) -> usize {
        Arc::strong_count(&self.shared)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl core::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("stats", &self.stats())
            .field("finished", &self.is_shut_down())
            .finish()
    }
}

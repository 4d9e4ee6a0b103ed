pub type Result<T> = core::result::Result<T, PoolError>;

/// Failures reported by [`WorkerPool`](crate::WorkerPool).
#[derive(thiserror::Error, Debug)]
pub enum PoolError {
    /// A pool needs at least one worker thread.
    #[error("Worker pool requires at least one worker")]
    NoWorkers,

    /// The OS refused to start a worker thread.
    #[error("Failed to spawn worker {worker_id}: {source}")]
    Spawn {
        worker_id: usize,
        #[source]
        source: std::io::Error,
    },

    /// The pool is held or finished and accepts no further jobs.
    #[error("Worker pool is shut down")]
    ShutDown,
}

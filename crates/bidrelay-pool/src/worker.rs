use crate::{Job, manager::Shared};
use portable_atomic::Ordering;
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

/// Body of every pool thread.
///
/// Pulls jobs until the pool's `held` flag is observed. A worker blocked on
/// an empty queue only sees the flag after it is woken and handed the
/// synthetic no-op, which it runs and counts like any other job before
/// exiting.
///
/// # Arguments
///
/// - `worker_id`: Index of this worker, used in logs.
/// - `shared`: Queue, counters and condition variables owned by the pool.
pub(crate) fn worker_loop(worker_id: usize, shared: Arc<Shared>) {
    tracing::trace!(worker_id, "Worker started");

    while !shared.held.load(Ordering::Acquire) {
        let (job, synthetic) = shared.next_job();
        run_job(worker_id, &shared, job);
        if !synthetic {
            shared.executed.fetch_add(1, Ordering::Relaxed);
        }
        shared.complete_one();
    }

    tracing::trace!(worker_id, "Worker stopped");
}

/// Runs one job, containing any panic to that job.
fn run_job(worker_id: usize, shared: &Shared, job: Job) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
        shared.panicked.fetch_add(1, Ordering::Relaxed);
        tracing::error!(
            worker_id,
            reason = panic_message(payload.as_ref()),
            "Job panicked"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

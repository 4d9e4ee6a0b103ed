use crate::{PoolError, WorkerPool};
use std::{
    sync::{
        Arc, Barrier, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

fn counters(n: usize) -> Arc<Vec<AtomicUsize>> {
    Arc::new((0..n).map(|_| AtomicUsize::new(0)).collect())
}

#[test]
fn rejects_empty_pool() {
    assert!(matches!(WorkerPool::new(0), Err(PoolError::NoWorkers)));
}

#[test]
fn every_job_runs_exactly_once_before_drain_returns() {
    const JOBS: usize = 2_000;
    let pool = WorkerPool::new(8).unwrap();
    let runs = counters(JOBS);

    for i in 0..JOBS {
        let runs = Arc::clone(&runs);
        pool.submit(move || {
            runs[i].fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    pool.await_drain();

    assert!(runs.iter().all(|count| count.load(Ordering::SeqCst) == 1));
    let stats = pool.stats();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.executed, JOBS as u64);
    assert_eq!(stats.panicked, 0);
}

#[test]
fn drain_waits_for_running_jobs() {
    let pool = WorkerPool::new(2).unwrap();
    let done = Arc::new(AtomicUsize::new(0));

    for _ in 0..6 {
        let done = Arc::clone(&done);
        pool.submit(move || {
            thread::sleep(Duration::from_millis(20));
            done.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    pool.await_drain();
    assert_eq!(done.load(Ordering::SeqCst), 6);
}

#[test]
fn drain_on_idle_pool_returns_immediately() {
    let pool = WorkerPool::new(3).unwrap();
    pool.await_drain();
    pool.await_drain();
    assert_eq!(pool.stats().pending, 0);
}

#[test]
fn single_worker_preserves_submission_order() {
    let pool = WorkerPool::new(1).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    for i in 0..100 {
        let order = Arc::clone(&order);
        pool.submit(move || order.lock().unwrap().push(i)).unwrap();
    }

    pool.await_drain();
    assert_eq!(*order.lock().unwrap(), (0..100).collect::<Vec<_>>());
}

#[test]
fn workers_run_in_parallel() {
    const WORKERS: usize = 4;
    let pool = WorkerPool::new(WORKERS).unwrap();
    // Every job blocks until all of them are running at once.
    let barrier = Arc::new(Barrier::new(WORKERS));
    let finished = Arc::new(AtomicUsize::new(0));

    for _ in 0..WORKERS {
        let barrier = Arc::clone(&barrier);
        let finished = Arc::clone(&finished);
        pool.submit(move || {
            barrier.wait();
            finished.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    pool.await_drain();
    assert_eq!(finished.load(Ordering::SeqCst), WORKERS);
}

#[test]
fn concurrent_producers() {
    let pool = Arc::new(WorkerPool::new(4).unwrap());
    let runs = counters(4 * 250);

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let pool = Arc::clone(&pool);
            let runs = Arc::clone(&runs);
            thread::spawn(move || {
                for i in 0..250 {
                    let runs = Arc::clone(&runs);
                    pool.submit(move || {
                        runs[p * 250 + i].fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    pool.await_drain();
    assert!(runs.iter().all(|count| count.load(Ordering::SeqCst) == 1));
}

#[test]
fn shutdown_drains_then_joins_every_worker() {
    let pool = WorkerPool::new(4).unwrap();
    let done = Arc::new(AtomicUsize::new(0));

    for _ in 0..50 {
        let done = Arc::clone(&done);
        pool.submit(move || {
            thread::sleep(Duration::from_millis(1));
            done.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    pool.shutdown();

    assert_eq!(done.load(Ordering::SeqCst), 50);
    assert!(pool.is_shut_down());
    let stats = pool.stats();
    assert_eq!(stats.workers, 0);
    // Synthetic wake-up jobs are counted and settled too.
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.executed, 50);
    // No worker thread still holds the shared state.
    assert_eq!(pool.shared_refs(), 1);
}

#[test]
fn shutdown_is_idempotent() {
    let pool = WorkerPool::new(2).unwrap();
    pool.submit(|| {}).unwrap();
    pool.shutdown();
    pool.shutdown();
    assert!(pool.is_shut_down());
    assert_eq!(pool.stats().workers, 0);
    // Drop runs shutdown a third time.
    drop(pool);
}

#[test]
fn racing_shutdown_returns_only_after_join() {
    let pool = WorkerPool::new(2).unwrap();
    let (release, gate) = std::sync::mpsc::channel::<()>();
    pool.submit(move || {
        let _ = gate.recv();
    })
    .unwrap();

    thread::scope(|s| {
        let first = s.spawn(|| pool.shutdown());
        while !pool.is_shut_down() {
            thread::sleep(Duration::from_millis(1));
        }

        // The second caller finds shutdown already under way and must wait
        // for the first to join the workers.
        let second = s.spawn(|| {
            pool.shutdown();
            pool.shared_refs()
        });
        thread::sleep(Duration::from_millis(50));
        assert!(!second.is_finished());

        release.send(()).unwrap();
        assert_eq!(second.join().unwrap(), 1);
        first.join().unwrap();
    });

    assert_eq!(pool.stats().workers, 0);
}

#[test]
fn submit_after_shutdown_is_rejected() {
    let pool = WorkerPool::new(1).unwrap();
    pool.shutdown();

    let ran = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&ran);
    let result = pool.submit(move || {
        flag.fetch_add(1, Ordering::SeqCst);
    });

    assert!(matches!(result, Err(PoolError::ShutDown)));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(pool.stats().pending, 0);
}

#[test]
fn panicking_job_does_not_take_down_its_worker() {
    let pool = WorkerPool::new(1).unwrap();
    let after = Arc::new(AtomicUsize::new(0));

    pool.submit(|| {
        panic!("vendor exploded");
    })
    .unwrap();
    let flag = Arc::clone(&after);
    pool.submit(move || {
        flag.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    pool.await_drain();

    assert_eq!(after.load(Ordering::SeqCst), 1);
    let stats = pool.stats();
    assert_eq!(stats.panicked, 1);
    assert_eq!(stats.executed, 2);
    assert_eq!(stats.workers, 1);
}

#[test]
fn drop_joins_workers() {
    let done = Arc::new(AtomicUsize::new(0));
    {
        let pool = WorkerPool::new(2).unwrap();
        for _ in 0..10 {
            let done = Arc::clone(&done);
            pool.submit(move || {
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
    }
    assert_eq!(done.load(Ordering::SeqCst), 10);
}

use bidrelay_pool::WorkerPool;
use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

const JOBS_PER_ITER: u64 = 4096;

fn submit_and_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool/submit_drain");
    group.throughput(Throughput::Elements(JOBS_PER_ITER));

    for workers in [1, 2, 4, 8] {
        let pool = WorkerPool::new(workers).unwrap();
        let sink = Arc::new(AtomicU64::new(0));

        group.bench_function(format!("workers/{workers}"), |b| {
            b.iter(|| {
                for i in 0..JOBS_PER_ITER {
                    let sink = Arc::clone(&sink);
                    pool.submit(move || {
                        sink.fetch_add(black_box(i), Ordering::Relaxed);
                    })
                    .unwrap();
                }
                pool.await_drain();
            });
        });

        pool.shutdown();
    }

    group.finish();
}

criterion_group!(benches, submit_and_drain);
criterion_main!(benches);

// benches/queue_throughput.rs
// Criterion benchmarks for WorkerPool dispatch overhead with a no-op stage.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use ferrous_lastz::PipelineError;
use ferrous_lastz::core::abort::AbortSignal;
use ferrous_lastz::core::queue::{PoolConfig, PutMode, Stage, WorkerPool};

struct Sum(AtomicU64);

impl Stage for Sum {
    type Item = u64;

    fn process(&self, item: u64) -> Result<(), PipelineError> {
        self.0.fetch_add(black_box(item), Ordering::Relaxed);
        Ok(())
    }
}

fn drain(config: &PoolConfig, items: u64) -> u64 {
    let abort = Arc::new(AbortSignal::new());
    let pool = match WorkerPool::new("bench", config, Sum(AtomicU64::new(0)), abort) {
        Ok(pool) => pool,
        Err(e) => panic!("pool setup failed: {e}"),
    };
    for i in 0..items {
        if pool.put(i, PutMode::Block).is_err() {
            break;
        }
    }
    pool.send_stop();
    match pool.join() {
        Ok(stage) => stage.0.load(Ordering::Relaxed),
        Err(e) => panic!("pool join failed: {e}"),
    }
}

fn bench_queue_throughput(c: &mut Criterion) {
    const ITEMS: u64 = 10_000;
    let mut group = c.benchmark_group("worker_pool");
    group.throughput(Throughput::Elements(ITEMS));

    for workers in [1usize, 2, 4, 8] {
        let bounded = PoolConfig::bounded(workers, 128).with_throttle(Duration::ZERO);
        group.bench_with_input(BenchmarkId::new("bounded_128", workers), &bounded, |b, cfg| {
            b.iter(|| drain(cfg, ITEMS))
        });

        let unbounded = PoolConfig::unbounded(workers).with_throttle(Duration::ZERO);
        group.bench_with_input(BenchmarkId::new("unbounded", workers), &unbounded, |b, cfg| {
            b.iter(|| drain(cfg, ITEMS))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_queue_throughput);
criterion_main!(benches);

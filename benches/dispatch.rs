use criterion::{Criterion, black_box, criterion_group, criterion_main};
use runloop::RunLoop;

use crossbeam::channel;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

fn bench_async(c: &mut Criterion) {
    let rl = RunLoop::new();
    let counter = Arc::new(AtomicU64::new(0));

    c.bench_function("runloop_async_1000", |b| {
        b.iter(|| {
            for _ in 0..1000 {
                let counter = counter.clone();
                rl.spawn("increment", move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                });
            }
            rl.wait();
        })
    });
}

fn bench_sync(c: &mut Criterion) {
    let rl = RunLoop::new();

    c.bench_function("runloop_sync", |b| {
        b.iter(|| black_box(rl.sync("echo", || 1u64)))
    });
}

fn bench_priority_mix(c: &mut Criterion) {
    let rl = RunLoop::new();
    let priority = rl.priority();

    c.bench_function("runloop_priority_mix_1000", |b| {
        b.iter(|| {
            for i in 0..1000 {
                let handle = if i % 4 == 0 { &priority } else { &rl };
                handle.spawn("noop", || {});
            }
            rl.wait();
        })
    });
}

// Baseline: the same work through a bare channel and worker thread.
fn bench_channel_baseline(c: &mut Criterion) {
    c.bench_function("channel_baseline_1000", |b| {
        b.iter(|| {
            let (tx, rx) = channel::bounded::<Box<dyn FnOnce() + Send>>(50);
            let worker = std::thread::spawn(move || {
                for op in rx {
                    op();
                }
            });
            let counter = Arc::new(AtomicU64::new(0));
            for _ in 0..1000 {
                let counter = counter.clone();
                let _ = tx.send(Box::new(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                }));
            }
            drop(tx);
            let _ = worker.join();
        })
    });
}

criterion_group!(
    benches,
    bench_async,
    bench_sync,
    bench_priority_mix,
    bench_channel_baseline
);
criterion_main!(benches);

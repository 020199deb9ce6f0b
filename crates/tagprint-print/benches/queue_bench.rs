// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the serial job queue: raw enqueue/drain overhead
// and the bookkeeping cost of the per-task timeout.

use std::time::Duration;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use tokio::runtime::Runtime;

use tagprint_print::SerialJobQueue;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("tokio runtime")
}

fn run_batch(rt: &Runtime, queue: &SerialJobQueue, tasks: usize) {
    rt.block_on(async {
        for _ in 0..tasks {
            queue.enqueue(|| async { Ok(()) });
        }
        queue.wait_idle().await;
    });
}

fn bench_drain(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("serial_queue_drain");

    for tasks in [1usize, 64, 1024] {
        group.bench_with_input(BenchmarkId::new("no_timeout", tasks), &tasks, |b, &n| {
            let queue = SerialJobQueue::new();
            b.iter(|| run_batch(&rt, &queue, n));
        });
        group.bench_with_input(BenchmarkId::new("with_timeout", tasks), &tasks, |b, &n| {
            let queue = SerialJobQueue::with_task_timeout(Duration::from_secs(300));
            b.iter(|| run_batch(&rt, &queue, n));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_drain);
criterion_main!(benches);

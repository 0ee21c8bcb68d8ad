#![expect(missing_docs, reason = "benchmarks")]

use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use criterion::{Criterion, criterion_group, criterion_main};
use lbs::{Requirements, Scheduler};
use new_zealand::nz;

const RANGE_LEN: usize = 100_000;
const CHAIN_LEN: usize = 16;

fn entrypoint(c: &mut Criterion) {
    let mut g = c.benchmark_group("lbs");

    g.bench_function("single_task", |b| {
        let scheduler = Scheduler::new();

        b.iter_custom(|iterations| {
            let start = Instant::now();

            for _ in 0..iterations {
                scheduler.add_task("single", |i, _| {
                    black_box(i);
                });
                scheduler.sleep_till_keywords("single");
            }

            start.elapsed()
        });
    });

    for (label, chunk_size) in [
        ("parallel_for_chunk_32", nz!(32)),
        ("parallel_for_chunk_1024", nz!(1024)),
    ] {
        g.bench_function(label, |b| {
            let scheduler = Scheduler::new();
            let sum = Arc::new(AtomicUsize::new(0));

            b.iter_custom(|iterations| {
                let start = Instant::now();

                for _ in 0..iterations {
                    let sum = Arc::clone(&sum);
                    scheduler.add_parallel_for(
                        "range",
                        Requirements::new(),
                        Requirements::new(),
                        0..RANGE_LEN,
                        chunk_size,
                        move |i, _| {
                            sum.fetch_add(black_box(i), Ordering::Relaxed);
                        },
                    );
                    scheduler.sleep_till_keywords("range");
                }

                start.elapsed()
            });
        });
    }

    g.bench_function("dependency_chain", |b| {
        let scheduler = Scheduler::new();
        let names: Vec<String> = (0..CHAIN_LEN).map(|i| format!("link{i}")).collect();

        b.iter_custom(|iterations| {
            let start = Instant::now();

            for _ in 0..iterations {
                scheduler.add_task("link0", |_, _| {});

                for pair in names.windows(2) {
                    if let [previous, current] = pair {
                        scheduler.add_task_with(
                            current,
                            previous.as_str(),
                            Requirements::new(),
                            |_, _| {},
                        );
                    }
                }

                if let Some(last) = names.last() {
                    scheduler.sleep_till_keywords(last.as_str());
                }
            }

            start.elapsed()
        });
    });

    g.finish();
}

criterion_group!(benches, entrypoint);
criterion_main!(benches);

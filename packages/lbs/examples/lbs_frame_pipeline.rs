//! Example modeling one frame of a render pipeline as a small dependency graph.
//!
//! Culling and animation run as parallel ranges, command recording waits for both, and the
//! caller blocks until the frame has been submitted.

#![expect(
    clippy::arithmetic_side_effects,
    reason = "this is example code that does not need production-level safety"
)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use lbs::{Requirements, Scheduler, TaskDesc};
use new_zealand::nz;

const OBJECT_COUNT: usize = 50_000;

fn main() {
    let scheduler = Scheduler::new();
    let visible = Arc::new(AtomicUsize::new(0));
    let animated = Arc::new(AtomicUsize::new(0));

    println!("Running on {} worker threads", scheduler.thread_count());

    // Submitted first, parked until its requirements are fulfilled.
    let visible_clone = Arc::clone(&visible);
    let animated_clone = Arc::clone(&animated);
    scheduler.add_described_task(
        &TaskDesc::new("record").pre(["cull", "animate"]),
        move |_, worker| {
            println!(
                "Recording {} visible and {} animated objects on worker {worker}",
                visible_clone.load(Ordering::Relaxed),
                animated_clone.load(Ordering::Relaxed)
            );
        },
    );

    scheduler.add_task_with("submit", "record", Requirements::new(), |_, worker| {
        println!("Submitting frame on worker {worker}");
    });

    println!("Before any work is submitted:\n{}", scheduler.pending_report());

    let visible_clone = Arc::clone(&visible);
    scheduler.add_parallel_for(
        "cull",
        Requirements::new(),
        Requirements::new(),
        0..OBJECT_COUNT,
        nz!(256),
        move |object, _| {
            if object % 3 != 0 {
                visible_clone.fetch_add(1, Ordering::Relaxed);
            }
        },
    );

    let animated_clone = Arc::clone(&animated);
    scheduler.add_parallel_for(
        "animate",
        Requirements::new(),
        Requirements::new(),
        0..OBJECT_COUNT,
        nz!(1024),
        move |object, _| {
            if object % 10 == 0 {
                animated_clone.fetch_add(1, Ordering::Relaxed);
            }
        },
    );

    scheduler.sleep_till_keywords("submit");

    let stats = scheduler.stats();
    println!(
        "Frame done: {} tasks, {} splits, {} steals",
        stats.tasks_finished, stats.splits, stats.steals
    );
}

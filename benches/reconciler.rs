//! Reconciler throughput on snapshot sizes seen during polling.
//!
//! - unchanged snapshot (the common case while a run is idle)
//! - one changed run among many
//! - appending a streamed batch of turns to a long transcript

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};

use testflow::domain::models::{ConversationTurn, RunStatus, TestRun, TurnRole};
use testflow::services::reconciler::{collect, merge_runs, merge_turns};

fn generate_runs(count: usize) -> Vec<TestRun> {
    (0..count)
        .map(|i| {
            let passed = u32::try_from(i % 40).unwrap_or(0);
            TestRun::new(format!("run-{i}"))
                .with_counts(passed + 2, passed, 2)
                .with_status(RunStatus::Completed)
        })
        .collect()
}

fn generate_turns(from: i64, count: i64) -> Vec<ConversationTurn> {
    (from..from + count)
        .map(|i| {
            let ts = Utc.timestamp_opt(1_700_000_000 + i, 0).unwrap();
            ConversationTurn::new(ts, TurnRole::Assistant, format!("turn {i}"))
        })
        .collect()
}

fn bench_merge_runs(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_runs");

    for size in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(size as u64));
        let held = collect(generate_runs(size));

        group.bench_with_input(BenchmarkId::new("unchanged", size), &size, |b, &size| {
            b.iter_batched(
                || collect(generate_runs(size)),
                |incoming| black_box(merge_runs(&held, incoming)),
                BatchSize::SmallInput,
            );
        });

        group.bench_with_input(BenchmarkId::new("one_changed", size), &size, |b, &size| {
            b.iter_batched(
                || {
                    let mut runs = generate_runs(size);
                    runs[size / 2].status = RunStatus::Running;
                    collect(runs)
                },
                |incoming| black_box(merge_runs(&held, incoming)),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_merge_turns(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_turns");

    for held_len in [50i64, 500] {
        let held = collect(generate_turns(0, held_len));
        // overlapping replay: the last 10 known turns plus 5 new ones
        let incoming = collect(generate_turns(held_len - 10, 15));

        group.bench_with_input(BenchmarkId::new("append", held_len), &held_len, |b, _| {
            b.iter(|| black_box(merge_turns(&held, Arc::clone(&incoming))));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_merge_runs, bench_merge_turns);
criterion_main!(benches);

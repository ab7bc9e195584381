//! Benchmarks for clocks, scheduling and catch-up

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use syncstream_core::Timestamp;
use syncstream_runtime::{ChannelFunction, StreamConfig, StreamProcess, VecSink};
use syncstream_time::{
    BoundaryPolicy, CatchUpPolicy, ClockSource, LookaheadScheduler, ManualClock, PolicyConfig,
    SchedulerConfig,
};

fn bench_nominal_timestamp(c: &mut Criterion) {
    let clock = ClockSource::synchronized(500.0, Timestamp(1000.0)).unwrap();

    c.bench_function("nominal_timestamp", |b| {
        let mut n = 0u64;
        b.iter(|| {
            n = n.wrapping_add(1);
            clock.nominal(black_box(n))
        })
    });
}

fn bench_scheduler_poll(c: &mut Criterion) {
    let wall = ManualClock::new(0.0);

    c.bench_function("scheduler_poll", |b| {
        let clock = ClockSource::synchronized(500.0, Timestamp(0.0)).unwrap();
        let config = SchedulerConfig::for_rate(500.0, Duration::from_millis(10), Duration::from_millis(200));
        let mut scheduler = LookaheadScheduler::new(clock, config).unwrap();
        scheduler.resume_at(Timestamp(0.0), BoundaryPolicy::Nearest);
        b.iter(|| {
            let due = scheduler.state().next_due_time.unwrap_or(Timestamp(0.0));
            black_box(scheduler.poll(due, &wall))
        })
    });
}

fn bench_burst_replay(c: &mut Criterion) {
    let wall = ManualClock::new(0.0);
    let mut group = c.benchmark_group("burst_replay");

    for missing in [10u64, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(missing), &missing, |b, &missing| {
            b.iter(|| {
                let clock = ClockSource::synchronized(500.0, Timestamp(0.0)).unwrap();
                let config = SchedulerConfig {
                    latency_budget: Duration::from_millis(200),
                    batch_size: 5,
                };
                let mut scheduler = LookaheadScheduler::new(clock, config).unwrap();
                scheduler.resume_at(Timestamp(0.0), BoundaryPolicy::Nearest);
                black_box(scheduler.replay(0..=missing, &wall))
            })
        });
    }
    group.finish();
}

fn bench_reconcile(c: &mut Criterion) {
    let clock = ClockSource::synchronized(500.0, Timestamp(0.0)).unwrap();
    let policy = CatchUpPolicy::new(PolicyConfig::default());
    let mut scheduler = LookaheadScheduler::new(clock.clone(), SchedulerConfig::default()).unwrap();
    scheduler.resume_at(Timestamp(0.0), BoundaryPolicy::Nearest);

    c.bench_function("reconcile_late", |b| {
        b.iter(|| {
            policy.reconcile(
                &clock,
                black_box(Timestamp(3.0)),
                black_box(Timestamp(4.0)),
                scheduler.position(),
            )
        })
    });
}

fn bench_process_tick(c: &mut Criterion) {
    let wall = Arc::new(ManualClock::new(0.0));
    let config = StreamConfig {
        origin: Some(Timestamp(0.0)),
        auto_start: true,
        functions: ChannelFunction::ALL.to_vec(),
        ..StreamConfig::synchronized(500.0, 30)
    };
    let sink = VecSink::new();
    let mut process = StreamProcess::new(config, wall.clone(), sink.clone()).unwrap();

    c.bench_function("process_tick_500hz_30ch", |b| {
        b.iter(|| {
            wall.advance(0.01);
            let events = process.tick();
            sink.clear();
            black_box(events)
        })
    });
}

criterion_group!(
    benches,
    bench_nominal_timestamp,
    bench_scheduler_poll,
    bench_burst_replay,
    bench_reconcile,
    bench_process_tick
);
criterion_main!(benches);

//! Dispatch Performance Benchmarks
//!
//! Measures end-to-end post to listener throughput over the loopback bus and
//! the cost of listener fan-out on the event stream alone.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use sysnotify::notify::{DispatchMode, EventStream, Notification, NotifyRegistry, RegistryConfig};
use sysnotify::platform::LoopbackBus;

/// Post `count` notifications and pump until all have been dispatched
fn bench_post_to_listener_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("post_to_listener");

    for count in [100usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let bus = LoopbackBus::new();
            let registry = NotifyRegistry::with_config(
                Arc::new(bus.client()),
                RegistryConfig {
                    dispatch_mode: DispatchMode::Manual,
                },
            )
            .unwrap();
            registry.add("bench.throughput").unwrap();

            let seen = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&seen);
            registry.on("bench.throughput", move |_| {
                counter.fetch_add(1, Ordering::Relaxed);
            });

            b.iter(|| {
                let target = seen.load(Ordering::Relaxed) + count;
                for _ in 0..count {
                    registry.post("bench.throughput").unwrap();
                }
                let deadline = Instant::now() + Duration::from_secs(10);
                while seen.load(Ordering::Relaxed) < target && Instant::now() < deadline {
                    registry.pump_timeout(Duration::from_millis(10));
                }
            });
        });
    }

    group.finish();
}

/// Publish directly to the event stream with a growing listener list
fn bench_listener_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("listener_fan_out");

    for listeners in [1usize, 8, 64] {
        let events = EventStream::new();
        for _ in 0..listeners {
            events.on("bench.fanout", |n| {
                criterion::black_box(n.sequence);
            });
        }
        let notification = Notification {
            name: "bench.fanout".to_string(),
            sequence: 1,
            received_at: Utc::now(),
        };

        group.throughput(Throughput::Elements(listeners as u64));
        group.bench_with_input(BenchmarkId::from_parameter(listeners), &listeners, |b, _| {
            b.iter(|| events.publish(criterion::black_box(&notification)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_post_to_listener_throughput, bench_listener_fan_out);
criterion_main!(benches);

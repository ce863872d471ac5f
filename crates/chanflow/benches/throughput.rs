use chanflow::{buffer, Chan};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::thread;

const MSGS: u64 = 100_000;

/// Unbuffered rendezvous: every `put` blocks until a `get` arrives to take
/// it, so the put-side and get-side threads must alternate handoffs.
fn bench_unbuffered_rendezvous(c: &mut Criterion) {
    let mut group = c.benchmark_group("unbuffered");
    group.throughput(Throughput::Elements(MSGS));

    group.bench_function("put_get_handoff", |b| {
        b.iter(|| {
            let ch: Chan<u64> = Chan::unbuffered();
            let putter_ch = ch.clone();
            let putter = thread::spawn(move || {
                for i in 0..MSGS {
                    putter_ch.b_put(i).unwrap();
                }
            });

            let mut received = 0u64;
            while received < MSGS {
                if let Some(v) = ch.b_get().unwrap() {
                    black_box(v);
                    received += 1;
                }
            }
            putter.join().unwrap();
        });
    });

    group.finish();
}

/// A fixed buffer lets the put-side run ahead of the get-side up to its
/// capacity, so throughput is sensitive to how much slack the buffer gives
/// the two threads before they have to rendezvous.
fn bench_buffered_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffered");
    group.throughput(Throughput::Elements(MSGS));

    for cap in [1usize, 16, 256, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(cap), &cap, |b, &cap| {
            b.iter(|| {
                let ch: Chan<u64> = Chan::new(buffer(cap).unwrap());
                let putter_ch = ch.clone();
                let putter = thread::spawn(move || {
                    for i in 0..MSGS {
                        putter_ch.b_put(i).unwrap();
                    }
                });

                let mut received = 0u64;
                while received < MSGS {
                    if let Some(v) = ch.b_get().unwrap() {
                        black_box(v);
                        received += 1;
                    }
                }
                putter.join().unwrap();
            });
        });
    }

    group.finish();
}

/// A single thread offering into and polling a buffer it never blocks on,
/// isolating the locking overhead from any cross-thread handoff cost.
fn bench_single_threaded_offer_poll(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_threaded");
    group.throughput(Throughput::Elements(MSGS));

    group.bench_function("offer_poll", |b| {
        b.iter(|| {
            let ch: Chan<u64> = Chan::new(buffer(4096).unwrap());
            for i in 0..MSGS {
                ch.offer(i).unwrap();
                black_box(ch.poll().unwrap());
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_unbuffered_rendezvous,
    bench_buffered_throughput,
    bench_single_threaded_offer_poll
);
criterion_main!(benches);

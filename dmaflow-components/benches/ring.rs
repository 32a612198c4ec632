// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

/// Benchmark the ring hand-off and the wire framing.
use std::io::Cursor;
use std::thread;

use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use dmaflow_components::framing::{read_frame, write_frame};
use dmaflow_components::ring::SharedRing;
use dmaflow_config::RingGeometry;

const GEOMETRY: RingGeometry = RingGeometry {
    slot_count: 8,
    slot_capacity: 65536,
};

fn commit_release(num_slots: u32) {
    let ring = SharedRing::create_anonymous(GEOMETRY).unwrap();
    let producer = ring.producer().unwrap();
    let consumer = ring.consumer().unwrap();
    for i in 0..num_slots {
        let slot = producer.try_claim_write_slot().unwrap();
        producer.commit_write(slot, i + 1);
        let slot = consumer.peek_read_slot();
        consumer.release_read_slot(slot);
    }
}

fn spsc_threads(num_slots: u32) {
    let ring = SharedRing::create_anonymous(GEOMETRY).unwrap();
    thread::scope(|scope| {
        scope.spawn(|| {
            let producer = ring.producer().unwrap();
            let mut sent = 0;
            while sent < num_slots {
                if let Some(slot) = producer.try_claim_write_slot() {
                    producer.commit_write(slot, 1);
                    sent += 1;
                } else {
                    std::hint::spin_loop();
                }
            }
        });
        let consumer = ring.consumer().unwrap();
        let mut received = 0;
        while received < num_slots {
            if consumer.has_readable() {
                consumer.release_read_slot(consumer.peek_read_slot());
                received += 1;
            } else {
                std::hint::spin_loop();
            }
        }
    });
}

fn bench_ring(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("commit_release", |b| b.iter(|| commit_release(1000)));
    group.bench_function("spsc_threads", |b| b.iter(|| spsc_threads(1000)));

    group.finish();
}

fn bench_framing(c: &mut Criterion) {
    let payload = vec![0x5a; 65000];
    let mut group = c.benchmark_group("framing");
    group.throughput(Throughput::Bytes(payload.len() as u64));

    group.bench_function("write_read_65000", |b| {
        b.iter_batched(
            || Vec::with_capacity(payload.len() + 4),
            |mut wire| {
                write_frame(&mut wire, &payload).unwrap();
                let mut received = Vec::new();
                read_frame(&mut Cursor::new(wire), &mut received, payload.len()).unwrap()
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default();
    targets = bench_ring, bench_framing
}
criterion_main!(benches);

// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The producer loop against the simulated device, with the test playing the
//! consumer.

use std::thread;
use std::time::{Duration, Instant};

use dmaflow_components::context::DeviceContext;
use dmaflow_components::fill::Producer;
use dmaflow_components::ring::SharedRing;
use dmaflow_config::{Config, FillMode, Settings};
use dmaflow_track::entity::toplevel;
use dmaflow_track::test_helpers::check_and_clear;
use dmaflow_track::test_init;
use dmaflow_track::tracker::dev_null_tracker;

const PACKET_SIZE: usize = 1000;
const DATA_BUFFER_LIMIT: u32 = 32 * 1024;
const TIMEOUT: Duration = Duration::from_millis(100);

fn settings(fill_mode: FillMode) -> Settings {
    Config {
        buffer_size: Some(1 << 20),
        slot_count: Some(4),
        slot_capacity: Some(128 * 1024),
        fill_mode: Some(fill_mode),
        max_packet_size: Some(65_000),
        data_buffer_limit: Some(DATA_BUFFER_LIMIT),
        timeout_ms: Some(TIMEOUT.as_millis() as u64),
        polling_period_us: Some(100),
        simulate: Some(true),
        ..Config::default()
    }
    .resolve()
    .unwrap()
}

fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Six packets into a four slot ring whose consumer starts late.
///
/// Verifies:
///  * the producer stalls on a full ring without overwriting a slot
///  * the stall is counted as a backpressure episode
///  * once slots are released the remaining packets follow, in order
#[test]
fn full_ring_stalls_then_resumes_in_order() {
    let settings = settings(FillMode::Immediate);
    let top = toplevel(&dev_null_tracker(), "test");
    let device = DeviceContext::open(&top, &settings).unwrap();
    device.configure().unwrap();
    let simulator = device.simulator().unwrap().clone();
    for fill in 1..=6u8 {
        simulator.inject(vec![fill; PACKET_SIZE]);
    }

    let ring = SharedRing::create_anonymous(settings.ring).unwrap();
    let geometry = ring.geometry();

    let report = thread::scope(|scope| {
        let handle =
            scope.spawn(|| Producer::new(&top, &device, ring.producer()?, &settings).run());

        wait_until("a full ring", || ring.committed_bytes() == 4 * PACKET_SIZE as u64);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(ring.committed_bytes(), 4 * PACKET_SIZE as u64);
        assert_eq!(simulator.pending_bytes(), 2 * PACKET_SIZE);

        let consumer = ring.consumer().unwrap();
        for fill in 1..=6u8 {
            wait_until("a readable slot", || consumer.has_readable());
            let slot = consumer.peek_read_slot();
            let length = ring.slot_length(slot) as usize;
            let bytes = device
                .s2mm_memory()
                .bytes(geometry.slot_offset(slot), length)
                .unwrap();
            assert_eq!(bytes, vec![fill; PACKET_SIZE].as_slice());
            consumer.release_read_slot(slot);
        }

        ring.control().request_fill_stop();
        handle.join().unwrap().unwrap()
    });

    assert_eq!(report.committed_slots, 6);
    assert_eq!(report.committed_bytes, 6 * PACKET_SIZE as u64);
    assert!(report.backpressure_episodes >= 1);
    assert_eq!(simulator.pending_bytes(), 0);
    assert!(!ring.has_readable());
}

/// A single packet well under the batch limit.
///
/// Verifies:
///  * the partial batch is committed once the timeout expires
///  * no stop request is needed for that
#[test]
fn timeout_commits_a_partial_batch() {
    let settings = settings(FillMode::Batched);
    let top = toplevel(&dev_null_tracker(), "test");
    let device = DeviceContext::open(&top, &settings).unwrap();
    device.configure().unwrap();
    device
        .simulator()
        .unwrap()
        .inject(vec![0x5a; PACKET_SIZE]);

    let ring = SharedRing::create_anonymous(settings.ring).unwrap();

    let start = Instant::now();
    let report = thread::scope(|scope| {
        let handle =
            scope.spawn(|| Producer::new(&top, &device, ring.producer()?, &settings).run());

        wait_until("the batch commit", || ring.committed_bytes() > 0);
        assert!(start.elapsed() >= TIMEOUT);
        assert!(!ring.fill_stop_requested());

        let consumer = ring.consumer().unwrap();
        assert!(consumer.has_readable());
        let length = ring.slot_length(consumer.peek_read_slot());
        assert_eq!(length as usize, PACKET_SIZE);
        assert!(length < DATA_BUFFER_LIMIT);

        ring.control().request_fill_stop();
        handle.join().unwrap().unwrap()
    });

    assert_eq!(report.committed_slots, 1);
    assert_eq!(report.committed_bytes, PACKET_SIZE as u64);
}

/// The producer's entity lives exactly as long as its run.
#[test]
fn producer_run_is_traced() {
    let settings = settings(FillMode::Immediate);
    let device_top = toplevel(&dev_null_tracker(), "device");
    let device = DeviceContext::open(&device_top, &settings).unwrap();
    device.configure().unwrap();
    device
        .simulator()
        .unwrap()
        .inject(vec![0x11; PACKET_SIZE]);

    let (test_tracker, tracker) = test_init!(100);
    let top = toplevel(&tracker, "test");
    let ring = SharedRing::create_anonymous(settings.ring).unwrap();

    thread::scope(|scope| {
        let handle =
            scope.spawn(|| Producer::new(&top, &device, ring.producer()?, &settings).run());
        wait_until("the commit", || ring.committed_bytes() > 0);
        ring.control().request_fill_stop();
        handle.join().unwrap().unwrap();
    });

    check_and_clear(
        &test_tracker,
        &[
            "0: created 100, test",
            "100: created 101, test::producer",
            "101:INFO: started: Immediate",
            "101: commit slot 0, 1000 bytes",
            "101: value 1000",
            "101:INFO: finished: ",
            "100: destroyed 101",
        ],
    );
}

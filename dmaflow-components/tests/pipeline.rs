// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! End-to-end runs against the simulated device.

use std::path::Path;
use std::sync::atomic::AtomicU32;

use dmaflow_components::context::DeviceContext;
use dmaflow_components::loadgen::counter_payload;
use dmaflow_components::PipelineError;
use dmaflow_components::pipeline::{Orchestrator, Workload};
use dmaflow_config::{Config, FillMode, Settings};
use dmaflow_track::entity::toplevel;
use dmaflow_track::tracker::dev_null_tracker;

const NUM_PACKETS: u32 = 10;
const PACKET_SIZE: u32 = 50_000;

fn config(output: &Path, fill_mode: FillMode, slot_capacity: u32) -> Config {
    Config {
        buffer_size: Some(1 << 20),
        slot_count: Some(4),
        slot_capacity: Some(slot_capacity),
        fill_mode: Some(fill_mode),
        max_packet_size: Some(65_000),
        data_buffer_limit: Some(100_000),
        timeout_ms: Some(200),
        polling_period_us: Some(100),
        output: Some(output.to_path_buf()),
        number_of_packets: Some(NUM_PACKETS),
        packet_size: Some(PACKET_SIZE),
        packet_period_ms: Some(1),
        simulate: Some(true),
        ..Config::default()
    }
}

fn settings(output: &Path, fill_mode: FillMode, slot_capacity: u32) -> Settings {
    config(output, fill_mode, slot_capacity).resolve().unwrap()
}

fn expected_output() -> Vec<u8> {
    counter_payload(PACKET_SIZE).repeat(NUM_PACKETS as usize)
}

/// Ten packets through a four slot ring in immediate mode.
///
/// Verifies:
///  * every byte reaches the file, in order
///  * each packet ends up in a slot of its own
#[test]
fn immediate_benchmark_delivers_every_packet() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.bin");
    let settings = settings(&output, FillMode::Immediate, 64 * 1024);

    let top = toplevel(&dev_null_tracker(), "test");
    let device = DeviceContext::open(&top, &settings).unwrap();
    assert!(device.is_simulated());
    let interrupts = AtomicU32::new(0);
    let summary = Orchestrator::new(&top, &settings, Workload::Benchmark, &interrupts)
        .run_threads(&device)
        .unwrap();

    let total = u64::from(NUM_PACKETS * PACKET_SIZE);
    assert!(!summary.interrupted);
    assert_eq!(summary.committed_bytes, total);
    assert_eq!(summary.written_bytes, total);
    assert_eq!(summary.load.unwrap().packets, u64::from(NUM_PACKETS));
    assert_eq!(summary.producer.unwrap().committed_slots, u64::from(NUM_PACKETS));
    assert_eq!(summary.consumer.unwrap().timing.slots, u64::from(NUM_PACKETS));

    assert_eq!(std::fs::read(&output).unwrap(), expected_output());
}

/// The same traffic in batched mode: packets are coalesced and the last,
/// partial batch is flushed when the producer is stopped.
#[test]
fn batched_benchmark_flushes_the_last_batch() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.bin");
    let settings = settings(&output, FillMode::Batched, 256 * 1024);

    let top = toplevel(&dev_null_tracker(), "test");
    let device = DeviceContext::open(&top, &settings).unwrap();
    let interrupts = AtomicU32::new(0);
    let summary = Orchestrator::new(&top, &settings, Workload::Benchmark, &interrupts)
        .run_threads(&device)
        .unwrap();

    let total = u64::from(NUM_PACKETS * PACKET_SIZE);
    assert_eq!(summary.committed_bytes, total);
    assert_eq!(summary.written_bytes, total);
    let producer = summary.producer.unwrap();
    assert!(producer.committed_slots < u64::from(NUM_PACKETS));
    assert_eq!(producer.committed_bytes, total);

    assert_eq!(std::fs::read(&output).unwrap(), expected_output());
}

/// An interrupt before any traffic still stops every role cleanly.
#[test]
fn interrupted_acquisition_stops() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.bin");
    let settings = settings(&output, FillMode::Batched, 256 * 1024);

    let top = toplevel(&dev_null_tracker(), "test");
    let device = DeviceContext::open(&top, &settings).unwrap();
    let interrupts = AtomicU32::new(1);
    let summary = Orchestrator::new(&top, &settings, Workload::Acquire, &interrupts)
        .run_threads(&device)
        .unwrap();

    assert!(summary.interrupted);
    assert!(summary.load.is_none());
    assert_eq!(summary.committed_bytes, 0);
    assert_eq!(summary.written_bytes, 0);
    assert_eq!(std::fs::read(&output).unwrap(), Vec::<u8>::new());
}

/// A slow consumer keeps the ring full long after the load generator is done.
///
/// Verifies:
///  * the run waits for as long as the producer keeps capturing
///  * nothing is left behind in the FIFO
#[test]
fn slow_sink_still_receives_every_packet() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.bin");
    let settings = Config {
        timeout_ms: Some(0),
        polling_period_us: Some(600_000),
        ..config(&output, FillMode::Immediate, 64 * 1024)
    }
    .resolve()
    .unwrap();

    let top = toplevel(&dev_null_tracker(), "test");
    let device = DeviceContext::open(&top, &settings).unwrap();
    let interrupts = AtomicU32::new(0);
    let summary = Orchestrator::new(&top, &settings, Workload::Benchmark, &interrupts)
        .run_threads(&device)
        .unwrap();

    let total = u64::from(NUM_PACKETS * PACKET_SIZE);
    assert_eq!(summary.committed_bytes, total);
    assert_eq!(summary.written_bytes, total);
    assert!(summary.producer.unwrap().backpressure_episodes > 0);
    assert_eq!(device.simulator().unwrap().pending_bytes(), 0);
    assert_eq!(std::fs::read(&output).unwrap(), expected_output());
}

/// A FIFO indicator that never fires leaves the load generator's traffic
/// uncaptured, which fails the run.
#[test]
fn stalled_capture_fails_the_benchmark() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.bin");
    let settings = Config {
        fifo_threshold: Some(u32::MAX),
        ..config(&output, FillMode::Immediate, 64 * 1024)
    }
    .resolve()
    .unwrap();

    let top = toplevel(&dev_null_tracker(), "test");
    let device = DeviceContext::open(&top, &settings).unwrap();
    let interrupts = AtomicU32::new(0);
    let result = Orchestrator::new(&top, &settings, Workload::Benchmark, &interrupts)
        .run_threads(&device);

    match result {
        Err(PipelineError::CaptureStalled { captured, expected }) => {
            assert_eq!(captured, 0);
            assert_eq!(expected, u64::from(NUM_PACKETS * PACKET_SIZE));
        }
        other => panic!("expected a stalled capture, got {other:?}"),
    }
}

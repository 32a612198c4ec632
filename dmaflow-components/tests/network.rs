// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The network sink and the TCP receiver talking over loopback.

use std::io::Write;
use std::net::TcpStream;
use std::sync::atomic::AtomicU32;
use std::thread;

use dmaflow_components::PipelineError;
use dmaflow_components::context::DeviceContext;
use dmaflow_components::framing::write_frame;
use dmaflow_components::loadgen::counter_payload;
use dmaflow_components::pipeline::{Orchestrator, Workload};
use dmaflow_components::receiver::Receiver;
use dmaflow_components::sink::Sink;
use dmaflow_config::{Config, FillMode, SinkKind, SinkSettings};
use dmaflow_track::entity::toplevel;
use dmaflow_track::tracker::dev_null_tracker;

const MAX_FRAME: usize = 1 << 20;

fn network_settings(port: u16) -> SinkSettings {
    SinkSettings {
        kind: SinkKind::Network,
        output: "unused".into(),
        format: dmaflow_config::FileFormat::Binary,
        host: "127.0.0.1".to_string(),
        port,
        send_buffer: 1 << 20,
    }
}

#[test]
fn receiver_collects_frames() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("received.bin");
    let top = toplevel(&dev_null_tracker(), "test");
    let mut receiver = Receiver::bind(&top, "127.0.0.1", 0, MAX_FRAME)
        .unwrap()
        .with_output(&output)
        .unwrap();
    let port = receiver.local_addr().unwrap().port();

    let server = thread::spawn(move || receiver.serve_one());

    let mut sink = Sink::open(&network_settings(port), 4096).unwrap();
    assert_eq!(sink.to_string(), format!("tcp://127.0.0.1:{port}"));
    sink.forward(&[1, 2, 3]).unwrap();
    sink.forward(&[0xee; 4096]).unwrap();
    sink.finish().unwrap();

    let report = server.join().unwrap().unwrap();
    assert_eq!(report.frames, 2);
    assert_eq!(report.bytes, 4099);

    let mut expected = vec![1, 2, 3];
    expected.extend_from_slice(&[0xee; 4096]);
    assert_eq!(std::fs::read(&output).unwrap(), expected);
}

#[test]
fn receiver_rejects_a_truncated_frame() {
    let top = toplevel(&dev_null_tracker(), "test");
    let mut receiver = Receiver::bind(&top, "127.0.0.1", 0, MAX_FRAME).unwrap();
    let port = receiver.local_addr().unwrap().port();
    let server = thread::spawn(move || receiver.serve_one());

    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    let mut wire = Vec::new();
    write_frame(&mut wire, &[7; 100]).unwrap();
    stream.write_all(&wire[..50]).unwrap();
    drop(stream);

    let result = server.join().unwrap();
    assert!(matches!(
        result,
        Err(PipelineError::TruncatedFrame {
            expected: 100,
            received: 46
        })
    ));
}

#[test]
fn receiver_rejects_an_oversized_frame() {
    let top = toplevel(&dev_null_tracker(), "test");
    let mut receiver = Receiver::bind(&top, "127.0.0.1", 0, 4096).unwrap();
    let port = receiver.local_addr().unwrap().port();
    let server = thread::spawn(move || receiver.serve_one());

    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream.write_all(&u32::MAX.to_be_bytes()).unwrap();
    drop(stream);

    let result = server.join().unwrap();
    assert!(matches!(
        result,
        Err(PipelineError::OversizedFrame {
            length,
            limit: 4096
        }) if length == u32::MAX as usize
    ));
}

/// A network benchmark: the consumer forwards every slot as one frame.
#[test]
fn network_benchmark_reaches_the_receiver() {
    const NUM_PACKETS: u32 = 6;
    const PACKET_SIZE: u32 = 20_000;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("received.bin");
    let top = toplevel(&dev_null_tracker(), "test");
    let mut receiver = Receiver::bind(&top, "127.0.0.1", 0, MAX_FRAME)
        .unwrap()
        .with_output(&output)
        .unwrap();
    let port = receiver.local_addr().unwrap().port();
    let server = thread::spawn(move || receiver.serve_one());

    let settings = Config {
        buffer_size: Some(1 << 20),
        slot_count: Some(4),
        slot_capacity: Some(64 * 1024),
        fill_mode: Some(FillMode::Immediate),
        max_packet_size: Some(65_000),
        polling_period_us: Some(100),
        sink: Some(SinkKind::Network),
        host: Some("127.0.0.1".to_string()),
        port: Some(port),
        send_buffer: Some(1 << 20),
        number_of_packets: Some(NUM_PACKETS),
        packet_size: Some(PACKET_SIZE),
        packet_period_ms: Some(1),
        simulate: Some(true),
        ..Config::default()
    }
    .resolve()
    .unwrap();

    let device = DeviceContext::open(&top, &settings).unwrap();
    let interrupts = AtomicU32::new(0);
    let summary = Orchestrator::new(&top, &settings, Workload::BenchmarkNet, &interrupts)
        .run_threads(&device)
        .unwrap();
    let report = server.join().unwrap().unwrap();

    let total = u64::from(NUM_PACKETS * PACKET_SIZE);
    assert_eq!(summary.written_bytes, total);
    assert_eq!(report.frames, u64::from(NUM_PACKETS));
    assert_eq!(report.bytes, total);
    assert_eq!(
        std::fs::read(&output).unwrap(),
        counter_payload(PACKET_SIZE).repeat(NUM_PACKETS as usize)
    );
}

/// A consumer that cannot reach its peer stops the whole run.
#[test]
fn unreachable_sink_stops_the_producer() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let settings = Config {
        buffer_size: Some(1 << 20),
        slot_count: Some(4),
        slot_capacity: Some(64 * 1024),
        fill_mode: Some(FillMode::Immediate),
        max_packet_size: Some(65_000),
        polling_period_us: Some(100),
        sink: Some(SinkKind::Network),
        host: Some("127.0.0.1".to_string()),
        port: Some(port),
        simulate: Some(true),
        ..Config::default()
    }
    .resolve()
    .unwrap();

    let top = toplevel(&dev_null_tracker(), "test");
    let device = DeviceContext::open(&top, &settings).unwrap();
    let interrupts = AtomicU32::new(0);
    let result =
        Orchestrator::new(&top, &settings, Workload::Acquire, &interrupts).run_threads(&device);

    assert!(matches!(result, Err(PipelineError::Sink(_))));
}

// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use dmaflow_components::capture::Capture;
use dmaflow_components::context::DeviceContext;
use dmaflow_config::{Config, Settings};
use dmaflow_track::entity::toplevel;
use dmaflow_track::tracker::dev_null_tracker;

fn settings() -> Settings {
    Config {
        buffer_size: Some(1 << 20),
        slot_count: Some(4),
        slot_capacity: Some(128 * 1024),
        max_packet_size: Some(65_000),
        data_buffer_limit: Some(32 * 1024),
        simulate: Some(true),
        ..Config::default()
    }
    .resolve()
    .unwrap()
}

#[test]
fn single_transfer_saves_binary_and_text() {
    let dir = tempfile::tempdir().unwrap();
    let binary = dir.path().join("capture.bin");
    let text = dir.path().join("capture.txt");
    let top = toplevel(&dev_null_tracker(), "test");
    let device = DeviceContext::open(&top, &settings()).unwrap();
    device.configure().unwrap();

    device
        .simulator()
        .unwrap()
        .inject(vec![0xde, 0xad, 0xbe, 0xef, 0x01]);
    let never = AtomicBool::new(false);
    let mut capture = Capture::new(&top, &device, &binary, Some(&text)).unwrap();
    let report = capture.transfer(1024, &never).unwrap().unwrap();
    drop(capture);

    assert_eq!(report.bytes, 5);
    assert_eq!(
        std::fs::read(&binary).unwrap(),
        vec![0xde, 0xad, 0xbe, 0xef, 0x01]
    );
    assert_eq!(std::fs::read_to_string(&text).unwrap(), "DEADBEEF 01\n");
}

#[test]
fn cancelled_transfer_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let binary = dir.path().join("capture.bin");
    let top = toplevel(&dev_null_tracker(), "test");
    let device = DeviceContext::open(&top, &settings()).unwrap();
    device.configure().unwrap();

    let cancelled = AtomicBool::new(true);
    let mut capture = Capture::new(&top, &device, &binary, None).unwrap();
    assert_eq!(capture.transfer(1024, &cancelled).unwrap(), None);
    assert!(std::fs::read(&binary).unwrap().is_empty());
}

#[test]
fn receive_loop_appends_each_packet() {
    let dir = tempfile::tempdir().unwrap();
    let binary = dir.path().join("capture.bin");
    let top = toplevel(&dev_null_tracker(), "test");
    let device = DeviceContext::open(&top, &settings()).unwrap();
    device.configure().unwrap();
    let simulator = device.simulator().unwrap().clone();
    for fill in 1..=3u8 {
        simulator.inject(vec![fill; 400]);
    }

    let stop = AtomicBool::new(false);
    let total = thread::scope(|scope| {
        scope.spawn(|| {
            while simulator.pending_bytes() > 0 {
                thread::sleep(Duration::from_millis(1));
            }
            stop.store(true, Ordering::Release);
        });
        let mut capture = Capture::new(&top, &device, &binary, None).unwrap();
        capture
            .receive_loop(65_000, Duration::from_micros(100), &stop)
            .unwrap()
    });

    assert_eq!(total.bytes, 1200);
    let mut expected = vec![1u8; 400];
    expected.extend_from_slice(&[2; 400]);
    expected.extend_from_slice(&[3; 400]);
    assert_eq!(std::fs::read(&binary).unwrap(), expected);
}

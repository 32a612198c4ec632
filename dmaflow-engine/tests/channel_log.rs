// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Check what the channel controller reports through the tracker.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use dmaflow_engine::buffer::DmaBuffer;
use dmaflow_engine::dma::{Completion, Direction, DmaChannel};
use dmaflow_engine::region::MappedRegion;
use dmaflow_engine::registers::Registers;
use dmaflow_engine::sim::SimulatedAxiDma;
use dmaflow_track::entity::toplevel;
use dmaflow_track::test_helpers::check_and_clear;
use dmaflow_track::test_init;

fn device() -> Registers {
    let memory = |base| DmaBuffer::new(Arc::new(MappedRegion::anonymous(4096).unwrap()), base);
    Arc::new(SimulatedAxiDma::new(memory(0x1000_0000), memory(0x2000_0000)))
}

#[test]
fn configure_sequence_is_traced() {
    let (test_tracker, tracker) = test_init!(10);
    let top = toplevel(&tracker, "dev");
    let s2mm = DmaChannel::new(&top, device(), Direction::S2mm);
    check_and_clear(
        &test_tracker,
        &["0: created 10, dev", "10: created 11, dev::s2mm"],
    );

    s2mm.reset();
    s2mm.enable_all_interrupts();
    s2mm.run();
    s2mm.set_destination_address(0x2000_0000);
    check_and_clear(
        &test_tracker,
        &[
            "11:DEBUG: reset",
            "11:TRACE: write 0x30 <- 0x00000004",
            "11:DEBUG: enable all interrupts",
            "11:TRACE: write 0x30 <- 0x00007000",
            "11:DEBUG: run",
            "11:TRACE: write 0x30 <- 0x00007001",
            "11:TRACE: write 0x48 <- 0x20000000",
        ],
    );
    assert!(!s2mm.read_status().halted);
}

#[test]
fn fault_is_logged_as_an_error() {
    let (test_tracker, tracker) = test_init!(1);
    let top = toplevel(&tracker, "dev");
    let mm2s = DmaChannel::new(&top, device(), Direction::Mm2s);
    mm2s.reset();
    mm2s.run();
    check_and_clear(&test_tracker, &[".*"; 6]);

    let never = AtomicBool::new(false);
    let outcome = mm2s.transfer(0x10, 4, &never);
    assert!(outcome.is_err());
    check_and_clear(
        &test_tracker,
        &[
            "TRACE: write 0x04 <- 0x00001000",
            "TRACE: write 0x18 <- 0x00000010",
            "TRACE: write 0x28 <- 0x00000004",
            "2:ERROR: fault: halted decode-error error-irq",
        ],
    );
}

#[test]
fn completion_after_cancel_is_still_observable() {
    let (_test_tracker, tracker) = test_init!(1);
    let top = toplevel(&tracker, "dev");
    let registers = device();
    let mm2s = DmaChannel::new(&top, registers.clone(), Direction::Mm2s);
    let s2mm = DmaChannel::new(&top, registers, Direction::S2mm);
    for channel in [&mm2s, &s2mm] {
        channel.reset();
        channel.run();
    }

    let stop = AtomicBool::new(true);
    assert_eq!(
        s2mm.transfer(0x2000_0000, 256, &stop).unwrap(),
        Completion::Cancelled
    );

    let never = AtomicBool::new(false);
    mm2s.transfer(0x1000_0000, 32, &never).unwrap();
    let done = s2mm.synchronize(&never).unwrap();
    assert!(matches!(done, Completion::Done(_)));
    assert_eq!(s2mm.transfer_length(), 32);
}

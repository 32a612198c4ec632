// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Driving one channel through its control/status state machine.

use std::hint;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dmaflow_track::entity::Entity;
use dmaflow_track::{debug, error, trace};

use crate::cancel::Cancel;
use crate::dma::{CLEAR_IOC, ChannelState, Direction, control};
use crate::registers::Registers;
use crate::types::{DmaError, DmaResult};

/// Time the hardware needs after a reset before its state can be trusted.
pub const RESET_SETTLE_TIME: Duration = Duration::from_millis(100);

/// Outcome of [`DmaChannel::synchronize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The channel reported IOC and idle.
    Done(ChannelState),
    /// The cancellation source fired first; the transfer may still be armed.
    Cancelled,
}

/// Controller for one direction of an AXI DMA core.
///
/// Cheap to clone; clones drive the same registers.
#[derive(Clone)]
pub struct DmaChannel {
    entity: Arc<Entity>,
    registers: Registers,
    direction: Direction,
}

impl DmaChannel {
    #[must_use]
    pub fn new(parent: &Arc<Entity>, registers: Registers, direction: Direction) -> Self {
        Self {
            entity: parent.child(direction.name()),
            registers,
            direction,
        }
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[must_use]
    pub fn entity(&self) -> &Arc<Entity> {
        &self.entity
    }

    fn write(&self, offset: usize, value: u32) {
        trace!(self.entity ; "write {offset:#04x} <- {value:#010x}");
        self.registers.write_register(offset, value);
    }

    /// Force the channel back to halted. See [`Self::reset_and_settle`].
    pub fn reset(&self) {
        debug!(self.entity ; "reset");
        self.write(self.direction.control_offset(), control::RESET);
    }

    /// Reset and wait [`RESET_SETTLE_TIME`].
    pub fn reset_and_settle(&self) {
        self.reset();
        thread::sleep(RESET_SETTLE_TIME);
    }

    /// Set the IOC, delay and error interrupt enables, keeping the run bit.
    pub fn enable_all_interrupts(&self) {
        debug!(self.entity ; "enable all interrupts");
        let value = (self.control() & !control::RESET) | control::ENABLE_ALL_IRQ;
        self.write(self.direction.control_offset(), value);
    }

    /// Set the run bit, keeping the interrupt enables.
    pub fn run(&self) {
        debug!(self.entity ; "run");
        let value = (self.control() & !control::RESET) | control::RUN;
        self.write(self.direction.control_offset(), value);
    }

    /// Clear the run bit, keeping the interrupt enables.
    pub fn halt(&self) {
        debug!(self.entity ; "halt");
        let value = (self.control() & !(control::RESET | control::RUN)) | control::HALT;
        self.write(self.direction.control_offset(), value);
    }

    /// Acknowledge a previous completion.
    pub fn clear_ioc(&self) {
        self.write(self.direction.status_offset(), CLEAR_IOC);
    }

    /// Program the transfer address.
    pub fn set_address(&self, address: u32) {
        self.write(self.direction.address_offset(), address);
    }

    /// Program where an MM2S transfer reads from.
    pub fn set_source_address(&self, address: u32) {
        debug_assert_eq!(self.direction, Direction::Mm2s);
        self.set_address(address);
    }

    /// Program where an S2MM transfer writes to.
    pub fn set_destination_address(&self, address: u32) {
        debug_assert_eq!(self.direction, Direction::S2mm);
        self.set_address(address);
    }

    /// Program the transfer length. This starts the transfer.
    pub fn set_transfer_length(&self, num_bytes: u32) {
        self.write(self.direction.length_offset(), num_bytes);
    }

    /// Read back the length register.
    ///
    /// After an S2MM completion this is the number of bytes actually written.
    #[must_use]
    pub fn transfer_length(&self) -> u32 {
        self.registers.read_register(self.direction.length_offset())
    }

    #[must_use]
    pub fn address(&self) -> u32 {
        self.registers.read_register(self.direction.address_offset())
    }

    #[must_use]
    pub fn control(&self) -> u32 {
        self.registers.read_register(self.direction.control_offset())
    }

    #[must_use]
    pub fn read_status(&self) -> ChannelState {
        ChannelState::decode(self.registers.read_register(self.direction.status_offset()))
    }

    /// A lazy sequence of status reads.
    ///
    /// The sequence ends after the first snapshot that is complete or shows
    /// an error; combine with `take()` to bound it. Each call starts a new
    /// sequence.
    #[must_use]
    pub fn status_snapshots(&self) -> StatusSnapshots<'_> {
        StatusSnapshots {
            channel: self,
            finished: false,
        }
    }

    /// Busy-poll until the channel reports IOC and idle.
    ///
    /// Returns [`Completion::Cancelled`] if `cancel` fires first and
    /// [`DmaError::HardwareFault`] if an error bit is raised. The channel must
    /// be reset after a fault.
    pub fn synchronize(&self, cancel: &impl Cancel) -> DmaResult<Completion> {
        let last = self
            .status_snapshots()
            .inspect(|_| hint::spin_loop())
            .find(|state| state.is_complete() || state.has_error() || cancel.is_cancelled());

        match last {
            Some(state) if state.has_error() => {
                error!(self.entity ; "fault: {state}");
                Err(DmaError::HardwareFault {
                    channel: self.direction,
                    status: state.status,
                    state,
                })
            }
            Some(state) if state.is_complete() => Ok(Completion::Done(state)),
            _ => {
                debug!(self.entity ; "synchronize cancelled");
                Ok(Completion::Cancelled)
            }
        }
    }

    /// Run one transfer of `num_bytes` at `address` to completion.
    ///
    /// Any stale IOC is cleared first so that completion of this transfer is
    /// what ends the wait.
    pub fn transfer(
        &self,
        address: u32,
        num_bytes: u32,
        cancel: &impl Cancel,
    ) -> DmaResult<Completion> {
        self.clear_ioc();
        self.set_address(address);
        self.set_transfer_length(num_bytes);
        self.synchronize(cancel)
    }
}

/// Iterator returned by [`DmaChannel::status_snapshots`].
pub struct StatusSnapshots<'a> {
    channel: &'a DmaChannel,
    finished: bool,
}

impl Iterator for StatusSnapshots<'_> {
    type Item = ChannelState;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let state = self.channel.read_status();
        self.finished = state.is_complete() || state.has_error();
        Some(state)
    }
}

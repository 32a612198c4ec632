// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! An in-process model of an AXI DMA core looped back through a FIFO.
//!
//! MM2S transfers read the source buffer and push one packet into the FIFO;
//! S2MM transfers pop up to the requested number of bytes from the FIFO into
//! the destination buffer and report the actual length in the length
//! register. A GPIO view reports the FIFO fill level the way the hardware
//! design does.
//!
//! Only the behaviour the channel controller relies on is modelled: control
//! codes, write-one-to-clear interrupt bits, idle/IOC completion and decode
//! errors for addresses outside the mapped buffers. Transfers complete
//! instantly; an S2MM transfer armed on an empty FIFO stays busy until data
//! arrives.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::buffer::DmaBuffer;
use crate::dma::{Direction, StatusFlags, control};
use crate::registers::RegisterAccess;

/// Size of the simulated control window.
pub const CONTROL_WINDOW_SIZE: usize = 0x100;

/// How the simulated GPIO register encodes the FIFO fill level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FifoIndicator {
    /// Number of 32-bit words waiting in the FIFO.
    WordCount,
    /// The given bits are set while the FIFO holds data.
    Flag(u32),
}

#[derive(Debug, Default)]
struct ChannelRegisters {
    control: u32,
    status: u32,
    address: u32,
    length: u32,
}

impl ChannelRegisters {
    fn halted() -> Self {
        Self {
            status: StatusFlags::HALTED.bits(),
            ..Self::default()
        }
    }

    fn is_halted(&self) -> bool {
        self.status & StatusFlags::HALTED.bits() != 0
    }

    fn complete(&mut self, num_bytes: u32) {
        self.length = num_bytes;
        self.status |= (StatusFlags::IDLE | StatusFlags::IOC_IRQ).bits();
    }

    fn fault(&mut self) {
        self.status |=
            (StatusFlags::DECODE_ERROR | StatusFlags::ERROR_IRQ | StatusFlags::HALTED).bits();
        self.status &= !StatusFlags::IDLE.bits();
    }
}

#[derive(Debug)]
struct DeviceState {
    mm2s: ChannelRegisters,
    s2mm: ChannelRegisters,
    fifo: VecDeque<Vec<u8>>,
    s2mm_armed: Option<u32>,
}

impl DeviceState {
    fn channel(&mut self, direction: Direction) -> &mut ChannelRegisters {
        match direction {
            Direction::Mm2s => &mut self.mm2s,
            Direction::S2mm => &mut self.s2mm,
        }
    }

    fn pending_bytes(&self) -> usize {
        self.fifo.iter().map(Vec::len).sum()
    }
}

/// The simulated control window of one AXI DMA core.
///
/// Share it as [`Registers`](crate::registers::Registers) with
/// `Arc<SimulatedAxiDma>`.
#[derive(Debug)]
pub struct SimulatedAxiDma {
    state: Mutex<DeviceState>,
    mm2s_memory: DmaBuffer,
    s2mm_memory: DmaBuffer,
}

impl SimulatedAxiDma {
    /// Create a device whose channels start halted and whose FIFO is empty.
    #[must_use]
    pub fn new(mm2s_memory: DmaBuffer, s2mm_memory: DmaBuffer) -> Self {
        Self {
            state: Mutex::new(DeviceState {
                mm2s: ChannelRegisters::halted(),
                s2mm: ChannelRegisters::halted(),
                fifo: VecDeque::new(),
                s2mm_armed: None,
            }),
            mm2s_memory,
            s2mm_memory,
        }
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Put a packet into the FIFO as if it had arrived on the stream input.
    pub fn inject(&self, packet: Vec<u8>) {
        let mut state = self.lock();
        if !packet.is_empty() {
            state.fifo.push_back(packet);
        }
        self.service_s2mm(&mut state);
    }

    /// Number of bytes waiting in the FIFO.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.lock().pending_bytes()
    }

    fn write_control(&self, state: &mut DeviceState, direction: Direction, value: u32) {
        if value & control::RESET != 0 {
            *state.channel(direction) = ChannelRegisters::halted();
            if direction == Direction::S2mm {
                state.s2mm_armed = None;
            }
            return;
        }

        let armed = direction == Direction::S2mm && state.s2mm_armed.is_some();
        let channel = state.channel(direction);
        channel.control = value;
        if value & control::RUN != 0 {
            channel.status &= !StatusFlags::HALTED.bits();
            if !armed {
                channel.status |= StatusFlags::IDLE.bits();
            }
        } else {
            channel.status |= StatusFlags::HALTED.bits();
        }
    }

    fn write_length(&self, state: &mut DeviceState, direction: Direction, value: u32) {
        if state.channel(direction).is_halted() {
            return;
        }
        state.channel(direction).status &= !StatusFlags::IDLE.bits();

        match direction {
            Direction::Mm2s => {
                let address = state.mm2s.address;
                let read = self
                    .mm2s_memory
                    .offset_of(address, value as usize)
                    .and_then(|offset| self.mm2s_memory.bytes(offset, value as usize));
                match read {
                    Ok(bytes) => {
                        if !bytes.is_empty() {
                            state.fifo.push_back(bytes.to_vec());
                        }
                        state.mm2s.complete(value);
                    }
                    Err(_) => state.mm2s.fault(),
                }
            }
            Direction::S2mm => state.s2mm_armed = Some(value),
        }
        self.service_s2mm(state);
    }

    fn service_s2mm(&self, state: &mut DeviceState) {
        let Some(requested) = state.s2mm_armed else {
            return;
        };
        let Some(mut packet) = state.fifo.pop_front() else {
            return;
        };
        state.s2mm_armed = None;

        let num_bytes = packet.len().min(requested as usize);
        if num_bytes < packet.len() {
            state.fifo.push_front(packet.split_off(num_bytes));
        }
        let written = self
            .s2mm_memory
            .offset_of(state.s2mm.address, num_bytes)
            .and_then(|offset| self.s2mm_memory.write_bytes(offset, &packet));
        match written {
            // `num_bytes` is bounded by `requested`, a u32.
            Ok(()) => state.s2mm.complete(num_bytes as u32),
            Err(_) => state.s2mm.fault(),
        }
    }
}

fn decode_offset(offset: usize) -> (Direction, usize) {
    assert!(
        offset % 4 == 0 && offset + 4 <= CONTROL_WINDOW_SIZE,
        "register access at {offset:#x} outside the simulated control window"
    );
    if offset >= Direction::S2mm.control_offset() {
        (Direction::S2mm, offset - Direction::S2mm.control_offset())
    } else {
        (Direction::Mm2s, offset)
    }
}

impl RegisterAccess for SimulatedAxiDma {
    fn read_register(&self, offset: usize) -> u32 {
        let (direction, register) = decode_offset(offset);
        let mut state = self.lock();
        let channel = state.channel(direction);
        match register {
            0x00 => channel.control,
            0x04 => channel.status,
            0x18 => channel.address,
            0x28 => channel.length,
            _ => 0,
        }
    }

    fn write_register(&self, offset: usize, value: u32) {
        let (direction, register) = decode_offset(offset);
        let mut state = self.lock();
        match register {
            0x00 => self.write_control(&mut state, direction, value),
            0x04 => state.channel(direction).status &= !(value & StatusFlags::IRQS.bits()),
            0x18 => state.channel(direction).address = value,
            0x28 => self.write_length(&mut state, direction, value),
            _ => {}
        }
    }
}

/// The GPIO window exposing the FIFO indicator of a [`SimulatedAxiDma`].
#[derive(Debug)]
pub struct SimulatedGpio {
    device: Arc<SimulatedAxiDma>,
    fifo_register: usize,
    size: usize,
    indicator: FifoIndicator,
}

impl SimulatedGpio {
    #[must_use]
    pub fn new(
        device: Arc<SimulatedAxiDma>,
        fifo_register: usize,
        size: usize,
        indicator: FifoIndicator,
    ) -> Self {
        Self {
            device,
            fifo_register,
            size,
            indicator,
        }
    }
}

impl RegisterAccess for SimulatedGpio {
    fn read_register(&self, offset: usize) -> u32 {
        assert!(
            offset % 4 == 0 && offset + 4 <= self.size,
            "register access at {offset:#x} outside the simulated GPIO window"
        );
        if offset != self.fifo_register {
            return 0;
        }
        let pending = self.device.pending_bytes();
        match self.indicator {
            FifoIndicator::WordCount => u32::try_from(pending.div_ceil(4)).unwrap_or(u32::MAX),
            FifoIndicator::Flag(mask) if pending > 0 => mask,
            FifoIndicator::Flag(_) => 0,
        }
    }

    fn write_register(&self, offset: usize, _value: u32) {
        assert!(
            offset % 4 == 0 && offset + 4 <= self.size,
            "register access at {offset:#x} outside the simulated GPIO window"
        );
    }
}

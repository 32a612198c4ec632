// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The AXI DMA channel controller.
//!
//! One AXI DMA core exposes two independent channels in the same control
//! window: MM2S (memory to stream, host to device) at offset `0x00` and S2MM
//! (stream to memory, device to host) at offset `0x30`. Each channel has the
//! same four registers at the same relative offsets.
//!
//! | Register | MM2S   | S2MM   |
//! |----------|--------|--------|
//! | control  | `0x00` | `0x30` |
//! | status   | `0x04` | `0x34` |
//! | address  | `0x18` | `0x48` |
//! | length   | `0x28` | `0x58` |
//!
//! Writing the length register starts a transfer.

use std::fmt;

mod channel;
mod status;

pub use channel::{Completion, DmaChannel, RESET_SETTLE_TIME, StatusSnapshots};
pub use status::{ChannelState, StatusFlags};

/// Control register codes.
pub mod control {
    pub const HALT: u32 = 0x0;
    pub const RUN: u32 = 0x1;
    pub const RESET: u32 = 0x4;
    pub const ENABLE_ALL_IRQ: u32 = 0x7000;
}

/// Written to the status register to acknowledge a completion.
pub const CLEAR_IOC: u32 = 0x1000;

const CONTROL: usize = 0x00;
const STATUS: usize = 0x04;
const ADDRESS: usize = 0x18;
const LENGTH: usize = 0x28;

/// One of the two channels of an AXI DMA core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Memory to stream (host to device).
    Mm2s,
    /// Stream to memory (device to host).
    S2mm,
}

impl Direction {
    const fn base(self) -> usize {
        match self {
            Direction::Mm2s => 0x00,
            Direction::S2mm => 0x30,
        }
    }

    #[must_use]
    pub const fn control_offset(self) -> usize {
        self.base() + CONTROL
    }

    #[must_use]
    pub const fn status_offset(self) -> usize {
        self.base() + STATUS
    }

    /// Source address for MM2S, destination address for S2MM.
    #[must_use]
    pub const fn address_offset(self) -> usize {
        self.base() + ADDRESS
    }

    #[must_use]
    pub const fn length_offset(self) -> usize {
        self.base() + LENGTH
    }

    /// Lower-case name used for entities and command-line values.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Direction::Mm2s => "mm2s",
            Direction::S2mm => "s2mm",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Mm2s => write!(f, "MM2S"),
            Direction::S2mm => write!(f, "S2MM"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_map() {
        assert_eq!(Direction::Mm2s.control_offset(), 0x00);
        assert_eq!(Direction::Mm2s.status_offset(), 0x04);
        assert_eq!(Direction::Mm2s.address_offset(), 0x18);
        assert_eq!(Direction::Mm2s.length_offset(), 0x28);
        assert_eq!(Direction::S2mm.control_offset(), 0x30);
        assert_eq!(Direction::S2mm.status_offset(), 0x34);
        assert_eq!(Direction::S2mm.address_offset(), 0x48);
        assert_eq!(Direction::S2mm.length_offset(), 0x58);
    }
}

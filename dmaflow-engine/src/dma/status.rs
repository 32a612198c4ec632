// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Decoding of the channel status register.

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// Bits of the MM2S/S2MM status register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusFlags: u32 {
        const HALTED = 0x0000_0001;
        const IDLE = 0x0000_0002;
        const INTERNAL_ERROR = 0x0000_0010;
        const SLAVE_ERROR = 0x0000_0020;
        const DECODE_ERROR = 0x0000_0040;
        const IOC_IRQ = 0x0000_1000;
        const DELAY_IRQ = 0x0000_2000;
        const ERROR_IRQ = 0x0000_4000;
    }
}

impl StatusFlags {
    /// Error bits that leave the channel halted until it is reset.
    pub const ERRORS: Self = Self::INTERNAL_ERROR
        .union(Self::SLAVE_ERROR)
        .union(Self::DECODE_ERROR);

    /// All interrupt bits (write-one-to-clear in the status register).
    pub const IRQS: Self = Self::IOC_IRQ.union(Self::DELAY_IRQ).union(Self::ERROR_IRQ);
}

/// A decoded snapshot of one status register read.
///
/// Never stored by the channel; every read produces a fresh one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelState {
    pub halted: bool,
    pub idle: bool,
    pub internal_error: bool,
    pub slave_error: bool,
    pub decode_error: bool,
    pub ioc_interrupt: bool,
    pub delay_interrupt: bool,
    pub error_interrupt: bool,

    /// The raw register value.
    pub status: u32,
}

impl ChannelState {
    #[must_use]
    pub fn decode(status: u32) -> Self {
        let flags = StatusFlags::from_bits_retain(status);
        Self {
            halted: flags.contains(StatusFlags::HALTED),
            idle: flags.contains(StatusFlags::IDLE),
            internal_error: flags.contains(StatusFlags::INTERNAL_ERROR),
            slave_error: flags.contains(StatusFlags::SLAVE_ERROR),
            decode_error: flags.contains(StatusFlags::DECODE_ERROR),
            ioc_interrupt: flags.contains(StatusFlags::IOC_IRQ),
            delay_interrupt: flags.contains(StatusFlags::DELAY_IRQ),
            error_interrupt: flags.contains(StatusFlags::ERROR_IRQ),
            status,
        }
    }

    #[must_use]
    pub fn flags(&self) -> StatusFlags {
        StatusFlags::from_bits_retain(self.status)
    }

    /// True when an internal, slave or decode error is flagged.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.internal_error || self.slave_error || self.decode_error
    }

    /// The completion condition: IOC raised and the channel idle.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.ioc_interrupt && self.idle
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (self.halted, "halted"),
            (self.idle, "idle"),
            (self.internal_error, "internal-error"),
            (self.slave_error, "slave-error"),
            (self.decode_error, "decode-error"),
            (self.ioc_interrupt, "ioc-irq"),
            (self.delay_interrupt, "delay-irq"),
            (self.error_interrupt, "error-irq"),
        ];
        let mut first = true;
        for (_, name) in names.iter().filter(|(set, _)| *set) {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{name}")?;
            first = false;
        }
        if first {
            write!(f, "running")?;
        }
        Ok(())
    }
}

// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The "packets pending" indicator read from the GPIO window.

use dmaflow_config::{TriggerKind, TriggerSettings};
use dmaflow_engine::Registers;

/// Decides from the FIFO indicator register whether a transfer is worth
/// issuing.
#[derive(Clone)]
pub struct FifoTrigger {
    gpio: Registers,
    register: usize,
    settings: TriggerSettings,
}

impl FifoTrigger {
    #[must_use]
    pub fn new(gpio: Registers, register: usize, settings: TriggerSettings) -> Self {
        Self {
            gpio,
            register,
            settings,
        }
    }

    /// The raw indicator word.
    #[must_use]
    pub fn word(&self) -> u32 {
        self.gpio.read_register(self.register)
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        pending(self.settings, self.word())
    }
}

fn pending(settings: TriggerSettings, word: u32) -> bool {
    match settings.kind {
        TriggerKind::Count => word > settings.threshold,
        TriggerKind::Mask => word & settings.mask != 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_is_strictly_above_threshold() {
        let settings = TriggerSettings {
            kind: TriggerKind::Count,
            threshold: 10,
            mask: 0x1,
        };
        assert!(!pending(settings, 10));
        assert!(pending(settings, 11));
    }

    #[test]
    fn mask_tests_any_bit() {
        let settings = TriggerSettings {
            kind: TriggerKind::Mask,
            threshold: 10,
            mask: 0x5,
        };
        assert!(!pending(settings, 0x2));
        assert!(pending(settings, 0x4));
        assert!(pending(settings, 0x100_0001));
    }
}

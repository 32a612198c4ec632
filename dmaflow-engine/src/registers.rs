// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Access to 32-bit device registers.

use std::sync::Arc;

use crate::region::MappedRegion;

/// A window of 32-bit registers addressed by byte offset.
///
/// Implemented by real mappings and by the simulated device so that the
/// channel controller cannot tell them apart.
pub trait RegisterAccess: Send + Sync {
    /// Read the register at `offset`.
    ///
    /// # Panics
    ///
    /// Implementations panic on an offset outside the window.
    fn read_register(&self, offset: usize) -> u32;

    /// Write `value` to the register at `offset`.
    ///
    /// # Panics
    ///
    /// Implementations panic on an offset outside the window.
    fn write_register(&self, offset: usize, value: u32);
}

impl RegisterAccess for MappedRegion {
    fn read_register(&self, offset: usize) -> u32 {
        self.read_u32(offset)
    }

    fn write_register(&self, offset: usize, value: u32) {
        self.write_u32(offset, value);
    }
}

impl<T: RegisterAccess + ?Sized> RegisterAccess for Arc<T> {
    fn read_register(&self, offset: usize) -> u32 {
        (**self).read_register(offset)
    }

    fn write_register(&self, offset: usize, value: u32) {
        (**self).write_register(offset, value);
    }
}

/// A shared, type-erased register window.
pub type Registers = Arc<dyn RegisterAccess>;

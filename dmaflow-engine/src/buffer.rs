// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! DDR buffers that the DMA engine reads from or writes to.

use std::sync::Arc;

use crate::region::MappedRegion;
use crate::types::{DmaError, DmaResult};

/// A mapped DDR buffer together with the physical address the DMA engine
/// uses for its first byte.
#[derive(Debug, Clone)]
pub struct DmaBuffer {
    region: Arc<MappedRegion>,
    physical_base: u64,
}

impl DmaBuffer {
    #[must_use]
    pub fn new(region: Arc<MappedRegion>, physical_base: u64) -> Self {
        Self {
            region,
            physical_base,
        }
    }

    /// Map `len` bytes of DDR at `physical_base` through `device`.
    pub fn open(device: &std::path::Path, physical_base: u64, len: usize) -> DmaResult<Self> {
        let region = MappedRegion::open_device(device, physical_base, len)?;
        Ok(Self::new(Arc::new(region), physical_base))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.region.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    #[must_use]
    pub fn physical_base(&self) -> u64 {
        self.physical_base
    }

    /// The 32-bit DMA address of the byte at `offset`.
    pub fn dma_address(&self, offset: usize) -> DmaResult<u32> {
        self.region.check("dma address", offset, 0)?;
        let address = self.physical_base + offset as u64;
        u32::try_from(address).map_err(|_| DmaError::OutOfWindow {
            what: "dma address",
            offset: address,
            len: 0,
            size: u64::from(u32::MAX) + 1,
        })
    }

    /// Translate a DMA address back to an offset in this buffer, checking
    /// that `len` bytes fit.
    pub fn offset_of(&self, address: u32, len: usize) -> DmaResult<usize> {
        let out_of_window = || DmaError::OutOfWindow {
            what: "dma address",
            offset: u64::from(address),
            len: len as u64,
            size: self.len() as u64,
        };
        let offset = u64::from(address)
            .checked_sub(self.physical_base)
            .ok_or_else(out_of_window)?;
        let offset = usize::try_from(offset).map_err(|_| out_of_window())?;
        self.region.check("dma address", offset, len)?;
        Ok(offset)
    }

    pub fn bytes(&self, offset: usize, len: usize) -> DmaResult<&[u8]> {
        self.region.bytes(offset, len)
    }

    pub fn write_bytes(&self, offset: usize, data: &[u8]) -> DmaResult<()> {
        self.region.write_bytes(offset, data)
    }
}

// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

#![doc(test(attr(warn(unused))))]

//! Register-level control of an FPGA-resident AXI DMA core.
//!
//! The layers, from the bottom up:
//!
//!  - [`region`]: `MAP_SHARED` mappings of physical memory windows and of
//!    shared files.
//!  - [`registers`]: the [`RegisterAccess`] trait through which every 32-bit
//!    register is read and written.
//!  - [`buffer`]: DDR buffers with their DMA (physical) addresses.
//!  - [`dma`]: the [`DmaChannel`] controller for one direction of a core and
//!    the decoding of its status register.
//!  - [`sim`]: a simulated core so that everything above can run without an
//!    FPGA.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//!
//! use dmaflow_engine::buffer::DmaBuffer;
//! use dmaflow_engine::dma::{Completion, DmaChannel, Direction};
//! use dmaflow_engine::region::MappedRegion;
//! use dmaflow_engine::registers::Registers;
//! use dmaflow_engine::sim::SimulatedAxiDma;
//!
//! let tracker = dmaflow_track::tracker::dev_null_tracker();
//! let top = dmaflow_track::entity::toplevel(&tracker, "top");
//!
//! let memory = |base| DmaBuffer::new(Arc::new(MappedRegion::anonymous(4096).unwrap()), base);
//! let device: Registers = Arc::new(SimulatedAxiDma::new(memory(0x1000_0000), memory(0x2000_0000)));
//! let s2mm = DmaChannel::new(&top, device.clone(), Direction::S2mm);
//! s2mm.reset();
//! s2mm.run();
//! assert!(!s2mm.read_status().halted);
//!
//! let never = AtomicBool::new(false);
//! let mm2s = DmaChannel::new(&top, device, Direction::Mm2s);
//! mm2s.reset();
//! mm2s.run();
//! let done = mm2s.transfer(0x1000_0000, 64, &never).unwrap();
//! assert!(matches!(done, Completion::Done(_)));
//! ```

pub mod buffer;
pub mod cancel;
pub mod dma;
pub mod region;
pub mod registers;
pub mod sim;
pub mod types;

pub use cancel::Cancel;
pub use dma::{ChannelState, Completion, Direction, DmaChannel};
pub use registers::{RegisterAccess, Registers};
pub use types::{DmaError, DmaResult};

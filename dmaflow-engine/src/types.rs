// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Shared types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::dma::{ChannelState, Direction};

/// Errors raised while talking to the DMA engine or its memory windows.
#[derive(Debug, Error)]
pub enum DmaError {
    /// A channel reported an internal, slave or decode error.
    ///
    /// The engine is not recovered automatically; the channel has to be reset.
    #[error("{channel} channel fault (status {status:#010x}): {state}")]
    HardwareFault {
        channel: Direction,
        status: u32,
        state: ChannelState,
    },

    /// Mapping a window of physical memory (or of a shared file) failed.
    #[error("failed to map {len:#x} bytes of {} at {offset:#x}: {source}", .path.display())]
    Map {
        path: PathBuf,
        offset: u64,
        len: usize,
        #[source]
        source: io::Error,
    },

    /// An access does not fit in the window it is made through.
    #[error("{what}: {len:#x} bytes at {offset:#x} do not fit in a {size:#x} byte window")]
    OutOfWindow {
        what: &'static str,
        offset: u64,
        len: u64,
        size: u64,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The return type of fallible DMA operations.
pub type DmaResult<T> = Result<T, DmaError>;

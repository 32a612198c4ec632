// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Shared types.

use std::io;

use dmaflow_config::ConfigError;
use dmaflow_engine::DmaError;
use dmaflow_track::TrackConfigError;
use thiserror::Error;

/// Errors raised by the pipeline roles and their orchestration.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Dma(#[from] DmaError),

    /// Writing to the file or network sink failed.
    #[error("sink failed: {0}")]
    Sink(#[source] io::Error),

    /// The shared ring could not be created or attached, or a role is
    /// already taken.
    #[error("ring buffer: {0}")]
    Ring(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Track(#[from] TrackConfigError),

    /// A role (thread or process) did not complete.
    #[error("{role} failed: {reason}")]
    Worker { role: String, reason: String },

    /// The producer stopped making progress before capturing every byte the
    /// load generator emitted.
    #[error("capture stalled after {captured} of {expected} bytes")]
    CaptureStalled { captured: u64, expected: u64 },

    /// A frame header announced more bytes than the receiver accepts.
    #[error("frame of {length} bytes exceeds the {limit} byte limit")]
    OversizedFrame { length: usize, limit: usize },

    /// A frame ended before its announced length.
    #[error("truncated frame: expected {expected} bytes, received {received}")]
    TruncatedFrame { expected: usize, received: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The return type of the pipeline functions.
pub type PipelineResult<T> = Result<T, PipelineError>;

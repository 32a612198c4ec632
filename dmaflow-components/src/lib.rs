// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The streaming pipeline built on top of `dmaflow-engine`.
//!
//! Data flows from the FPGA FIFO through the S2MM channel into slots of a
//! [`ring::SharedRing`], and from there to a file or a TCP peer:
//!
//! ```text
//!   FIFO --S2MM--> slot --[Producer]--> ring --[Consumer]--> Sink
//! ```
//!
//! The [`fill::Producer`] decides when a slot is handed over, the
//! [`drain::Consumer`] forwards slots in commit order, and the
//! [`pipeline::Orchestrator`] starts and stops the roles (and the
//! [`loadgen::LoadGenerator`] for benchmarks) either as threads or as worker
//! processes.
//!
//! Each process owns a single [`context::DeviceContext`] holding its register
//! windows and buffer mappings.

pub mod capture;
pub mod context;
pub mod drain;
pub mod fill;
pub mod framing;
pub mod loadgen;
pub mod pipeline;
pub mod receiver;
pub mod report;
pub mod ring;
pub mod sink;
pub mod trigger;
pub mod types;

pub use types::{PipelineError, PipelineResult};

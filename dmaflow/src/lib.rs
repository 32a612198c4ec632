// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The `dmaflow` command-line front end.
//!
//! All options of [`dmaflow_config::Config`] are accepted by every
//! subcommand, and can also be given through a TOML file (`--conf-file`) or
//! `DMAFLOW_*` environment variables. Add `--simulate` to run any command
//! against the in-process simulated DMA device.

pub mod cli;
pub mod commands;
pub mod logging;

pub use commands::run;

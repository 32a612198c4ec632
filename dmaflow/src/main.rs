// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Stream data out of FPGA AXI DMA engines.
//!
//! See `lib.rs` for details.

use clap::Parser;
use color_eyre::Result;
use dmaflow::cli::Cli;

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    dmaflow::run(cli)
}

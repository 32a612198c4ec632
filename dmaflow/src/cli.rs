// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use dmaflow_components::pipeline::Role;
use dmaflow_config::Config;
use dmaflow_engine::Direction;

#[derive(Parser, Debug)]
#[command(
    name = "dmaflow",
    version,
    about = "Stream data out of FPGA AXI DMA engines"
)]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChannelArg {
    Mm2s,
    S2mm,
}

impl From<ChannelArg> for Direction {
    fn from(channel: ChannelArg) -> Self {
        match channel {
            ChannelArg::Mm2s => Direction::Mm2s,
            ChannelArg::S2mm => Direction::S2mm,
        }
    }
}

/// Register-level operations on one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChannelAction {
    Reset,
    Run,
    Halt,
    /// Enable all interrupts
    EnableIrq,
    /// Acknowledge a completed transfer
    ClearIoc,
    /// Decode the status register and read back the other registers
    Status,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Reset, enable and start both channels and program their buffer
    /// addresses
    Configure,

    /// Show the state of both channels and the FIFO indicator
    Status,

    /// Operate on a single channel
    Channel {
        #[arg(value_enum)]
        channel: ChannelArg,

        #[arg(value_enum)]
        action: ChannelAction,
    },

    /// Receive a single S2MM transfer and save it
    Transfer {
        /// Maximum number of bytes to receive
        #[arg(long, default_value = "65000")]
        bytes: u32,

        /// Also save the bytes as hex text to this file
        #[arg(long)]
        text: Option<PathBuf>,
    },

    /// Repeat single transfers whenever the FIFO has data, until interrupted
    ReceiveLoop {
        /// Maximum number of bytes per transfer
        #[arg(long, default_value = "65000")]
        bytes: u32,

        /// Also append the bytes as hex text to this file
        #[arg(long)]
        text: Option<PathBuf>,
    },

    /// Push one packet of counter data through MM2S
    Load {
        /// Packet size in bytes
        #[arg(long, default_value = "4096")]
        bytes: u32,
    },

    /// Capture continuously into the configured sink until interrupted
    Acquire,

    /// Capture traffic from the load generator and report throughput
    Benchmark,

    /// As `benchmark`, forwarding to the network sink
    BenchmarkNet,

    /// Receive framed data from a network sink (frames longer than the slot
    /// capacity are rejected)
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0")]
        bind: String,

        /// Append received payloads to this file
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Run one pipeline role (started by `acquire` and the benchmarks)
    #[command(hide = true)]
    Worker {
        role: Role,

        /// File holding the shared ring
        #[arg(long)]
        ring: PathBuf,
    },
}

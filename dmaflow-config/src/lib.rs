// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! This crate provides the hierarchical configuration used by every dmaflow
//! command and worker process.
//!
//! Settings are accepted from several sources which are merged, in order of
//! increasing priority, using [Figment](https://docs.rs/figment):
//!
//!  1. the defaults defined by [`Config::default`],
//!  2. an optional TOML configuration file (`--conf-file`),
//!  3. environment variables prefixed with `DMAFLOW_` (e.g.
//!     `DMAFLOW_SLOT_COUNT=16`),
//!  4. command-line arguments that were explicitly given.
//!
//! Every field of [`Config`] is an `Option` so that a source which does not
//! mention a value leaves the lower-priority value in place. Once merged, the
//! configuration is validated and converted into concrete [`Settings`] by
//! [`Config::resolve`].
//!
//! # Example
//!
//! ```
//! use dmaflow_config::Config;
//!
//! let cli = Config {
//!     slot_count: Some(16),
//!     ..Config::empty()
//! };
//! let settings = Config::load(&cli).unwrap().resolve().unwrap();
//! assert_eq!(settings.ring.slot_count, 16);
//! ```

use std::path::{Path, PathBuf};

use clap::Args;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod env;
mod settings;
mod types;

pub use settings::{
    DeviceMap, FillSettings, LoadSettings, LogSettings, RingGeometry, Settings, SinkSettings,
    TriggerSettings,
};
pub use types::{FileFormat, FillMode, SinkKind, TriggerKind};

/// Prefix of the environment variables read by [`Config::load`].
pub const ENV_PREFIX: &str = "DMAFLOW_";

/// Errors raised while merging or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// One of the sources could not be parsed or did not match the schema.
    #[error("failed to merge configuration sources: {0}")]
    Figment(#[from] Box<figment::Error>),

    /// The configuration file passed with `--conf-file` does not exist.
    #[error("{} not found", .0.display())]
    ConfFileNotFound(PathBuf),

    /// The configuration file passed with `--conf-file` is a directory.
    #[error("{} is not a file path", .0.display())]
    ConfFileIsDir(PathBuf),

    /// A value was absent after all sources were merged.
    #[error("no value for '{0}'")]
    Missing(&'static str),

    /// A combination of values cannot be used.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn parse_u64(value: &str) -> Result<u64, String> {
    let cleaned = value.replace('_', "");
    let parsed = match cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => cleaned.parse::<u64>(),
    };
    parsed.map_err(|e| format!("'{value}' is not a number: {e}"))
}

fn parse_u32(value: &str) -> Result<u32, String> {
    let wide = parse_u64(value)?;
    u32::try_from(wide).map_err(|_| format!("'{value}' does not fit in 32 bits"))
}

/// All options accepted by dmaflow.
///
/// Physical offsets and sizes accept hexadecimal (`0x...`) on the command line.
#[derive(Args, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    /// Device file through which registers and DDR buffers are mapped
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<PathBuf>,

    /// Physical offset of the AXI DMA control window
    #[arg(long, global = true, value_parser = parse_u64)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dma_control_offset: Option<u64>,

    /// Size in bytes of the AXI DMA control window
    #[arg(long, global = true, value_parser = parse_u64)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dma_control_size: Option<u64>,

    /// Physical offset of the GPIO window exposing the FIFO indicator
    #[arg(long, global = true, value_parser = parse_u64)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpio_offset: Option<u64>,

    /// Size in bytes of the GPIO window
    #[arg(long, global = true, value_parser = parse_u64)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpio_size: Option<u64>,

    /// Byte offset of the FIFO indicator register within the GPIO window
    #[arg(long, global = true, value_parser = parse_u64)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fifo_register: Option<u64>,

    /// Physical address of the S2MM (device to host) DDR buffer
    #[arg(long, global = true, value_parser = parse_u64)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s2mm_buffer_offset: Option<u64>,

    /// Physical address of the MM2S (host to device) DDR buffer
    #[arg(long, global = true, value_parser = parse_u64)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mm2s_buffer_offset: Option<u64>,

    /// Size in bytes of each DDR buffer window
    #[arg(long, global = true, value_parser = parse_u64)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<u64>,

    /// Number of slots in the ring buffer
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot_count: Option<u32>,

    /// Size in bytes of the DDR region backing each ring slot
    #[arg(long, global = true, value_parser = parse_u32)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot_capacity: Option<u32>,

    /// Fill policy used by the producer
    #[arg(long, global = true, value_enum)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_mode: Option<FillMode>,

    /// Maximum number of bytes requested by a single S2MM transfer
    #[arg(long, global = true, value_parser = parse_u32)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_packet_size: Option<u32>,

    /// Batched mode commits a slot once it holds more than this many bytes
    #[arg(long, global = true, value_parser = parse_u32)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_buffer_limit: Option<u32>,

    /// Batched mode flushes a partially filled slot after this many ms
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Idle sleep of the producer and consumer loops in microseconds
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polling_period_us: Option<u64>,

    /// How the FIFO indicator register is interpreted
    #[arg(long, global = true, value_enum)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fifo_trigger: Option<TriggerKind>,

    /// Packets are pending when the FIFO word is above this count
    #[arg(long, global = true, value_parser = parse_u32)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fifo_threshold: Option<u32>,

    /// Packets are pending when the FIFO word has any of these bits set
    #[arg(long, global = true, value_parser = parse_u32)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fifo_mask: Option<u32>,

    /// Where the consumer forwards slot contents
    #[arg(long, global = true, value_enum)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sink: Option<SinkKind>,

    /// Output file of the file sink
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    /// Format written by the file sink
    #[arg(long, global = true, value_enum)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_format: Option<FileFormat>,

    /// Host of the network sink peer
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// TCP port of the network sink peer (and of the receiver)
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Socket send buffer size of the network sink in bytes
    #[arg(long, global = true, value_parser = parse_u32)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_buffer: Option<u32>,

    /// Number of packets emitted by the load generator
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_of_packets: Option<u32>,

    /// Size in bytes of each load generator packet
    #[arg(long, global = true, value_parser = parse_u32)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packet_size: Option<u32>,

    /// Dead time between load generator packets in ms
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packet_period_ms: Option<u64>,

    /// Run against the in-process simulated DMA device instead of hardware
    #[arg(long, global = true, num_args = 0..=1, default_missing_value = "true")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulate: Option<bool>,

    /// Configure the logging level for the log messages
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Regular expression selecting the entities that use the log level
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,

    /// Also append log messages to this file
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Path to an additional TOML configuration file
    #[arg(long, global = true)]
    #[serde(skip)]
    pub conf_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: Some(PathBuf::from("/dev/axi_mem")),
            dma_control_offset: Some(0xB000_0000),
            dma_control_size: Some(64 * 1024),
            gpio_offset: Some(0xA003_0000),
            gpio_size: Some(64 * 1024),
            fifo_register: Some(0x0),
            s2mm_buffer_offset: Some(0x9200_0000),
            mm2s_buffer_offset: Some(0x9000_0000),
            buffer_size: Some(32 * 1024 * 1024),
            slot_count: Some(8),
            slot_capacity: Some(4 * 1024 * 1024),
            fill_mode: Some(FillMode::Batched),
            max_packet_size: Some(65000),
            data_buffer_limit: Some(2 * 1024 * 1024),
            timeout_ms: Some(1000),
            polling_period_us: Some(1000),
            fifo_trigger: Some(TriggerKind::Count),
            fifo_threshold: Some(10),
            fifo_mask: Some(0x1),
            sink: Some(SinkKind::File),
            output: Some(PathBuf::from("output_default_file_name.bin")),
            file_format: Some(FileFormat::Binary),
            host: Some("192.168.2.1".to_string()),
            port: Some(5001),
            send_buffer: Some(4 * 1024 * 1024),
            number_of_packets: Some(100),
            packet_size: Some(50000),
            packet_period_ms: Some(10),
            simulate: Some(false),
            log_level: Some("warn".to_string()),
            log_filter: Some(String::new()),
            log_file: None,
            conf_file: None,
        }
    }
}

impl Config {
    /// A configuration with no values set.
    ///
    /// Used as the base for building command-line overrides in code.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            device: None,
            dma_control_offset: None,
            dma_control_size: None,
            gpio_offset: None,
            gpio_size: None,
            fifo_register: None,
            s2mm_buffer_offset: None,
            mm2s_buffer_offset: None,
            buffer_size: None,
            slot_count: None,
            slot_capacity: None,
            fill_mode: None,
            max_packet_size: None,
            data_buffer_limit: None,
            timeout_ms: None,
            polling_period_us: None,
            fifo_trigger: None,
            fifo_threshold: None,
            fifo_mask: None,
            sink: None,
            output: None,
            file_format: None,
            host: None,
            port: None,
            send_buffer: None,
            number_of_packets: None,
            packet_size: None,
            packet_period_ms: None,
            simulate: None,
            log_level: None,
            log_filter: None,
            log_file: None,
            conf_file: None,
        }
    }

    /// Merge all configuration sources with `cli` as the highest priority.
    ///
    /// `cli` is normally the [`Config`] parsed by clap, in which options that
    /// were not given on the command line are `None`.
    pub fn load(cli: &Config) -> Result<Config, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if let Some(conf_file) = &cli.conf_file {
            figment = figment.merge(Toml::file(checked_conf_file(conf_file)?));
        }
        figment = figment
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(cli));

        let mut config: Config = figment.extract().map_err(Box::new)?;
        config.conf_file.clone_from(&cli.conf_file);
        Ok(config)
    }
}

fn checked_conf_file(conf_file: &Path) -> Result<&Path, ConfigError> {
    if conf_file.is_dir() {
        return Err(ConfigError::ConfFileIsDir(conf_file.to_path_buf()));
    }
    if !conf_file.exists() {
        return Err(ConfigError::ConfFileNotFound(conf_file.to_path_buf()));
    }
    Ok(conf_file)
}

// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Validated, concrete settings derived from a merged [`Config`].

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::{Config, ConfigError, FileFormat, FillMode, SinkKind, TriggerKind};

/// Highest register offset used in the AXI DMA control window, plus its width.
const DMA_REGISTER_SPAN: u64 = 0x58 + 4;

/// Physical layout of the device as seen through the device file.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceMap {
    pub device: PathBuf,
    pub dma_control_offset: u64,
    pub dma_control_size: usize,
    pub gpio_offset: u64,
    pub gpio_size: usize,
    pub fifo_register: usize,
    pub s2mm_buffer_offset: u64,
    pub mm2s_buffer_offset: u64,
    pub buffer_size: usize,
}

/// Shape of the ring buffer and of the DDR regions backing its slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingGeometry {
    pub slot_count: u32,
    pub slot_capacity: u32,
}

impl RingGeometry {
    /// Byte offset of a slot's backing region from the buffer base.
    #[must_use]
    pub fn slot_offset(&self, slot: usize) -> usize {
        slot * self.slot_capacity as usize
    }

    /// Total number of buffer bytes covered by all slots.
    #[must_use]
    pub fn span(&self) -> usize {
        self.slot_count as usize * self.slot_capacity as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillSettings {
    pub mode: FillMode,
    pub max_packet_size: u32,
    pub data_buffer_limit: u32,
    pub timeout: Duration,
    pub polling_period: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerSettings {
    pub kind: TriggerKind,
    pub threshold: u32,
    pub mask: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SinkSettings {
    pub kind: SinkKind,
    pub output: PathBuf,
    pub format: FileFormat,
    pub host: String,
    pub port: u16,
    pub send_buffer: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadSettings {
    pub number_of_packets: u32,
    pub packet_size: u32,
    pub packet_period: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
    pub level: log::Level,
    pub filter: String,
    pub file: Option<PathBuf>,
}

/// Everything a dmaflow command or worker needs, fully resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub device: DeviceMap,
    pub ring: RingGeometry,
    pub fill: FillSettings,
    pub trigger: TriggerSettings,
    pub sink: SinkSettings,
    pub load: LoadSettings,
    pub log: LogSettings,
    pub simulate: bool,
}

macro_rules! required {
    ($config:expr, $field:ident) => {
        $config
            .$field
            .clone()
            .ok_or(ConfigError::Missing(stringify!($field)))?
    };
}

fn to_usize(value: u64, name: &str) -> Result<usize, ConfigError> {
    usize::try_from(value)
        .map_err(|_| ConfigError::Invalid(format!("{name} ({value}) does not fit in usize")))
}

impl Config {
    /// Validate the merged configuration and produce concrete [`Settings`].
    pub fn resolve(&self) -> Result<Settings, ConfigError> {
        let device = DeviceMap {
            device: required!(self, device),
            dma_control_offset: required!(self, dma_control_offset),
            dma_control_size: to_usize(required!(self, dma_control_size), "dma_control_size")?,
            gpio_offset: required!(self, gpio_offset),
            gpio_size: to_usize(required!(self, gpio_size), "gpio_size")?,
            fifo_register: to_usize(required!(self, fifo_register), "fifo_register")?,
            s2mm_buffer_offset: required!(self, s2mm_buffer_offset),
            mm2s_buffer_offset: required!(self, mm2s_buffer_offset),
            buffer_size: to_usize(required!(self, buffer_size), "buffer_size")?,
        };

        let ring = RingGeometry {
            slot_count: required!(self, slot_count),
            slot_capacity: required!(self, slot_capacity),
        };

        let fill = FillSettings {
            mode: required!(self, fill_mode),
            max_packet_size: required!(self, max_packet_size),
            data_buffer_limit: required!(self, data_buffer_limit),
            timeout: Duration::from_millis(required!(self, timeout_ms)),
            polling_period: Duration::from_micros(required!(self, polling_period_us)),
        };

        let trigger = TriggerSettings {
            kind: required!(self, fifo_trigger),
            threshold: required!(self, fifo_threshold),
            mask: required!(self, fifo_mask),
        };

        let sink = SinkSettings {
            kind: required!(self, sink),
            output: required!(self, output),
            format: required!(self, file_format),
            host: required!(self, host),
            port: required!(self, port),
            send_buffer: required!(self, send_buffer),
        };

        let load = LoadSettings {
            number_of_packets: required!(self, number_of_packets),
            packet_size: required!(self, packet_size),
            packet_period: Duration::from_millis(required!(self, packet_period_ms)),
        };

        let level_str: String = required!(self, log_level);
        let log = LogSettings {
            level: log::Level::from_str(&level_str)
                .map_err(|_| ConfigError::Invalid(format!("unknown log level '{level_str}'")))?,
            filter: self.log_filter.clone().unwrap_or_default(),
            file: self.log_file.clone(),
        };

        let settings = Settings {
            device,
            ring,
            fill,
            trigger,
            sink,
            load,
            log,
            simulate: self.simulate.unwrap_or(false),
        };
        settings.validate()?;
        Ok(settings)
    }
}

impl Settings {
    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if (self.device.dma_control_size as u64) < DMA_REGISTER_SPAN {
            return invalid(format!(
                "dma_control_size ({:#x}) does not cover the channel registers ({DMA_REGISTER_SPAN:#x})",
                self.device.dma_control_size
            ));
        }
        if self.device.fifo_register + 4 > self.device.gpio_size {
            return invalid(format!(
                "fifo_register ({:#x}) lies outside the GPIO window ({:#x})",
                self.device.fifo_register, self.device.gpio_size
            ));
        }
        for (name, base) in [
            ("s2mm_buffer_offset", self.device.s2mm_buffer_offset),
            ("mm2s_buffer_offset", self.device.mm2s_buffer_offset),
        ] {
            // The DMA address registers are 32 bits wide.
            if base + self.device.buffer_size as u64 > 1 << 32 {
                return invalid(format!(
                    "{name} ({base:#x}) plus buffer_size is not addressable by the DMA"
                ));
            }
        }

        if self.ring.slot_count == 0 {
            return invalid("slot_count must be at least 1".to_string());
        }
        if self.ring.slot_capacity == 0 {
            return invalid("slot_capacity must not be 0".to_string());
        }
        if self.ring.span() > self.device.buffer_size {
            return invalid(format!(
                "{} slots of {} bytes do not fit in a {} byte buffer",
                self.ring.slot_count, self.ring.slot_capacity, self.device.buffer_size
            ));
        }

        if self.fill.max_packet_size == 0 || self.fill.max_packet_size > self.ring.slot_capacity {
            return invalid(format!(
                "max_packet_size ({}) must be between 1 and slot_capacity ({})",
                self.fill.max_packet_size, self.ring.slot_capacity
            ));
        }
        if self.fill.mode == FillMode::Batched
            && u64::from(self.fill.data_buffer_limit) + u64::from(self.fill.max_packet_size)
                > u64::from(self.ring.slot_capacity)
        {
            return invalid(format!(
                "batched mode needs data_buffer_limit ({}) + max_packet_size ({}) <= slot_capacity ({})",
                self.fill.data_buffer_limit, self.fill.max_packet_size, self.ring.slot_capacity
            ));
        }

        let payload_span = (self.load.packet_size as usize).div_ceil(4) * 4;
        if self.load.packet_size == 0 || payload_span > self.device.buffer_size {
            return invalid(format!(
                "packet_size ({}) must be between 1 and buffer_size ({})",
                self.load.packet_size, self.device.buffer_size
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Config::default().resolve().unwrap();
        assert_eq!(settings.ring.slot_count, 8);
        assert_eq!(settings.ring.slot_offset(3), 3 * 4 * 1024 * 1024);
        assert_eq!(settings.fill.mode, FillMode::Batched);
        assert_eq!(settings.fill.polling_period, Duration::from_millis(1));
        assert_eq!(settings.log.level, log::Level::Warn);
        assert_eq!(settings.log.file, None);
        assert!(!settings.simulate);
    }

    #[test]
    fn batched_limit_must_leave_room_for_a_transfer() {
        let config = Config {
            slot_capacity: Some(64 * 1024),
            slot_count: Some(240),
            ..Config::default()
        };
        assert!(matches!(config.resolve(), Err(ConfigError::Invalid(_))));

        let immediate = Config {
            fill_mode: Some(FillMode::Immediate),
            ..config
        };
        assert!(immediate.resolve().is_ok());
    }

    #[test]
    fn slots_must_fit_in_buffer() {
        let config = Config {
            slot_count: Some(9),
            ..Config::default()
        };
        assert!(matches!(config.resolve(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_value_is_reported() {
        let config = Config {
            port: None,
            ..Config::default()
        };
        assert!(matches!(config.resolve(), Err(ConfigError::Missing("port"))));
    }

    #[test]
    fn unknown_log_level_is_reported() {
        let config = Config {
            log_level: Some("chatty".to_string()),
            ..Config::default()
        };
        assert!(matches!(config.resolve(), Err(ConfigError::Invalid(_))));
    }
}

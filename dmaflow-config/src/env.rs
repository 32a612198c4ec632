// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Export of a configuration as `DMAFLOW_*` environment variables.
//!
//! Worker processes are started with the merged configuration of their parent
//! in their environment so that [`Config::load`] reproduces it exactly.

use std::path::PathBuf;

use crate::{Config, ENV_PREFIX, FileFormat, FillMode, SinkKind, TriggerKind};

trait EnvValue {
    fn env_value(&self) -> Option<String>;
}

macro_rules! env_value_via_display {
    ($($type:ty),+) => {
        $(impl EnvValue for $type {
            fn env_value(&self) -> Option<String> {
                Some(self.to_string())
            }
        })+
    };
}

env_value_via_display!(u16, u32, u64, bool, FillMode, FileFormat, SinkKind, TriggerKind);

impl EnvValue for String {
    fn env_value(&self) -> Option<String> {
        // Empty values are left to the defaults.
        (!self.is_empty()).then(|| self.clone())
    }
}

impl EnvValue for PathBuf {
    fn env_value(&self) -> Option<String> {
        self.to_str().map(str::to_string)
    }
}

macro_rules! env_pairs {
    ($config:expr ; $($field:ident),+ $(,)?) => {{
        let mut pairs = Vec::new();
        $(
            if let Some(value) = $config.$field.as_ref().and_then(EnvValue::env_value) {
                pairs.push((
                    format!("{}{}", ENV_PREFIX, stringify!($field).to_uppercase()),
                    value,
                ));
            }
        )+
        pairs
    }};
}

impl Config {
    /// Return `(name, value)` pairs that recreate this configuration through
    /// the environment layer of [`Config::load`].
    #[must_use]
    pub fn to_env_vars(&self) -> Vec<(String, String)> {
        env_pairs!(self ;
            device,
            dma_control_offset,
            dma_control_size,
            gpio_offset,
            gpio_size,
            fifo_register,
            s2mm_buffer_offset,
            mm2s_buffer_offset,
            buffer_size,
            slot_count,
            slot_capacity,
            fill_mode,
            max_packet_size,
            data_buffer_limit,
            timeout_ms,
            polling_period_us,
            fifo_trigger,
            fifo_threshold,
            fifo_mask,
            sink,
            output,
            file_format,
            host,
            port,
            send_buffer,
            number_of_packets,
            packet_size,
            packet_period_ms,
            simulate,
            log_level,
            log_filter,
            log_file,
        )
    }
}

// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Closed sets of choices selected once at startup.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Policy deciding when the producer commits a ring slot.
#[derive(ValueEnum, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FillMode {
    /// Commit every hardware transfer into its own slot.
    Immediate,
    /// Accumulate transfers into one slot until a size limit or timeout.
    Batched,
}

/// Format written by the file sink.
#[derive(ValueEnum, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    /// Raw bytes, no framing.
    Binary,
    /// Upper-case hex pairs, a space after every 4 bytes, one line per write.
    Text,
}

/// Destination of the consumer.
#[derive(ValueEnum, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Append to a file.
    File,
    /// Length-framed TCP stream.
    Network,
}

/// Interpretation of the FIFO indicator register.
#[derive(ValueEnum, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// The register holds an occupancy count compared against a threshold.
    Count,
    /// The register holds flags tested against a mask.
    Mask,
}

macro_rules! display_as_lowercase {
    ($type:ty ; $($variant:ident => $name:expr),+) => {
        impl fmt::Display for $type {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let name = match self {
                    $(Self::$variant => $name,)+
                };
                f.write_str(name)
            }
        }
    };
}

display_as_lowercase!(FillMode ; Immediate => "immediate", Batched => "batched");
display_as_lowercase!(FileFormat ; Binary => "binary", Text => "text");
display_as_lowercase!(SinkKind ; File => "file", Network => "network");
display_as_lowercase!(TriggerKind ; Count => "count", Mask => "mask");

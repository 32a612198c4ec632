// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Tracker set-up from the resolved log settings.

use dmaflow_config::LogSettings;
use dmaflow_track::builder::{TrackerConfig, TrackersConfig, setup_trackers};
use dmaflow_track::{TrackConfigError, Tracker};

/// Build the stdout tracker, plus a log-file tracker when a file is set.
pub fn build_tracker(log: &LogSettings) -> Result<Tracker, TrackConfigError> {
    let file = match &log.file {
        Some(path) => Some(path.to_str().ok_or_else(|| {
            TrackConfigError(format!("log file {} is not valid UTF-8", path.display()))
        })?),
        None => None,
    };
    let config = TrackersConfig {
        stdout: TrackerConfig {
            enable: true,
            level: log.level,
            filter_regex: &log.filter,
            file: None,
        },
        log_file: TrackerConfig {
            enable: file.is_some(),
            level: log.level,
            filter_regex: &log.filter,
            file,
        },
    };
    setup_trackers(&config)
}

// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::fs;

use dmaflow_track::builder::{TrackerConfig, TrackersConfig, setup_trackers};
use dmaflow_track::entity::{Entity, toplevel};
use dmaflow_track::{Track, debug, info};

#[test]
fn file_tracker_applies_filter() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("run.log");
    let log_path_str = log_path.to_str().unwrap();

    let config = TrackersConfig {
        stdout: TrackerConfig {
            enable: false,
            ..Default::default()
        },
        log_file: TrackerConfig {
            enable: true,
            level: log::Level::Debug,
            filter_regex: ".*consumer",
            file: Some(log_path_str),
        },
    };

    {
        let tracker = setup_trackers(&config).unwrap();
        let top = toplevel(&tracker, "acquire");
        let producer = Entity::new(&top, "producer");
        let consumer = Entity::new(&top, "consumer");

        info!(producer ; "filtered out");
        debug!(consumer ; "drained slot {}", 7);
        tracker.shutdown();
    }

    let contents = fs::read_to_string(&log_path).unwrap();
    assert!(contents.contains("DEBUG: drained slot 7"));
    assert!(!contents.contains("filtered out"));
}

#[test]
fn bad_filter_is_an_error() {
    let config = TrackersConfig {
        stdout: TrackerConfig {
            enable: true,
            filter_regex: "([",
            ..Default::default()
        },
        log_file: TrackerConfig {
            enable: false,
            ..Default::default()
        },
    };
    assert!(setup_trackers(&config).is_err());
}

#[test]
fn missing_file_name_is_an_error() {
    let config = TrackersConfig {
        stdout: TrackerConfig {
            enable: false,
            ..Default::default()
        },
        log_file: TrackerConfig {
            enable: true,
            ..Default::default()
        },
    };
    assert!(setup_trackers(&config).is_err());
}

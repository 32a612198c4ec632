// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! This module provides helper functions for testing track output
//!
//! The aim of this module is to provide commonly-used functions that enable the
//! testing of the output that should appear from the tracking macros.

use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use regex::Regex;

use crate::{Id, Track};

/// A tracker that keeps track events.
pub struct TestTracker {
    events: Mutex<Vec<String>>,

    unique_id: AtomicU64,
}

impl TestTracker {
    /// Create a new [`Tracker`](crate::Tracker) for the tests.
    ///
    /// This keeps the track events in memory for checking later.
    #[must_use]
    pub fn new(initial_id: u64) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            unique_id: AtomicU64::new(initial_id),
        }
    }

    fn add_event(&self, event: String) {
        println!("{event}");
        let mut events = self
            .events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        events.push(event);
    }

    /// Return a copy of the events recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Track for TestTracker {
    fn unique_id(&self) -> Id {
        let id = self.unique_id.fetch_add(1, Ordering::SeqCst);
        Id(id)
    }

    fn is_entity_enabled(&self, _id: Id, _level: log::Level) -> bool {
        true
    }

    fn add_entity(&self, _id: Id, _entity_name: &str) {
        // Do nothing
    }

    fn create(&self, created_by: Id, id: Id, name: &str) {
        self.add_event(format!("{created_by}: created {id}, {name}"));
    }

    fn destroy(&self, destroyed_by: Id, id: Id) {
        self.add_event(format!("{destroyed_by}: destroyed {id}"));
    }

    fn commit(&self, id: Id, slot: usize, num_bytes: usize) {
        self.add_event(format!("{id}: commit slot {slot}, {num_bytes} bytes"));
    }

    fn release(&self, id: Id, slot: usize, num_bytes: usize) {
        self.add_event(format!("{id}: release slot {slot}, {num_bytes} bytes"));
    }

    fn value(&self, id: Id, value: f64) {
        self.add_event(format!("{id}: value {value}"));
    }

    fn log(&self, id: Id, level: log::Level, msg: fmt::Arguments) {
        self.add_event(format!("{id}:{level}: {msg}"));
    }

    fn shutdown(&self) {
        // Do nothing
    }
}

/// Initialise a tracker for tests
///
/// Returns both the concrete [`TestTracker`] (for checking) and the same
/// object as a [`Tracker`](crate::Tracker) (for building entities).
///
/// # Arguments
///
/// * `start_id` - The ID value to be set as the starting value
///
/// # Examples
///
/// ```
/// use dmaflow_track::test_helpers;
///
/// let (test_tracker, tracker) = dmaflow_track::test_init!(10);
/// let top = dmaflow_track::entity::toplevel(&tracker, "top");
/// test_helpers::check_and_clear(&test_tracker, &["0: created 10, top"]);
/// ```
#[macro_export]
macro_rules! test_init {
    ($start_id:expr) => {{
        let test_tracker = std::sync::Arc::new($crate::test_helpers::TestTracker::new($start_id));
        let tracker: $crate::Tracker = test_tracker.clone();
        (test_tracker, tracker)
    }};
}

/// Check and clear the _trace_ and _log_ output
///
/// This function asserts that the lines seen since the start or the last time
/// this function was called match the expected regular expressions, then
/// clears the recorded events.
///
/// # Arguments
///
/// * `tracker`  - A reference to the [`TestTracker`] being used in the test.
/// * `expected` - An array of expected regular expressions that the output will
///   be matched against.
pub fn check_and_clear(tracker: &TestTracker, expected: &[&str]) {
    let mut log_contents_ref = tracker
        .events
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    println!("Checking {:?} matches {:?}", expected, *log_contents_ref);

    assert_eq!(expected.len(), log_contents_ref.len());

    for (i, (log_expect, actual)) in expected.iter().zip(log_contents_ref.iter()).enumerate() {
        let re = Regex::new(log_expect).unwrap();
        println!("Checking {i}: {log_expect:?} matches {actual:?}");
        assert!(re.is_match(actual));
    }

    log_contents_ref.clear();
}

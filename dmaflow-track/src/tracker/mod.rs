// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Define the [`Track`] trait a number of [`Tracker`]s.

/// Include the /dev/null tracker.
pub mod dev_null;
/// Include the multi-tracker.
pub mod multi_tracker;
/// Include the text-based tracker.
pub mod text;

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub use dev_null::DevNullTracker;
pub use multi_tracker::MultiTracker;
use regex::Regex;
pub use text::TextTracker;

use crate::{Id, ROOT};

/// Error used to return configuration errors
#[derive(Debug)]
pub struct TrackConfigError(pub String);

impl fmt::Display for TrackConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for TrackConfigError {}

/// This is the interface that is supported by all [`Tracker`]s.
pub trait Track {
    /// Allocate a new process-wide ID
    fn unique_id(&self) -> Id;

    /// Determine whether tracking is enabled, and at what level for an
    /// entity looked up by its ID.
    fn is_entity_enabled(&self, id: Id, level: log::Level) -> bool;

    /// Record an entity being created.
    fn add_entity(&self, id: Id, entity_name: &str);

    /// Track when an entity with the given ID is created.
    fn create(&self, created_by: Id, created_obj: Id, name: &str);

    /// Track when an entity with the given ID is destroyed.
    fn destroy(&self, destroyed_by: Id, destroyed_obj: Id);

    /// Track a ring slot being committed by the producer.
    fn commit(&self, id: Id, slot: usize, num_bytes: usize);

    /// Track a ring slot being released by the consumer.
    fn release(&self, id: Id, slot: usize, num_bytes: usize);

    /// Track an entity setting a value.
    fn value(&self, id: Id, value: f64);

    /// Track a log message of the given level.
    fn log(&self, msg_by: Id, level: log::Level, msg: fmt::Arguments);

    /// Perform any pre-exit shutdown/cleanup
    fn shutdown(&self);
}

/// The type of a [`Tracker`] that is shared across entities.
///
/// Roles may run as threads of one process, so trackers must be shareable.
pub type Tracker = Arc<dyn Track + Send + Sync>;

/// Create a [`Tracker`] that prints all track events to `stdout`.
#[must_use]
pub fn stdout_tracker(level: log::Level) -> Tracker {
    let entity_manager = EntityManager::new(level);
    let stdout_writer = Box::new(io::BufWriter::new(io::stdout()));
    let tracker: Tracker = Arc::new(TextTracker::new(entity_manager, stdout_writer));
    tracker
}

/// Create a [`Tracker`] that suppresses all track events.
#[must_use]
pub fn dev_null_tracker() -> Tracker {
    let tracker: Tracker = Arc::new(DevNullTracker {});
    tracker
}

/// The [`EntityManager`] is responsible for determining entity log levels.
///
/// It is owned by each of the writing trackers and is also used to allocate
/// unique [`Id`] values.
pub struct EntityManager {
    /// Level of tracking events to output.
    default_entity_level: log::Level,

    /// List of regular expressions mapping entity names to log levels.
    regex_to_entity_level: Vec<(Regex, log::Level)>,

    /// Used to assign unique IDs.
    unique_id: AtomicU64,

    /// Keep track of entities that have log levels different to the default.
    log_entity_lookup: Mutex<HashMap<Id, log::Level>>,
}

impl EntityManager {
    /// Constructor with default [`log::Level`]
    #[must_use]
    pub fn new(default_entity_level: log::Level) -> Self {
        Self {
            default_entity_level,
            regex_to_entity_level: Vec::new(),
            unique_id: AtomicU64::new(ROOT.0 + 1),
            log_entity_lookup: Mutex::new(HashMap::new()),
        }
    }

    fn unique_id(&self) -> Id {
        Id(self.unique_id.fetch_add(1, Ordering::SeqCst))
    }

    fn is_enabled(&self, id: Id, level: log::Level) -> bool {
        let lookup = self
            .log_entity_lookup
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match lookup.get(&id) {
            None => level <= self.default_entity_level,
            Some(entity_level) => level <= *entity_level,
        }
    }

    fn add_entity(&self, id: Id, entity_name: &str) {
        let entity_level = self.log_level_for(entity_name);
        if entity_level != self.default_entity_level {
            self.log_entity_lookup
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .insert(id, entity_level);
        }
    }

    fn log_level_for(&self, entity_name: &str) -> log::Level {
        for (regex, level) in &self.regex_to_entity_level {
            if regex.is_match(entity_name) {
                return *level;
            }
        }
        self.default_entity_level
    }

    /// Add a filter regular expression to set matching entites to a given
    /// level.
    ///
    /// The first matching filter wins.
    ///
    /// # Example
    ///
    /// ```rust
    /// use dmaflow_track::tracker::EntityManager;
    /// let mut manager = EntityManager::new(log::Level::Warn);
    /// manager.add_entity_level_filter(".*producer.*", log::Level::Trace).unwrap();
    /// ```
    pub fn add_entity_level_filter(
        &mut self,
        regex_str: &str,
        level: log::Level,
    ) -> Result<(), TrackConfigError> {
        match Regex::new(regex_str) {
            Ok(regex) => self.regex_to_entity_level.push((regex, level)),
            Err(e) => {
                return Err(TrackConfigError(format!(
                    "Failed to parse regex {regex_str}:\n{e}\n"
                )));
            }
        }
        Ok(())
    }
}

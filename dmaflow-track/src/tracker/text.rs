// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::tracker::{EntityManager, Track};
use crate::{Id, SharedWriter, Writer};

/// A simple text logger to output messages to a Writer.
pub struct TextTracker {
    entity_manager: EntityManager,

    /// Writer to which all _log_ events will be written.
    writer: SharedWriter,
}

impl TextTracker {
    /// Create a new [`TextTracker`] with an [`EntityManager`].
    pub fn new(entity_manager: EntityManager, writer: Writer) -> Self {
        Self {
            entity_manager,
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    fn write_line(&self, line: fmt::Arguments) {
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Losing a log line must not take a pipeline role down.
        let _ = writer.write_fmt(format_args!("{line}\n"));
    }
}

/// Implementation for each [`Track`] event
impl Track for TextTracker {
    fn unique_id(&self) -> Id {
        self.entity_manager.unique_id()
    }

    fn is_entity_enabled(&self, id: Id, level: log::Level) -> bool {
        self.entity_manager.is_enabled(id, level)
    }

    fn add_entity(&self, id: Id, entity_name: &str) {
        self.entity_manager.add_entity(id, entity_name);
    }

    fn create(&self, created_by: Id, id: Id, name: &str) {
        self.write_line(format_args!("{created_by}: created {id}, {name}"));
    }

    fn destroy(&self, destroyed_by: Id, id: Id) {
        self.write_line(format_args!("{destroyed_by}: destroyed {id}"));
    }

    fn commit(&self, id: Id, slot: usize, num_bytes: usize) {
        self.write_line(format_args!("{id}: commit slot {slot}, {num_bytes} bytes"));
    }

    fn release(&self, id: Id, slot: usize, num_bytes: usize) {
        self.write_line(format_args!("{id}: release slot {slot}, {num_bytes} bytes"));
    }

    fn value(&self, id: Id, value: f64) {
        self.write_line(format_args!("{id}: value {value}"));
    }

    fn log(&self, id: Id, level: log::Level, msg: fmt::Arguments) {
        self.write_line(format_args!("{id}:{level}: {msg}"));
    }

    fn shutdown(&self) {
        let _ = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .flush();
    }
}

impl Drop for TextTracker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

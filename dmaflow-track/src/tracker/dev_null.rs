// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::fmt;

use crate::Id;
use crate::tracker::Track;

/// A tracker that does nothing.
///
/// This can be useful for benchmarks that want to have minimum overheads.
pub struct DevNullTracker;

impl Track for DevNullTracker {
    fn unique_id(&self) -> Id {
        Id(0)
    }

    fn is_entity_enabled(&self, _id: Id, _level: log::Level) -> bool {
        false
    }
    fn add_entity(&self, _id: Id, _entity_name: &str) {}
    fn create(&self, _created_by: Id, _id: Id, _name: &str) {}
    fn destroy(&self, _destroyed_by: Id, _id: Id) {}
    fn commit(&self, _id: Id, _slot: usize, _num_bytes: usize) {}
    fn release(&self, _id: Id, _slot: usize, _num_bytes: usize) {}
    fn value(&self, _id: Id, _value: f64) {}
    fn log(&self, _id: Id, _level: log::Level, _msg: fmt::Arguments) {}
    fn shutdown(&self) {}
}

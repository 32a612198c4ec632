// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! This crate provides combined _track_ capabilities for the dmaflow roles.
//!
//! _Track_ means the combination of _log_ and _trace_ where:
//!
//!   - _log_ are text-based human-readable messages emitted at various levels
//!     of verbosity (from `Trace` through to `Error`).
//!   - _trace_ provides a standard set of pipeline events that can be emitted.
//!     For example, [`Entities`](crate::entity::Entity) being created or ring
//!     slots being committed by the producer and released by the consumer.
//!
//! Every event is emitted on behalf of an [`Entity`](crate::entity::Entity)
//! and filtered against the level configured for that entity, so that one
//! role (e.g. `acquire::producer`) can be traced while the others stay quiet.

// Enable warnings for missing documentation
#![warn(missing_docs)]

use std::sync::{Arc, Mutex};

pub use log;

pub mod builder;
pub mod entity;
pub mod id;

/// Include the trackers.
pub mod tracker;
pub use id::Id;
pub use tracker::{Track, TrackConfigError, Tracker};

pub mod test_helpers;

/// A type alias for objects that receive _log_ / _trace_ events.
///
/// The writer must implement Send in order to be shared between threads.
pub type Writer = Box<dyn std::io::Write + Send>;
type SharedWriter = Arc<Mutex<Writer>>;

/// Id value which indicates where there is no valid id
pub const NO_ID: Id = Id(0);

/// The root id from which all other ids are derived
pub const ROOT: Id = Id(1);

/// Add an entity creation event
#[macro_export]
macro_rules! create {
    ($entity:expr) => {{
        if $entity
            .tracker
            .is_entity_enabled($entity.id, $crate::log::Level::Trace)
        {
            let parent_id = match &$entity.parent {
                Some(parent) => parent.id,
                None => $crate::NO_ID,
            };
            $entity
                .tracker
                .create(parent_id, $entity.id, $entity.full_name());
        }
    }};
}

/// Add an entity destroy event
#[macro_export]
macro_rules! destroy {
    ($entity:expr) => {{
        if $entity
            .tracker
            .is_entity_enabled($entity.id, $crate::log::Level::Trace)
        {
            match &$entity.parent {
                Some(parent) => $entity.tracker.destroy(parent.id, $entity.id),
                None => $entity.tracker.destroy($crate::NO_ID, $entity.id),
            };
        }
    }};
}

/// Track a ring slot being committed with a number of bytes.
#[macro_export]
macro_rules! commit {
    ($entity:expr ; $slot:expr, $num_bytes:expr) => {{
        if $entity
            .tracker
            .is_entity_enabled($entity.id, $crate::log::Level::Trace)
        {
            $entity.tracker.commit($entity.id, $slot, $num_bytes);
        }
    }};
}

/// Track a ring slot being released after its bytes were forwarded.
#[macro_export]
macro_rules! release {
    ($entity:expr ; $slot:expr, $num_bytes:expr) => {{
        if $entity
            .tracker
            .is_entity_enabled($entity.id, $crate::log::Level::Trace)
        {
            $entity.tracker.release($entity.id, $slot, $num_bytes);
        }
    }};
}

/// Track a numeric sample (e.g. a running byte counter).
#[macro_export]
macro_rules! value {
    ($entity:expr ; $value:expr) => {{
        if $entity
            .tracker
            .is_entity_enabled($entity.id, $crate::log::Level::Trace)
        {
            $entity.tracker.value($entity.id, $value as f64);
        }
    }};
}

/// Base macro for log messages of all level.
///
/// The message is only formatted when the entity is enabled at the given
/// level.
#[macro_export]
macro_rules! log_base {
    ($entity:expr ; $lvl:expr, $($arg:tt)+) => (
        if $entity.tracker.is_entity_enabled($entity.id, $lvl) {
            $entity.tracker.log($entity.id, $lvl, format_args!($($arg)+));
        }
    );
}

/// The `trace` macro provides a wrapper for the [`log_base`] macro
/// at level `log::Level::Trace`
#[macro_export]
macro_rules! trace {
    ($entity:expr ; $($arg:tt)+) => (
        $crate::log_base!($entity ; $crate::log::Level::Trace, $($arg)+);
    );
}

/// The `debug` macro provides a wrapper for the [`log_base`] macro
/// at level `log::Level::Debug`
#[macro_export]
macro_rules! debug {
    ($entity:expr ; $($arg:tt)+) => (
        $crate::log_base!($entity ; $crate::log::Level::Debug, $($arg)+);
    );
}

/// The `info` macro provides a wrapper for the [`log_base`] macro at
/// level `log::Level::Info`
#[macro_export]
macro_rules! info {
    ($entity:expr ; $($arg:tt)+) => (
        $crate::log_base!($entity ; $crate::log::Level::Info, $($arg)+);
    );
}

/// The `warn` macro provides a wrapper for the [`log_base`] macro at
/// level `log::Level::Warn`
#[macro_export]
macro_rules! warn {
    ($entity:expr ; $($arg:tt)+) => (
        $crate::log_base!($entity ; $crate::log::Level::Warn, $($arg)+);
    );
}

/// the `error` macro provides a wrapper for the [`log_base`] macro
/// at level `log::Level::Error`
#[macro_export]
macro_rules! error {
    ($entity:expr ; $($arg:tt)+) => (
        $crate::log_base!($entity ; $crate::log::Level::Error, $($arg)+);
    );
}

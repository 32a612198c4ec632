// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! A pipeline entity.
//!
//! Every role and every hardware-facing object owns an entity so that its
//! messages carry a hierarchical name (e.g. `benchmark::producer::s2mm`) and
//! can be filtered independently. Entities are created on the thread (or in
//! the worker process) that runs the role and are shared with `Arc`.

use std::fmt;
use std::sync::Arc;

use crate::{Id, Tracker, create, destroy};

/// Separator between the levels of an entity name.
pub const JOIN: &str = "::";

/// A named node in the entity hierarchy.
///
/// The top of the hierarchy is created with [`toplevel`]; everything else is
/// created from its parent with [`Entity::child`] (or [`Entity::new`] when
/// the entity is embedded by value).
pub struct Entity {
    /// Last segment of the name.
    pub name: String,

    /// Parent entity; `None` only for the top level.
    pub parent: Option<Arc<Entity>>,

    /// Unique identifier used for log/trace messages.
    pub id: Id,

    /// [`Tracker`] shared by the whole hierarchy.
    pub tracker: Tracker,

    path: String,
}

impl Entity {
    fn register(tracker: &Tracker, parent: Option<Arc<Entity>>, name: &str) -> Self {
        let path = match &parent {
            Some(parent) => format!("{}{JOIN}{name}", parent.path),
            None => name.to_string(),
        };
        let id = tracker.unique_id();
        tracker.add_entity(id, &path);

        let entity = Self {
            name: name.to_string(),
            parent,
            id,
            tracker: tracker.clone(),
            path,
        };
        create!(entity);
        entity
    }

    /// Create a new entity below `parent`.
    #[must_use]
    pub fn new(parent: &Arc<Entity>, name: &str) -> Self {
        Self::register(&parent.tracker, Some(parent.clone()), name)
    }

    /// Create a shared entity below `self`.
    #[must_use]
    pub fn child(self: &Arc<Self>, name: &str) -> Arc<Entity> {
        Arc::new(Self::new(self, name))
    }

    /// The full `::`-joined name, as used by the level filters.
    #[must_use]
    pub fn full_name(&self) -> &str {
        &self.path
    }
}

impl Drop for Entity {
    fn drop(&mut self) {
        destroy!(self);
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("path", &self.path)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Create the top-level entity, named after the command being run.
pub fn toplevel(tracker: &Tracker, name: &str) -> Arc<Entity> {
    Arc::new(Entity::register(tracker, None, name))
}

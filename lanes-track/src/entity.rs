// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Named nodes in the simulation hierarchy.
//!
//! Every model holds an [`Entity`]. Its full name (`top::fabric::switch`) is
//! what log filters match against and its [`Id`] tags everything it emits.

use std::fmt;
use std::rc::Rc;

use crate::{Id, Tracker, create, destroy};

/// A node in the simulation hierarchy.
pub struct Entity {
    /// Name within the parent.
    pub name: String,

    /// Only the top level has no parent.
    pub parent: Option<Rc<Entity>>,

    /// Tags everything this entity emits.
    pub id: Id,

    /// Where this entity's events go.
    pub tracker: Tracker,

    full_name: String,
}

impl Entity {
    /// Create a child of `parent`.
    #[must_use]
    pub fn new(parent: &Rc<Entity>, name: &str) -> Self {
        let full_name = format!("{}::{name}", parent.full_name);
        Self::register(Some(parent.clone()), &parent.tracker, name, full_name)
    }

    fn register(parent: Option<Rc<Entity>>, tracker: &Tracker, name: &str, full_name: String) -> Self {
        let id = tracker.unique_id();
        tracker.add_entity(id, &full_name);
        let entity = Self {
            name: name.to_string(),
            parent,
            id,
            tracker: tracker.clone(),
            full_name,
        };
        create!(entity);
        entity
    }

    /// Names of all ancestors and this entity joined by `::`.
    #[must_use]
    pub fn full_name(&self) -> &str {
        &self.full_name
    }
}

impl Drop for Entity {
    fn drop(&mut self) {
        destroy!(self);
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Entity")
            .field(&self.full_name)
            .field(&self.id)
            .finish()
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name)
    }
}

/// Access to the [`Entity`] of a component.
///
/// Normally implemented with `#[derive(EntityGet)]`.
pub trait GetEntity {
    /// Return the entity of this component.
    fn entity(&self) -> &Rc<Entity>;
}

/// Create the root of an entity hierarchy.
pub fn toplevel(tracker: &Tracker, name: &str) -> Rc<Entity> {
    Rc::new(Entity::register(None, tracker, name, name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::dev_null_tracker;

    #[test]
    fn hierarchical_names() {
        let tracker = dev_null_tracker();
        let top = toplevel(&tracker, "top");
        let rc = Rc::new(Entity::new(&top, "rc"));
        let port = Entity::new(&rc, "downstream0");

        assert_eq!(port.full_name(), "top::rc::downstream0");
        assert_eq!(format!("{port}"), "top::rc::downstream0");
        assert_eq!(port.name, "downstream0");
        assert_eq!(top.full_name(), "top");
        assert!(top.parent.is_none());
    }
}

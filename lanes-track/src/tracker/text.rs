// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::cell::RefCell;
use std::io::Write;

use crate::Id;
use crate::tracker::{EntityManager, Track, TrackEvent};

/// Writes one line per event, prefixed by the ID of the entity that
/// emitted it.
pub struct TextTracker {
    entity_manager: EntityManager,
    writer: RefCell<Box<dyn Write>>,
}

impl TextTracker {
    /// Create a new [`TextTracker`] with an [`EntityManager`].
    pub fn new(entity_manager: EntityManager, writer: Box<dyn Write>) -> Self {
        Self {
            entity_manager,
            writer: RefCell::new(writer),
        }
    }
}

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

    fn record(&self, by: Id, event: TrackEvent) {
        // Trace output is best effort
        let _ = writeln!(self.writer.borrow_mut(), "{by}: {event}");
    }

    fn shutdown(&self) {
        let _ = self.writer.borrow_mut().flush();
    }
}

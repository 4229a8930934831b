// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::cell::Cell;

use crate::Id;
use crate::tracker::{Track, TrackEvent, Tracker};

/// Sends each event to every tracker that keeps it.
///
/// IDs are handed out here so they are the same in every output.
pub struct MultiTracker {
    next_id: Cell<u64>,
    trackers: Vec<Tracker>,
}

impl MultiTracker {
    /// Combine `trackers`.
    #[must_use]
    pub fn new(trackers: Vec<Tracker>) -> Self {
        Self {
            next_id: Cell::new(Id::ROOT.0 + 1),
            trackers,
        }
    }
}

impl Track for MultiTracker {
    fn unique_id(&self) -> Id {
        Id(self.next_id.replace(self.next_id.get() + 1))
    }

    fn is_entity_enabled(&self, id: Id, level: log::Level) -> bool {
        self.trackers.iter().any(|t| t.is_entity_enabled(id, level))
    }

    fn add_entity(&self, id: Id, entity_name: &str) {
        for tracker in &self.trackers {
            tracker.add_entity(id, entity_name);
        }
    }

    fn record(&self, by: Id, event: TrackEvent) {
        let level = event.level();
        for tracker in &self.trackers {
            if tracker.is_entity_enabled(by, level) {
                tracker.record(by, event);
            }
        }
    }

    fn shutdown(&self) {
        for tracker in &self.trackers {
            tracker.shutdown();
        }
    }
}

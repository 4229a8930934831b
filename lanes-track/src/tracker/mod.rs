// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Define the [`Track`] trait and a number of [`Tracker`]s.

/// Include the multi-tracker.
pub mod multi_tracker;
/// Include the text-based tracker.
pub mod text;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::rc::Rc;

pub use multi_tracker::MultiTracker;
use regex::Regex;
pub use text::TextTracker;
use thiserror::Error;

use crate::Id;

/// Errors setting up trackers.
#[derive(Debug, Error)]
pub enum TrackConfigError {
    /// An entity filter is not a valid regular expression.
    #[error("failed to parse regex {regex}: {source}")]
    BadFilter {
        /// The expression as given.
        regex: String,
        /// Why it was rejected.
        source: regex::Error,
    },

    /// A log file could not be created.
    #[error("failed to create '{path}': {source}")]
    CreateFile {
        /// The path as given.
        path: String,
        /// The underlying I/O error.
        source: io::Error,
    },
}

/// Something that happened to an entity or to an object it handles.
#[derive(Clone, Copy, Debug)]
pub enum TrackEvent<'a> {
    /// An object was created.
    Create {
        /// The new object.
        object: Id,
        /// Its description.
        name: &'a str,
        /// Size of the object on the wire.
        num_bytes: usize,
        /// Model-specific kind of object.
        kind: i8,
    },
    /// A child entity went away.
    Destroy(Id),
    /// An object arrived.
    Enter(Id),
    /// An object left.
    Exit(Id),
    /// A new value, such as a queue occupancy.
    Value(f64),
    /// Connected to another entity.
    Connect(Id),
    /// Simulation time moved on to this many ns.
    Time(f64),
    /// A log message.
    Log(log::Level, fmt::Arguments<'a>),
}

impl TrackEvent<'_> {
    /// The level an entity has to be enabled at to keep this event.
    #[must_use]
    pub fn level(&self) -> log::Level {
        match self {
            TrackEvent::Log(level, _) => *level,
            _ => log::Level::Trace,
        }
    }
}

impl fmt::Display for TrackEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackEvent::Create {
                object,
                name,
                num_bytes,
                kind,
            } => write!(f, "created {object}, {name}, {kind}, {num_bytes} bytes"),
            TrackEvent::Destroy(object) => write!(f, "destroyed {object}"),
            TrackEvent::Enter(object) => write!(f, "{object} entered"),
            TrackEvent::Exit(object) => write!(f, "{object} exited"),
            TrackEvent::Value(value) => write!(f, "value {value}"),
            TrackEvent::Connect(to) => write!(f, "connect to {to}"),
            TrackEvent::Time(time_ns) => write!(f, "set time {time_ns:.1}ns"),
            TrackEvent::Log(level, msg) => write!(f, "{level}: {msg}"),
        }
    }
}

/// This is the interface that is supported by all [`Tracker`]s.
pub trait Track {
    /// Allocate a new global ID
    fn unique_id(&self) -> Id;

    /// Whether events at `level` from the entity `id` are kept.
    fn is_entity_enabled(&self, id: Id, level: log::Level) -> bool;

    /// Record an entity being created so its level can be looked up by ID.
    fn add_entity(&self, id: Id, entity_name: &str);

    /// Record an event emitted by entity `by`.
    fn record(&self, by: Id, event: TrackEvent);

    /// Flush anything buffered.
    fn shutdown(&self) {}
}

/// The type of a [`Tracker`] that is shared across entities.
pub type Tracker = Rc<dyn Track>;

struct NullTracker {
    next_id: Cell<u64>,
}

impl Track for NullTracker {
    fn unique_id(&self) -> Id {
        Id(self.next_id.replace(self.next_id.get() + 1))
    }
    fn is_entity_enabled(&self, _id: Id, _level: log::Level) -> bool {
        false
    }
    fn add_entity(&self, _id: Id, _entity_name: &str) {}
    fn record(&self, _by: Id, _event: TrackEvent) {}
}

/// Create a [`Tracker`] that prints events at `level` and above to `stdout`.
#[must_use]
pub fn stdout_tracker(level: log::Level) -> Tracker {
    let writer = Box::new(io::BufWriter::new(io::stdout()));
    Rc::new(TextTracker::new(EntityManager::new(level), writer))
}

/// Create a [`Tracker`] that drops everything.
#[must_use]
pub fn dev_null_tracker() -> Tracker {
    Rc::new(NullTracker {
        next_id: Cell::new(Id::ROOT.0 + 1),
    })
}

/// Decides the level each entity is tracked at and hands out [`Id`]s.
pub struct EntityManager {
    default_level: log::Level,

    /// Checked in order, the first match wins.
    filters: Vec<(Regex, log::Level)>,

    next_id: Cell<u64>,

    /// Entities whose level differs from the default.
    overrides: RefCell<HashMap<Id, log::Level>>,
}

impl EntityManager {
    /// Create a manager that tracks every entity at `default_level`.
    #[must_use]
    pub fn new(default_level: log::Level) -> Self {
        Self {
            default_level,
            filters: Vec::new(),
            next_id: Cell::new(Id::ROOT.0 + 1),
            overrides: RefCell::new(HashMap::new()),
        }
    }

    /// Track entities whose full name matches `regex` at `level`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use lanes_track::tracker::EntityManager;
    /// let mut manager = EntityManager::new(log::Level::Warn);
    /// manager.add_entity_level_filter(".*switch.*", log::Level::Trace).unwrap();
    /// ```
    pub fn add_entity_level_filter(
        &mut self,
        regex: &str,
        level: log::Level,
    ) -> Result<(), TrackConfigError> {
        let compiled = Regex::new(regex).map_err(|source| TrackConfigError::BadFilter {
            regex: regex.to_string(),
            source,
        })?;
        self.filters.push((compiled, level));
        Ok(())
    }

    fn unique_id(&self) -> Id {
        Id(self.next_id.replace(self.next_id.get() + 1))
    }

    fn level_for(&self, entity_name: &str) -> log::Level {
        self.filters
            .iter()
            .find(|(regex, _)| regex.is_match(entity_name))
            .map_or(self.default_level, |(_, level)| *level)
    }

    fn add_entity(&self, id: Id, entity_name: &str) {
        let level = self.level_for(entity_name);
        if level != self.default_level {
            self.overrides.borrow_mut().insert(id, level);
        }
    }

    fn is_enabled(&self, id: Id, level: log::Level) -> bool {
        let overrides = self.overrides.borrow();
        level <= *overrides.get(&id).unwrap_or(&self.default_level)
    }
}

#[cfg(test)]
mod tests {
    use log::Level;

    use super::*;

    const PATHS: [&str; 4] = [
        "top",
        "top::fabric",
        "top::fabric::pcie1",
        "top::fabric::switch",
    ];

    fn levels(manager: &EntityManager) -> Vec<Level> {
        PATHS.iter().map(|p| manager.level_for(p)).collect()
    }

    #[test]
    fn filters_in_order() {
        let mut manager = EntityManager::new(Level::Error);
        assert_eq!(levels(&manager), vec![Level::Error; 4]);

        manager.add_entity_level_filter(r".*pcie1", Level::Warn).unwrap();
        manager.add_entity_level_filter(r".*fabric.*", Level::Info).unwrap();
        assert_eq!(
            levels(&manager),
            vec![Level::Error, Level::Info, Level::Warn, Level::Info]
        );
    }

    #[test]
    fn enabled_by_id() {
        let mut manager = EntityManager::new(Level::Warn);
        manager.add_entity_level_filter(r".*switch", Level::Debug).unwrap();

        let link = manager.unique_id();
        manager.add_entity(link, "top::fabric::pcie1");
        let switch = manager.unique_id();
        manager.add_entity(switch, "top::fabric::switch");

        assert_eq!(link, Id(2));
        assert_eq!(switch, Id(3));
        assert!(!manager.is_enabled(link, Level::Debug));
        assert!(manager.is_enabled(link, Level::Warn));
        assert!(manager.is_enabled(switch, Level::Debug));
        assert!(!manager.is_enabled(switch, Level::Trace));
    }

    #[test]
    fn bad_regex() {
        let mut manager = EntityManager::new(Level::Error);
        let err = manager.add_entity_level_filter(r"(", Level::Trace).unwrap_err();
        assert!(err.to_string().starts_with("failed to parse regex ("));
    }

    #[test]
    fn log_events_keep_their_level() {
        let warn = |event: TrackEvent| (event.level(), event.to_string());
        assert_eq!(
            warn(TrackEvent::Log(Level::Warn, format_args!("queue full"))),
            (Level::Warn, "WARN: queue full".to_string())
        );
        assert_eq!(TrackEvent::Enter(Id(7)).level(), Level::Trace);
    }
}

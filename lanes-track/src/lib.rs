// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! This crate provides combined _track_ capabilities for the LANES fabric
//! simulator.
//!
//! _Track_ means the combination of _log_ and _trace_ where:
//!
//!   - _log_ are text-based human-readable messages emitted at various levels
//!     of verbosity (from `Trace` through to `Error`).
//!   - _trace_ records what happens to simulation objects: TLPs being
//!     created, entering and leaving links and switches, queue occupancy and
//!     the passing of time.
//!
//! Both kinds are recorded as a [`TrackEvent`] tagged with the [`Id`] of the
//! entity that emitted it. Which events are kept is decided per entity by the
//! [`EntityManager`](crate::tracker::EntityManager) using regular expressions
//! over the full hierarchical entity names.

// Enable warnings for missing documentation
#![warn(missing_docs)]

use std::fmt;

pub use log;

pub mod builder;
pub mod entity;
pub mod test_helpers;

/// Include the trackers.
pub mod tracker;
pub use tracker::{Track, TrackEvent, Tracker};

/// Identifies an entity or a tracked object in _log_ / _trace_ output.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Id(pub u64);

impl Id {
    /// Used where there is no valid ID, such as the parent of the top level.
    pub const NONE: Id = Id(0);

    /// The first ID handed out is the one after this.
    pub const ROOT: Id = Id(1);
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Objects that are followed through the simulation by their [`Id`].
pub trait Unique {
    /// Return the ID of this object.
    fn id(&self) -> Id;
}

impl Unique for Id {
    fn id(&self) -> Id {
        *self
    }
}

impl Unique for i32 {
    fn id(&self) -> Id {
        Id(*self as u64)
    }
}

impl Unique for usize {
    fn id(&self) -> Id {
        Id(*self as u64)
    }
}

/// Record a [`TrackEvent`] for an entity if it has tracing enabled.
#[doc(hidden)]
#[macro_export]
macro_rules! track {
    ($entity:expr ; $event:expr) => {{
        let entity = &$entity;
        if entity
            .tracker
            .is_entity_enabled(entity.id, $crate::log::Level::Trace)
        {
            entity.tracker.record(entity.id, $event);
        }
    }};
}

/// An object arrives at an entity.
#[macro_export]
macro_rules! enter {
    ($entity:expr ; $object:expr) => {
        $crate::track!($entity ; $crate::TrackEvent::Enter($object))
    };
}

/// An object leaves an entity.
#[macro_export]
macro_rules! exit {
    ($entity:expr ; $object:expr) => {
        $crate::track!($entity ; $crate::TrackEvent::Exit($object))
    };
}

/// Allocate the [`Id`] for an object whose creation is then recorded with
/// [`create`].
#[macro_export]
macro_rules! create_id {
    ($entity:expr) => {{ $entity.tracker.unique_id() }};
}

/// Record the creation of an entity, or of an object by an entity.
#[macro_export]
macro_rules! create {
    ($entity:expr) => {{
        let entity = &$entity;
        let parent = entity.parent.as_ref().map_or($crate::Id::NONE, |p| p.id);
        if entity
            .tracker
            .is_entity_enabled(entity.id, $crate::log::Level::Trace)
        {
            entity.tracker.record(
                parent,
                $crate::TrackEvent::Create {
                    object: entity.id,
                    name: entity.full_name(),
                    num_bytes: 0,
                    kind: 0,
                },
            );
        }
    }};
    ($entity:expr ; $created:expr, $num_bytes:expr, $kind:expr) => {
        $crate::track!($entity ; $crate::TrackEvent::Create {
            object: $crate::Unique::id(&$created),
            name: &format!("{}", $created),
            num_bytes: $num_bytes,
            kind: $kind,
        })
    };
}

/// Record an entity going away.
#[macro_export]
macro_rules! destroy {
    ($entity:expr) => {{
        let entity = &$entity;
        let parent = entity.parent.as_ref().map_or($crate::Id::NONE, |p| p.id);
        if entity
            .tracker
            .is_entity_enabled(entity.id, $crate::log::Level::Trace)
        {
            entity
                .tracker
                .record(parent, $crate::TrackEvent::Destroy(entity.id));
        }
    }};
}

/// Connect two entities
#[macro_export]
macro_rules! connect {
    ($from_entity:expr ; $to_entity:expr) => {
        $crate::track!($from_entity ; $crate::TrackEvent::Connect($to_entity.id))
    };
}

/// Record a value such as a queue occupancy.
#[macro_export]
macro_rules! value {
    ($entity:expr ; $value:expr) => {
        $crate::track!($entity ; $crate::TrackEvent::Value($value as f64))
    };
}

/// Record that simulation time has moved on.
#[macro_export]
macro_rules! set_time {
    ($entity:expr ; $time_ns:expr) => {
        $crate::track!($entity ; $crate::TrackEvent::Time($time_ns))
    };
}

/// Base macro for log messages of all levels.
///
/// Only formats the message if the entity is enabled at the given level.
#[macro_export]
macro_rules! log_base {
    ($entity:expr ; $lvl:expr, $($arg:tt)+) => {{
        let entity = &$entity;
        if entity.tracker.is_entity_enabled(entity.id, $lvl) {
            entity
                .tracker
                .record(entity.id, $crate::TrackEvent::Log($lvl, format_args!($($arg)+)));
        }
    }};
}

/// The `trace` macro emits a log message at level `log::Level::Trace`
#[macro_export]
macro_rules! trace {
    ($entity:expr ; $($arg:tt)+) => (
        $crate::log_base!($entity ; $crate::log::Level::Trace, $($arg)+)
    );
}

/// The `debug` macro emits a log message at level `log::Level::Debug`
#[macro_export]
macro_rules! debug {
    ($entity:expr ; $($arg:tt)+) => (
        $crate::log_base!($entity ; $crate::log::Level::Debug, $($arg)+)
    );
}

/// The `info` macro emits a log message at level `log::Level::Info`
#[macro_export]
macro_rules! info {
    ($entity:expr ; $($arg:tt)+) => (
        $crate::log_base!($entity ; $crate::log::Level::Info, $($arg)+)
    );
}

/// The `warn` macro emits a log message at level `log::Level::Warn`
#[macro_export]
macro_rules! warn {
    ($entity:expr ; $($arg:tt)+) => (
        $crate::log_base!($entity ; $crate::log::Level::Warn, $($arg)+)
    );
}

/// The `error` macro emits a log message at level `log::Level::Error`
#[macro_export]
macro_rules! error {
    ($entity:expr ; $($arg:tt)+) => (
        $crate::log_base!($entity ; $crate::log::Level::Error, $($arg)+)
    );
}

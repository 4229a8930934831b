// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Trackers for tests.

use std::cell::{Cell, RefCell};
use std::fs;
use std::io::BufWriter;
use std::path::Path;
use std::rc::Rc;

use regex::Regex;

use crate::tracker::{EntityManager, TextTracker, dev_null_tracker};
use crate::{Id, Track, TrackEvent, Tracker};

/// Keeps every event in memory as the line a [`TextTracker`] would write.
pub struct TestTracker {
    events: RefCell<Vec<String>>,
    next_id: Cell<u64>,
}

impl TestTracker {
    /// IDs are handed out starting at `initial_id`.
    #[must_use]
    pub fn new(initial_id: u64) -> Self {
        Self {
            events: RefCell::new(Vec::new()),
            next_id: Cell::new(initial_id),
        }
    }

    /// Return a copy of the events seen so far.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }
}

impl Track for TestTracker {
    fn unique_id(&self) -> Id {
        Id(self.next_id.replace(self.next_id.get() + 1))
    }

    fn is_entity_enabled(&self, _id: Id, _level: log::Level) -> bool {
        true
    }

    fn add_entity(&self, _id: Id, _entity_name: &str) {}

    fn record(&self, by: Id, event: TrackEvent) {
        let line = format!("{by}: {event}");
        println!("{line}");
        self.events.borrow_mut().push(line);
    }
}

/// Create a [`TestTracker`] along with the same object as a [`Tracker`].
///
/// # Examples
///
/// ```
/// use lanes_track::test_helpers;
///
/// let (test_tracker, tracker) = lanes_track::test_init!(10);
/// let top = lanes_track::entity::toplevel(&tracker, "top");
/// test_helpers::check_and_clear(&test_tracker, &["0: created 10, top, 0, 0 bytes"]);
/// ```
#[macro_export]
macro_rules! test_init {
    ($start_id:expr) => {{
        let test_tracker = std::rc::Rc::new($crate::test_helpers::TestTracker::new($start_id));
        let tracker: $crate::Tracker = test_tracker.clone();
        (test_tracker, tracker)
    }};
}

/// Assert that the events since the last call match the `expected` regular
/// expressions in order, then forget them.
///
/// # Panics
///
/// Panics if the events do not match. Only intended for use in tests.
pub fn check_and_clear(tracker: &TestTracker, expected: &[&str]) {
    let events = tracker.events.take();
    assert_eq!(expected.len(), events.len(), "{events:#?}");
    for (pattern, event) in expected.iter().zip(&events) {
        let re = Regex::new(pattern).unwrap();
        assert!(re.is_match(event), "{event:?} does not match {pattern:?}");
    }
}

/// Create a text [`Tracker`] for a test which writes to `traces/<test>.log`.
///
/// Pass `file!()` of the calling test so that each test file gets its own
/// log. Falls back to a tracker that drops everything if the file cannot be
/// created.
#[must_use]
pub fn create_tracker(test_file: &str) -> Tracker {
    let stem = Path::new(test_file)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("test");

    let trace_dir = Path::new("traces");
    let file = fs::create_dir_all(trace_dir)
        .and_then(|()| fs::File::create(trace_dir.join(format!("{stem}.log"))));
    match file {
        Ok(file) => Rc::new(TextTracker::new(
            EntityManager::new(log::Level::Trace),
            Box::new(BufWriter::new(file)),
        )),
        Err(_) => dev_null_tracker(),
    }
}

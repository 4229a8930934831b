// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Build the [`Tracker`] for a run from user options.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::rc::Rc;

use crate::Tracker;
use crate::tracker::{EntityManager, MultiTracker, TextTracker, TrackConfigError, stdout_tracker};

/// Where a tracker writes.
#[derive(Clone, Copy, Debug)]
pub enum Output<'a> {
    /// The console.
    Stdout,
    /// A text file, created or truncated.
    File(&'a Path),
}

/// One text output and what it keeps.
#[derive(Clone, Copy, Debug)]
pub struct TrackerConfig<'a> {
    /// Where events go.
    pub output: Output<'a>,

    /// Level for entities matching `filter_regex`, or for all entities when
    /// it is empty.
    pub level: log::Level,

    /// Entities not matching this only emit errors.
    pub filter_regex: &'a str,
}

impl TrackerConfig<'_> {
    fn entity_manager(&self) -> Result<EntityManager, TrackConfigError> {
        if self.filter_regex.is_empty() {
            return Ok(EntityManager::new(self.level));
        }
        let mut entity_manager = EntityManager::new(log::Level::Error);
        entity_manager.add_entity_level_filter(self.filter_regex, self.level)?;
        Ok(entity_manager)
    }

    fn build(&self) -> Result<Tracker, TrackConfigError> {
        let writer: Box<dyn Write> = match self.output {
            Output::Stdout => Box::new(BufWriter::new(io::stdout())),
            Output::File(path) => {
                let file = fs::File::create(path).map_err(|source| TrackConfigError::CreateFile {
                    path: path.display().to_string(),
                    source,
                })?;
                Box::new(BufWriter::new(file))
            }
        };
        Ok(Rc::new(TextTracker::new(self.entity_manager()?, writer)))
    }
}

/// Build a tracker writing to every output in `configs`.
///
/// With no outputs warnings and errors still go to stdout.
pub fn setup_trackers(configs: &[TrackerConfig]) -> Result<Tracker, TrackConfigError> {
    match configs {
        [] => Ok(stdout_tracker(log::Level::Warn)),
        [config] => config.build(),
        configs => {
            let trackers = configs
                .iter()
                .map(TrackerConfig::build)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Rc::new(MultiTracker::new(trackers)))
        }
    }
}

// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::rc::Rc;

use lanes_track::entity::Entity;
use lanes_track::set_time;

use super::clock::{Clock, Waiter};

/// Every clock of a simulation and the time reached so far.
pub struct Timeline {
    pub entity: Rc<Entity>,
    now_ns: f64,
    clocks: Vec<Clock>,
}

impl Timeline {
    #[must_use]
    pub fn new(parent: &Rc<Entity>) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, "time")),
            now_ns: 0.0,
            clocks: Vec::new(),
        }
    }

    /// The clock running at `freq_mhz`, created on first use.
    pub fn clock(&mut self, freq_mhz: f64) -> Clock {
        match self.clocks.iter().find(|c| c.freq_mhz() == freq_mhz) {
            Some(clock) => clock.clone(),
            None => {
                let clock = Clock::new(freq_mhz);
                self.clocks.push(clock.clone());
                clock
            }
        }
    }

    /// Move time forward to the earliest waiter on any clock and return the
    /// tasks to wake. Clocks due at the same time advance in creation order.
    pub fn advance(&mut self) -> Option<Vec<Waiter>> {
        let (_, clock) = self
            .clocks
            .iter()
            .filter_map(|c| c.next_wake_ns().map(|ns| (ns, c)))
            .min_by(|a, b| a.0.total_cmp(&b.0))?;
        let waiters = clock.advance()?;

        let now_ns = clock.time_now_ns();
        if now_ns != self.now_ns {
            set_time!(self.entity ; now_ns);
            self.now_ns = now_ns;
            for other in &self.clocks {
                other.catch_up(now_ns);
            }
        }
        Some(waiters)
    }

    #[must_use]
    pub fn now_ns(&self) -> f64 {
        self.now_ns
    }

    #[must_use]
    pub fn only_background_waiting(&self) -> bool {
        self.clocks.iter().all(Clock::only_background_waiting)
    }
}

// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The [`Engine`] owns all simulation state.
//!
//! Every component constructor takes the engine so that it can register
//! itself to be run and obtain clocks.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;

use lanes_track::entity::{Entity, toplevel};
use lanes_track::{Tracker, trace};

use crate::executor::{self, Executor, Spawner};
use crate::time::clock::Clock;
use crate::traits::Event;
use crate::types::{Component, SimResult};

const DEFAULT_CLOCK_MHZ: f64 = 1000.0;

pub struct Engine {
    executor: Executor,
    spawner: Spawner,
    toplevel: Rc<Entity>,
    tracker: Tracker,

    /// Components registered since the last run started.
    pending: RefCell<Vec<Component>>,
}

impl Engine {
    pub fn new(tracker: &Tracker) -> Self {
        let toplevel = toplevel(tracker, "top");
        let (executor, spawner) = executor::new_executor_and_spawner(&toplevel);
        Self {
            executor,
            spawner,
            toplevel,
            tracker: tracker.clone(),
            pending: RefCell::new(Vec::new()),
        }
    }

    /// Register a component that will be run as the simulation starts
    pub fn register(&self, component: Component) {
        self.pending.borrow_mut().push(component);
    }

    fn start_components(&self) {
        let components: Vec<Component> = self.pending.borrow_mut().drain(..).collect();
        trace!(self.toplevel ; "Starting {} components", components.len());
        for component in components {
            self.spawner.spawn(async move { component.run().await });
        }
    }

    /// Run until no task that must complete remains.
    pub fn run(&mut self) -> SimResult {
        self.start_components();
        self.executor.run(&Cell::new(false))
    }

    /// Run until `event` fires or nothing is left to run.
    pub fn run_until(&mut self, event: &impl Event) -> SimResult {
        self.start_components();

        let fired = Rc::new(Cell::new(false));
        let listen = event.listen();
        let flag = fired.clone();
        self.spawner.spawn(async move {
            listen.await;
            flag.set(true);
            Ok(())
        });
        self.executor.run(&fired)
    }

    #[must_use]
    pub fn spawner(&self) -> Spawner {
        self.spawner.clone()
    }

    pub fn spawn(&self, future: impl Future<Output = SimResult> + 'static) {
        self.spawner.spawn(future);
    }

    /// A 1GHz clock.
    #[must_use]
    pub fn default_clock(&mut self) -> Clock {
        self.executor.clock(DEFAULT_CLOCK_MHZ)
    }

    #[must_use]
    pub fn clock_mhz(&mut self, freq_mhz: f64) -> Clock {
        self.executor.clock(freq_mhz)
    }

    #[must_use]
    pub fn clock_ghz(&mut self, freq_ghz: f64) -> Clock {
        self.executor.clock(freq_ghz * 1000.0)
    }

    #[must_use]
    pub fn time_now_ns(&self) -> f64 {
        self.executor.time_now_ns()
    }

    #[must_use]
    pub fn top(&self) -> &Rc<Entity> {
        &self.toplevel
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Buffered trackers must be flushed
        self.tracker.shutdown();
    }
}

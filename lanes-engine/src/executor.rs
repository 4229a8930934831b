// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! A single-threaded executor for simulation tasks.
//!
//! Tasks live in slots indexed by a task id. Waking a task pushes its id onto
//! the ready queue. The executor polls ready tasks until none remain, then
//! moves the [`Timeline`] on to the earliest clock waiter. A run ends when
//! the stop flag is set, when a task fails or when only background waiters
//! are left.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, Waker};

use futures::task::{self, ArcWake};
use lanes_track::entity::Entity;
use lanes_track::trace;

use crate::time::clock::Clock;
use crate::time::simtime::Timeline;
use crate::types::SimResult;

type ReadyQueue = Arc<Mutex<Vec<usize>>>;

struct TaskWaker {
    id: usize,
    ready: ReadyQueue,
}

impl ArcWake for TaskWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self
            .ready
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(arc_self.id);
    }
}

struct Task {
    future: Pin<Box<dyn Future<Output = SimResult>>>,
    waker: Waker,
}

struct Shared {
    /// A slot is empty once its task has finished or while it is polled.
    tasks: RefCell<Vec<Option<Task>>>,
    ready: ReadyQueue,
    timeline: RefCell<Timeline>,
}

impl Shared {
    fn take_ready(&self) -> Vec<usize> {
        mem::take(&mut *self.ready.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn nothing_ready(&self) -> bool {
        self.ready
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

#[derive(Clone)]
pub struct Executor {
    pub entity: Rc<Entity>,
    shared: Rc<Shared>,
}

impl Executor {
    /// Run until `stop` is set or nothing but background tasks can make
    /// progress.
    pub fn run(&self, stop: &Cell<bool>) -> SimResult {
        loop {
            self.poll_ready(stop)?;
            if stop.get() {
                return Ok(());
            }
            if !self.shared.nothing_ready() {
                continue;
            }

            let mut timeline = self.shared.timeline.borrow_mut();
            if timeline.only_background_waiting() {
                trace!(self.entity ; "Only background tasks remain");
                return Ok(());
            }
            let Some(waiters) = timeline.advance() else {
                return Ok(());
            };
            drop(timeline);
            for waiter in waiters {
                waiter.waker.wake();
            }
        }
    }

    fn poll_ready(&self, stop: &Cell<bool>) -> SimResult {
        for id in self.shared.take_ready() {
            if stop.get() {
                break;
            }
            // Ids of tasks that have finished may still be queued
            let task = self.shared.tasks.borrow_mut().get_mut(id).and_then(Option::take);
            let Some(mut task) = task else {
                continue;
            };

            let mut context = Context::from_waker(&task.waker);
            match task.future.as_mut().poll(&mut context) {
                Poll::Ready(result) => result?,
                Poll::Pending => self.shared.tasks.borrow_mut()[id] = Some(task),
            }
        }
        Ok(())
    }

    pub fn clock(&self, freq_mhz: f64) -> Clock {
        self.shared.timeline.borrow_mut().clock(freq_mhz)
    }

    pub fn time_now_ns(&self) -> f64 {
        self.shared.timeline.borrow().now_ns()
    }
}

/// Adds tasks to an [`Executor`]. Cloned into every component that runs
/// tasks of its own.
#[derive(Clone)]
pub struct Spawner {
    shared: Rc<Shared>,
}

impl Spawner {
    pub fn spawn(&self, future: impl Future<Output = SimResult> + 'static) {
        let mut tasks = self.shared.tasks.borrow_mut();
        let id = tasks.len();
        let waker = task::waker(Arc::new(TaskWaker {
            id,
            ready: self.shared.ready.clone(),
        }));
        waker.wake_by_ref();
        tasks.push(Some(Task {
            future: Box::pin(future),
            waker,
        }));
    }
}

pub fn new_executor_and_spawner(top: &Rc<Entity>) -> (Executor, Spawner) {
    let shared = Rc::new(Shared {
        tasks: RefCell::new(Vec::new()),
        ready: Arc::new(Mutex::new(Vec::new())),
        timeline: RefCell::new(Timeline::new(top)),
    });
    let executor = Executor {
        entity: Rc::new(Entity::new(top, "executor")),
        shared: shared.clone(),
    };
    (executor, Spawner { shared })
}

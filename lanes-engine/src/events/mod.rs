// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Events used by tasks to wait for each other.
//!
//! A [`Once`](once::Once) event fires a single time and stays fired. A
//! [`Repeated`](repeated::Repeated) event can fire any number of times and a
//! listener waits for the first notification after it started listening.
//! Both count notifications in a shared [`EventState`] and hand out the same
//! [`Listen`] future.
//!
//! # Example:
//!
//! ```rust
//! # use lanes_engine::engine::Engine;
//! # use lanes_engine::events::once::Once;
//! # use lanes_engine::traits::Event;
//! # use lanes_track::tracker::dev_null_tracker;
//! let mut engine = Engine::new(&dev_null_tracker());
//! let event = Once::default();
//! let clock = engine.default_clock();
//!
//! let listener = event.clone();
//! engine.spawn(async move {
//!     listener.listen().await;
//!     Ok(())
//! });
//! engine.spawn(async move {
//!     clock.wait_ticks(10).await;
//!     event.notify()
//! });
//! engine.run().unwrap();
//! assert_eq!(engine.time_now_ns(), 10.0);
//! ```

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

pub mod once;
pub mod repeated;

#[derive(Default)]
pub struct EventState {
    wakers: RefCell<Vec<Waker>>,

    /// Number of notifications so far.
    generation: Cell<u64>,
}

impl EventState {
    fn fire(&self) {
        self.generation.set(self.generation.get() + 1);
        for waker in self.wakers.borrow_mut().drain(..) {
            waker.wake();
        }
    }

    fn listen_for(self: &Rc<Self>, generation: u64) -> Listen {
        Listen {
            state: self.clone(),
            generation,
        }
    }
}

/// Completes once the event has fired `generation` times.
pub struct Listen {
    state: Rc<EventState>,
    generation: u64,
}

impl Future for Listen {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.state.generation.get() >= self.generation {
            Poll::Ready(())
        } else {
            self.state.wakers.borrow_mut().push(cx.waker().clone());
            Poll::Pending
        }
    }
}

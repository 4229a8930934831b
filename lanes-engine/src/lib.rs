// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The LANES engine: an asynchronous discrete-event simulation core.
//!
//! Components are `async` tasks that communicate through rendezvous
//! [ports](crate::port) and wait on [clocks](crate::time::clock) or
//! [events](crate::events). The [`Engine`](crate::engine::Engine) owns the
//! executor and all clocks, so there is no global simulation state.
//!
//! # Example
//!
//! ```rust
//! use lanes_engine::engine::Engine;
//! use lanes_engine::run_simulation;
//! use lanes_track::tracker::dev_null_tracker;
//!
//! let mut engine = Engine::new(&dev_null_tracker());
//! let clock = engine.default_clock();
//! engine.spawn(async move {
//!     clock.wait_ticks(5).await;
//!     Ok(())
//! });
//! run_simulation!(engine);
//! assert_eq!(engine.time_now_ns(), 5.0);
//! ```

#![doc(test(attr(warn(unused))))]

pub mod engine;
pub mod events;
pub mod executor;
pub mod port;
pub mod test_helpers;
pub mod time;
pub mod traits;
pub mod types;

#[macro_export]
/// Run the simulation, either expecting success or a specific error.
macro_rules! run_simulation {
    ($engine:ident) => {
        $engine.run().unwrap();
    };
    ($engine:ident, $expect:expr) => {
        match $engine.run() {
            Ok(()) => panic!("Expected an error!"),
            Err(e) => assert_eq!(format!("{e}").as_str(), $expect),
        }
    };
}

// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Generic components used to build LANES models.
//!
//! All components are generic over the [`SimObject`] they carry and are
//! connected with the [`connect_port!`] macro:
//!
//! ```rust
//! # use lanes_components::delay::Delay;
//! # use lanes_components::sink::Sink;
//! # use lanes_components::source::Source;
//! # use lanes_components::connect_port;
//! # use lanes_engine::run_simulation;
//! # use lanes_engine::engine::Engine;
//! # use lanes_track::tracker::dev_null_tracker;
//! let mut engine = Engine::new(&dev_null_tracker());
//! let clock = engine.default_clock();
//! let top = engine.top().clone();
//!
//! let source = Source::new_and_register(&engine, &top, "source", std::iter::repeat_n(7, 10)).unwrap();
//! let delay = Delay::new_and_register(&engine, &clock, &top, "delay", 3).unwrap();
//! let sink = Sink::new_and_register(&engine, &top, "sink").unwrap();
//!
//! connect_port!(source, tx => delay, rx).unwrap();
//! connect_port!(delay, tx => sink, rx).unwrap();
//!
//! run_simulation!(engine);
//! assert_eq!(sink.num_sunk(), 10);
//! ```
//!
//! [`SimObject`]: lanes_engine::traits::SimObject

pub mod arbiter;
pub mod connect;
pub mod delay;
pub mod rate_limiter;
pub mod router;
pub mod sink;
pub mod source;

// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use lanes_components::connect_port;
use lanes_components::router::{Route, Router};
use lanes_components::sink::Sink;
use lanes_components::source::Source;
use lanes_engine::run_simulation;
use lanes_engine::sim_error;
use lanes_engine::test_helpers::start_test;
use lanes_engine::types::SimError;

/// Send each value out of the port it names.
fn by_value(value: &i32) -> Result<usize, SimError> {
    Ok(*value as usize)
}

#[test]
fn router() {
    let mut engine = start_test(file!());

    const NUM_PUTS: usize = 50;

    let top = engine.top();
    let values = (0..2).cycle().take(NUM_PUTS);
    let source = Source::new_and_register(&engine, top, "source", values).unwrap();
    let router = Router::<i32>::new_and_register(&engine, top, "router", 2, Box::new(by_value)).unwrap();
    let sink_a = Sink::new_and_register(&engine, top, "sink_a").unwrap();
    let sink_b = Sink::new_and_register(&engine, top, "sink_b").unwrap();

    connect_port!(source, tx => router, rx).unwrap();
    connect_port!(router, tx, 0 => sink_a, rx).unwrap();
    connect_port!(router, tx, 1 => sink_b, rx).unwrap();

    run_simulation!(engine);

    assert_eq!(sink_a.num_sunk(), NUM_PUTS / 2);
    assert_eq!(sink_b.num_sunk(), NUM_PUTS / 2);
}

#[test]
fn invalid_egress() {
    let mut engine = start_test(file!());

    let top = engine.top();
    let source = Source::new_and_register(&engine, top, "source", [1, 5]).unwrap();
    let router = Router::<i32>::new_and_register(&engine, top, "router", 2, Box::new(by_value)).unwrap();
    let sink_a = Sink::new_and_register(&engine, top, "sink_a").unwrap();
    let sink_b = Sink::new_and_register(&engine, top, "sink_b").unwrap();

    connect_port!(source, tx => router, rx).unwrap();
    connect_port!(router, tx, 0 => sink_a, rx).unwrap();
    connect_port!(router, tx, 1 => sink_b, rx).unwrap();

    run_simulation!(engine, "Error: top::router: 5 selected invalid egress index 5");
    assert_eq!(sink_b.num_sunk(), 1);
}

struct RejectOdd;

impl Route<i32> for RejectOdd {
    fn route(&self, value: &i32) -> Result<usize, SimError> {
        if value % 2 == 1 {
            return sim_error!("odd value {value}");
        }
        Ok(0)
    }
}

#[test]
fn route_error_stops_simulation() {
    let mut engine = start_test(file!());

    let top = engine.top();
    let source = Source::new_and_register(&engine, top, "source", 0..4).unwrap();
    let router = Router::new_and_register(&engine, top, "router", 1, Box::new(RejectOdd)).unwrap();
    let sink = Sink::new_and_register(&engine, top, "sink").unwrap();

    connect_port!(source, tx => router, rx).unwrap();
    connect_port!(router, tx, 0 => sink, rx).unwrap();

    run_simulation!(engine, "Error: odd value 1");
    assert_eq!(sink.num_sunk(), 1);
}

#[test]
fn missing_port() {
    let engine = start_test(file!());

    let top = engine.top();
    let router = Router::<i32>::new_and_register(&engine, top, "router", 1, Box::new(by_value)).unwrap();
    let sink = Sink::new_and_register(&engine, top, "sink").unwrap();

    let err = connect_port!(router, tx, 3 => sink, rx).unwrap_err();
    assert_eq!(err.to_string(), "Error: top::router: no tx port 3");
}

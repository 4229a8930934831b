// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::iter::repeat_n;

use lanes_components::connect_port;
use lanes_components::delay::Delay;
use lanes_components::sink::Sink;
use lanes_components::source::Source;
use lanes_engine::run_simulation;
use lanes_engine::test_helpers::start_test;

#[test]
fn single_value_latency() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let top = engine.top().clone();

    let source = Source::new_and_register(&engine, &top, "source", repeat_n(1, 1)).unwrap();
    let delay = Delay::new_and_register(&engine, &clock, &top, "delay", 5).unwrap();
    let sink = Sink::new_and_register(&engine, &top, "sink").unwrap();

    connect_port!(source, tx => delay, rx).unwrap();
    connect_port!(delay, tx => sink, rx).unwrap();

    run_simulation!(engine);

    assert_eq!(sink.num_sunk(), 1);
    assert_eq!(engine.time_now_ns(), 5.0);
}

#[test]
fn full_throughput() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let top = engine.top().clone();

    let delay_ticks = 3;
    let num_puts = delay_ticks * 10;

    let source =
        Source::new_and_register(&engine, &top, "source", repeat_n(500, num_puts))
            .unwrap();
    let delay = Delay::new_and_register(&engine, &clock, &top, "delay", delay_ticks).unwrap();
    let sink = Sink::new_and_register(&engine, &top, "sink").unwrap();

    connect_port!(source, tx => delay, rx).unwrap();
    connect_port!(delay, tx => sink, rx).unwrap();

    run_simulation!(engine);

    assert_eq!(sink.num_sunk(), num_puts);
    assert_eq!(engine.time_now_ns(), num_puts as f64);
}

#[test]
fn zero_delay() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let top = engine.top().clone();

    let source = Source::new_and_register(&engine, &top, "source", repeat_n(2, 8)).unwrap();
    let delay = Delay::new_and_register(&engine, &clock, &top, "delay", 0).unwrap();
    let sink = Sink::new_and_register(&engine, &top, "sink").unwrap();

    connect_port!(source, tx => delay, rx).unwrap();
    connect_port!(delay, tx => sink, rx).unwrap();

    run_simulation!(engine);

    assert_eq!(sink.num_sunk(), 8);
    assert_eq!(engine.time_now_ns(), 0.0);
}

#[test]
fn preserves_order() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let top = engine.top().clone();

    let source = Source::new_and_register(&engine, &top, "source", 0..20_usize).unwrap();
    let delay = Delay::new_and_register(&engine, &clock, &top, "delay", 4).unwrap();
    let sink = Sink::new_and_register(&engine, &top, "sink").unwrap();
    sink.record_values();

    connect_port!(source, tx => delay, rx).unwrap();
    connect_port!(delay, tx => sink, rx).unwrap();

    run_simulation!(engine);

    assert_eq!(sink.values(), (0..20).collect::<Vec<usize>>());
}

#[test]
fn connect_twice_fails() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let top = engine.top().clone();

    let delay = Delay::<i32>::new_and_register(&engine, &clock, &top, "delay", 1).unwrap();
    let sink_a = Sink::new_and_register(&engine, &top, "sink_a").unwrap();
    let sink_b = Sink::new_and_register(&engine, &top, "sink_b").unwrap();

    connect_port!(delay, tx => sink_a, rx).unwrap();
    let result = connect_port!(delay, tx => sink_b, rx);
    assert!(result.is_err());
}

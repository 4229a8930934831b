// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::cell::RefCell;
use std::iter::repeat_n;
use std::rc::Rc;

use lanes_components::arbiter::policy::{FixedPriority, RoundRobin};
use lanes_components::arbiter::{Arbiter, Arbitrate};
use lanes_components::connect_port;
use lanes_components::sink::Sink;
use lanes_components::source::Source;
use lanes_engine::port::InPort;
use lanes_engine::run_simulation;
use lanes_engine::test_helpers::start_test;

#[test]
fn merges_all_inputs() {
    let mut engine = start_test(file!());

    const NUM_PUTS: usize = 10;
    const NUM_INPUTS: usize = 3;

    let top = engine.top().clone();
    let arbiter =
        Arbiter::new_and_register(&engine, &top, "arb", NUM_INPUTS, Box::new(RoundRobin::new()))
            .unwrap();
    let sink = Sink::new_and_register(&engine, &top, "sink").unwrap();
    sink.record_values();

    let sources: Vec<_> = (0..NUM_INPUTS)
        .map(|i| {
            Source::new_and_register(
                &engine,
                &top,
                &format!("source{i}"),
                repeat_n(i, NUM_PUTS),
            )
            .unwrap()
        })
        .collect();

    for (i, source) in sources.iter().enumerate() {
        connect_port!(source, tx => arbiter, rx, i).unwrap();
    }
    connect_port!(arbiter, tx => sink, rx).unwrap();

    run_simulation!(engine);

    assert_eq!(sink.num_sunk(), NUM_PUTS * NUM_INPUTS);
    let values = sink.values();
    for i in 0..NUM_INPUTS {
        assert_eq!(values.iter().filter(|v| **v == i).count(), NUM_PUTS);
    }
}

#[test]
fn round_robin_rotates() {
    let mut policy = RoundRobin::new();
    let all = [true; 3];
    let grants: Vec<_> = (0..4).map(|_| policy.grant(&all)).collect();
    assert_eq!(grants, vec![Some(0), Some(1), Some(2), Some(0)]);
    assert_eq!(policy.grant(&[false; 3]), None);
}

#[test]
fn round_robin_skips_empty() {
    let mut policy = RoundRobin::new();
    assert_eq!(policy.grant(&[false, false, true]), Some(2));
    // Search restarts at input 0 after granting input 2
    assert_eq!(policy.grant(&[false, true, true]), Some(1));
    assert_eq!(policy.grant(&[false, true, true]), Some(2));
    assert_eq!(policy.grant(&[]), None);
}

#[test]
fn fixed_priority_prefers_low_index() {
    let mut policy = FixedPriority;
    assert_eq!(policy.grant(&[true, true]), Some(0));
    assert_eq!(policy.grant(&[true, true]), Some(0));
    assert_eq!(policy.grant(&[false, true]), Some(1));
}

/// A slow output holds back every input once their slots are full.
#[test]
fn full_slots_back_pressure_inputs() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let top = engine.top().clone();

    let arbiter = Arbiter::new_and_register(&engine, &top, "arb", 2, Box::new(FixedPriority)).unwrap();
    let sources: Vec<_> = (0..2)
        .map(|i| Source::new_and_register(&engine, &top, &format!("source{i}"), repeat_n(i, 3)).unwrap())
        .collect();
    for (i, source) in sources.iter().enumerate() {
        connect_port!(source, tx => arbiter, rx, i).unwrap();
    }

    let rx = InPort::new(&top, "slow_rx");
    arbiter.connect_port_tx(rx.state()).unwrap();
    let order = Rc::new(RefCell::new(Vec::new()));
    {
        let order = order.clone();
        engine.spawn(async move {
            for _ in 0..6 {
                clock.wait_ticks(10).await;
                let value: usize = rx.get()?.await;
                order.borrow_mut().push(value);
            }
            Ok(())
        });
    }

    run_simulation!(engine);
    assert_eq!(*order.borrow(), vec![0, 0, 0, 1, 1, 1]);
    assert_eq!(engine.time_now_ns(), 60.0);
}

// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::cell::RefCell;
use std::rc::Rc;

use lanes_engine::events::once::Once;
use lanes_engine::events::repeated::Repeated;
use lanes_engine::{run_simulation, sim_error};
use lanes_engine::test_helpers::start_test;
use lanes_engine::traits::Event;

#[test]
fn once_wakes_all_listeners() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let event = Once::default();

    let woken_ns = Rc::new(RefCell::new(Vec::new()));
    for _ in 0..3 {
        let event = event.clone();
        let woken_ns = woken_ns.clone();
        let clock = clock.clone();
        engine.spawn(async move {
            event.listen().await;
            woken_ns.borrow_mut().push(clock.time_now_ns());
            Ok(())
        });
    }

    engine.spawn(async move {
        clock.wait_ticks(12).await;
        event.notify()
    });

    run_simulation!(engine);
    assert_eq!(*woken_ns.borrow(), vec![12.0; 3]);
}

#[test]
fn once_notify_twice_fails() {
    let mut engine = start_test(file!());
    let event = Once::default();

    engine.spawn(async move {
        event.notify()?;
        event.notify()
    });

    run_simulation!(engine, "Error: once event already triggered");
}

#[test]
fn listen_after_trigger_is_ready() {
    let mut engine = start_test(file!());
    let event = Once::default();
    event.notify().unwrap();
    assert!(event.is_triggered());

    let woken = Rc::new(RefCell::new(false));
    {
        let woken = woken.clone();
        engine.spawn(async move {
            event.listen().await;
            *woken.borrow_mut() = true;
            Ok(())
        });
    }

    run_simulation!(engine);
    assert!(*woken.borrow());
}

/// Each listen waits for a notification made after it.
#[test]
fn repeated_wakes_once_per_notify() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let event = Repeated::default();

    let woken_ns = Rc::new(RefCell::new(Vec::new()));
    {
        let event = event.clone();
        let woken_ns = woken_ns.clone();
        let clock = clock.clone();
        engine.spawn(async move {
            for _ in 0..3 {
                event.listen().await;
                woken_ns.borrow_mut().push(clock.time_now_ns());
            }
            Ok(())
        });
    }

    engine.spawn(async move {
        for _ in 0..3 {
            clock.wait_ticks(2).await;
            event.notify()?;
        }
        Ok(())
    });

    run_simulation!(engine);
    assert_eq!(*woken_ns.borrow(), vec![2.0, 4.0, 6.0]);
}

/// A notify between `listen()` and the first poll is not lost.
#[test]
fn repeated_notify_before_poll() {
    let mut engine = start_test(file!());
    let event = Repeated::default();

    let listen = event.listen();
    event.notify().unwrap();
    let stale = event.listen();

    let woken = Rc::new(RefCell::new(false));
    {
        let woken = woken.clone();
        engine.spawn(async move {
            listen.await;
            *woken.borrow_mut() = true;
            Ok(())
        });
    }
    engine.spawn(async move {
        stale.await;
        sim_error!("no notify after listening")
    });

    run_simulation!(engine);
    assert!(*woken.borrow());
}

#[test]
fn run_until_event() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let done = Once::default();

    {
        let clock = clock.clone();
        let done = done.clone();
        engine.spawn(async move {
            clock.wait_ticks(5).await;
            done.notify()
        });
    }

    // Would run for much longer if not stopped
    engine.spawn(async move {
        clock.wait_ticks(1000).await;
        Ok(())
    });

    engine.run_until(&done).unwrap();
    assert_eq!(engine.time_now_ns(), 5.0);
}

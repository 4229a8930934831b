// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use lanes_components::rate_limiter::RateLimiter;
use lanes_components::rc_limiter;
use lanes_engine::engine::Engine;
use lanes_engine::test_helpers::start_test;
use lanes_engine::traits::TotalBytes;

#[derive(Clone)]
struct Packet {
    total_bytes: usize,
}

impl TotalBytes for Packet {
    fn total_bytes(&self) -> usize {
        self.total_bytes
    }
}

fn time_to_send(engine: &mut Engine, clock_mhz: f64, bits_per_tick: usize, packets: Vec<Packet>) -> f64 {
    let clock = engine.clock_mhz(clock_mhz);
    let limiter = RateLimiter::new(clock, bits_per_tick);
    engine.spawn(async move {
        for packet in packets {
            limiter.delay(&packet).await;
        }
        Ok(())
    });
    engine.run().unwrap();
    engine.time_now_ns()
}

#[test]
fn one_packet() {
    let mut engine = start_test(file!());
    let time = time_to_send(&mut engine, 1000.0, 16, vec![Packet { total_bytes: 4 }]);
    assert_eq!(time, 2.0);
}

#[test]
fn partial_ticks_round_up() {
    let mut engine = start_test(file!());
    // 9 bytes is 72 bits which needs 5 ticks at 16 bits per tick
    let time = time_to_send(&mut engine, 1000.0, 16, vec![Packet { total_bytes: 9 }]);
    assert_eq!(time, 5.0);
}

#[test]
fn slow_clock() {
    let mut engine = start_test(file!());
    let packets = vec![Packet { total_bytes: 8 }; 10];
    let time = time_to_send(&mut engine, 500.0, 32, packets);
    assert_eq!(time, 40.0);
}

#[test]
fn zero_rate_is_clamped() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let limiter = rc_limiter!(clock, 0);
    assert_eq!(limiter.bits_per_tick(), 1);
    assert_eq!(limiter.ticks(&Packet { total_bytes: 2 }), 16);
}

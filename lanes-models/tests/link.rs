// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::rc::Rc;

use lanes_components::connect_port;
use lanes_components::sink::Sink;
use lanes_components::source::Source;
use lanes_engine::engine::Engine;
use lanes_engine::run_simulation;
use lanes_engine::test_helpers::start_test;
use lanes_models::bdf::Bdf;
use lanes_models::link::{Generation, Link, LinkConfig, LinkDirection};
use lanes_models::tlp::Tlp;

/// Drive `tlps` into the downstream request channel and return the sink at
/// the far end. The other channels are connected but idle.
fn drive(engine: &Engine, link: &Rc<Link>, tlps: Vec<Tlp>) -> Rc<Sink<Tlp>> {
    let top = engine.top();

    let down_request = Source::new_and_register(engine, top, "src_dreq", tlps).unwrap();
    let down_response = Source::new_and_register(engine, top, "src_drsp", Vec::<Tlp>::new()).unwrap();
    let up_request = Source::new_and_register(engine, top, "src_ureq", Vec::<Tlp>::new()).unwrap();
    let up_response = Source::new_and_register(engine, top, "src_ursp", Vec::<Tlp>::new()).unwrap();
    connect_port!(down_request, tx => link, down_request_rx).unwrap();
    connect_port!(down_response, tx => link, down_response_rx).unwrap();
    connect_port!(up_request, tx => link, up_request_rx).unwrap();
    connect_port!(up_response, tx => link, up_response_rx).unwrap();

    let sink = Sink::new_and_register(engine, top, "sink_dreq").unwrap();
    sink.record_values();
    let idle_a = Sink::new_and_register(engine, top, "sink_drsp").unwrap();
    let idle_b = Sink::new_and_register(engine, top, "sink_ureq").unwrap();
    let idle_c = Sink::new_and_register(engine, top, "sink_ursp").unwrap();
    connect_port!(link, down_request_tx => sink, rx).unwrap();
    connect_port!(link, down_response_tx => idle_a, rx).unwrap();
    connect_port!(link, up_request_tx => idle_b, rx).unwrap();
    connect_port!(link, up_response_tx => idle_c, rx).unwrap();

    sink
}

fn reads(engine: &Engine, count: u16) -> Vec<Tlp> {
    (0..count)
        .map(|tag| Tlp::read(engine.top(), Bdf::HOST, tag, 0x1000 + u64::from(tag) * 64, 64))
        .collect()
}

#[test]
fn serialization_time() {
    let mut engine = start_test(file!());
    let clock = engine.clock_ghz(1.0);
    let top = engine.top().clone();

    // Gen1 x1 is 2 bits per tick at 1GHz, a 24 byte read header takes 96
    let link = Link::new_and_register(&engine, &clock, &top, "link", LinkConfig::default()).unwrap();
    assert_eq!(link.bits_per_tick(), 2);

    let tlps = reads(&engine, 2);
    let sink = drive(&engine, &link, tlps);

    run_simulation!(engine);

    assert_eq!(sink.num_sunk(), 2);
    assert_eq!(engine.time_now_ns(), 192.0);
}

#[test]
fn wider_link_is_faster() {
    let mut engine = start_test(file!());
    let clock = engine.clock_ghz(1.0);
    let top = engine.top().clone();

    let config = LinkConfig::new(16, Generation::Gen2, 256, 16);
    let link = Link::new_and_register(&engine, &clock, &top, "link", config).unwrap();
    assert_eq!(link.bits_per_tick(), 64);

    // 24 + 256 bytes = 2240 bits = 35 ticks
    let write = Tlp::write(engine.top(), Bdf::HOST, 0, 0x2000, vec![0xab; 256], false);
    let sink = drive(&engine, &link, vec![write]);

    run_simulation!(engine);

    assert_eq!(sink.values()[0].data(), &[0xab; 256][..]);
    assert_eq!(engine.time_now_ns(), 35.0);
}

#[test]
fn preserves_order() {
    let mut engine = start_test(file!());
    let clock = engine.clock_ghz(1.0);
    let top = engine.top().clone();

    let config = LinkConfig::new(4, Generation::Gen3, 256, 4);
    let link = Link::new_and_register(&engine, &clock, &top, "link", config).unwrap();
    let tlps = reads(&engine, 20);
    let sink = drive(&engine, &link, tlps);

    run_simulation!(engine);

    let tags: Vec<u16> = sink.values().iter().map(Tlp::tag).collect();
    assert_eq!(tags, (0..20).collect::<Vec<u16>>());

    let stats = link.stats(LinkDirection::DownstreamRequest);
    assert_eq!(stats.packets, 20);
    assert_eq!(stats.bytes, 20 * 24);
    assert_eq!(stats.occupancy, 0);
}

#[test]
fn queue_is_bounded() {
    let mut engine = start_test(file!());
    let clock = engine.clock_ghz(1.0);
    let top = engine.top().clone();

    let config = LinkConfig::new(1, Generation::Gen1, 128, 2);
    let link = Link::new_and_register(&engine, &clock, &top, "link", config).unwrap();
    let tlps = reads(&engine, 10);
    let sink = drive(&engine, &link, tlps);

    run_simulation!(engine);

    assert_eq!(sink.num_sunk(), 10);
    assert_eq!(link.high_water_mark(), 2);
    assert_eq!(link.stats(LinkDirection::UpstreamRequest).packets, 0);
}

#[test]
fn payload_too_large() {
    let mut engine = start_test(file!());
    let clock = engine.clock_ghz(1.0);
    let top = engine.top().clone();

    let link = Link::new_and_register(&engine, &clock, &top, "link", LinkConfig::default()).unwrap();
    let write = Tlp::write(engine.top(), Bdf::HOST, 0, 0x1000, vec![0; 512], false);
    let sink = drive(&engine, &link, vec![write]);

    run_simulation!(
        engine,
        "Error: top::link::down_request: protocol violation: MWr 00:00.0 tag 0 @0x1000 512B exceeds max payload of 256 bytes"
    );
    assert_eq!(sink.num_sunk(), 0);
}

#[test]
fn invalid_config() {
    let mut engine = start_test(file!());
    let clock = engine.clock_ghz(1.0);
    let top = engine.top().clone();

    let config = LinkConfig::new(3, Generation::Gen4, 100, 0);
    assert_eq!(config.problems().len(), 3);
    assert!(Link::new_and_register(&engine, &clock, &top, "link", config).is_err());
}

#[test]
fn generation_from_number() {
    assert_eq!(Generation::try_from(4).unwrap(), Generation::Gen4);
    assert!(Generation::try_from(6).is_err());
    assert_eq!(Generation::Gen5.to_string(), "Gen5");
}

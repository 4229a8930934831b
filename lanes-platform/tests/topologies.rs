// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::io::Write;

use lanes_engine::run_simulation;
use lanes_engine::test_helpers::start_test;
use lanes_models::link::LinkDirection;
use lanes_models::tlp::TLP_OVERHEAD_BYTES;
use lanes_platform::types::OpSection;
use lanes_platform::{Fabric, parse_topology};
use serial_test::serial;

const REFERENCE: &str = include_str!("../topologies/reference.yaml");

fn packets(fabric: &Fabric, link: &str, direction: LinkDirection) -> usize {
    fabric.link(link).unwrap().stats(direction).packets
}

#[test]
fn reference_topology() {
    let mut engine = start_test(file!());
    let fabric = Fabric::from_string(&mut engine, REFERENCE).unwrap();

    run_simulation!(engine);
    fabric.check_complete().unwrap();

    // Each write is seen by the device before the read that follows it
    assert_eq!(
        fabric.host().pio_read_results(),
        vec![(1, vec![1, 2, 3, 4]), (3, vec![5, 6, 7, 8])]
    );

    let cxl0 = fabric.endpoint("cxl0").unwrap();
    let cxl1 = fabric.endpoint("cxl1").unwrap();
    assert_eq!(cxl0.read_memory(0x4000_0000, 4).unwrap(), vec![1, 2, 3, 4]);
    assert_eq!(cxl1.read_memory(0x4010_0010, 4).unwrap(), vec![5, 6, 7, 8]);
    assert_eq!(cxl0.num_pio_handled(), 2);
    assert_eq!(cxl1.num_pio_handled(), 2);

    assert!(cxl0.interrupt_raised());
    assert!(cxl1.interrupt_raised());
    assert_eq!(cxl0.dma_results().len(), 2);
    assert_eq!(cxl1.dma_results()[0].data.len(), 128);
    assert_eq!(fabric.host().read_memory(0x1000, 4).unwrap(), vec![9; 4]);
    assert_eq!(fabric.host().num_dma_served(), 3);

    // DMA completions return down the pair their requests came up
    assert_eq!(packets(&fabric, "pcie3", LinkDirection::UpstreamRequest), 2);
    assert_eq!(packets(&fabric, "pcie3", LinkDirection::DownstreamResponse), 2);
    assert_eq!(packets(&fabric, "pcie1", LinkDirection::UpstreamRequest), 1);
    assert_eq!(packets(&fabric, "pcie1", LinkDirection::DownstreamResponse), 1);
    assert_eq!(packets(&fabric, "pcie4", LinkDirection::DownstreamResponse), 1);

    // Only the two PIO reads are answered
    assert_eq!(packets(&fabric, "pcie3", LinkDirection::UpstreamResponse), 1);
    assert_eq!(packets(&fabric, "pcie1", LinkDirection::UpstreamResponse), 1);

    for link in fabric.links() {
        assert!(link.high_water_mark() <= 10);
    }
}

#[test]
fn components_by_name() {
    let mut engine = start_test(file!());
    let fabric = Fabric::from_string(&mut engine, REFERENCE).unwrap();

    assert_eq!(fabric.switches().len(), 1);
    assert_eq!(fabric.endpoints().len(), 2);
    assert_eq!(fabric.links().len(), 3);
    assert_eq!(fabric.endpoint("cxl1").unwrap().bdf().to_string(), "04:00.0");
    assert_eq!(fabric.switch("switch").unwrap().num_downstream_ports(), 1);
    assert!(fabric.link("pcie2").is_err());

    let summary = fabric.to_string();
    assert!(summary.contains("03:00.0"));
    assert!(summary.contains("pcie4"));
}

const ONE_LEVEL: &str = "
root_complex: { name: rc, num_downstream_ports: 2 }
endpoints:
  - { name: a, pci_bus: 1, pci_dev: 0, pci_func: 0, bar_address: 0x1000_0000, bar_size: 4KiB }
  - { name: b, pci_bus: 2, pci_dev: 0, pci_func: 0, bar_address: 0x2000_0000, bar_size: 4KiB, max_outstanding_dma: 8 }
links:
  - { name: la, upstream: root_complex.rc.downstream0, downstream: endpoint.a.upstream }
  - { name: lb, max_queue_size: 1, upstream: root_complex.rc.downstream1, downstream: endpoint.b.upstream }
";

fn with_reads(count: u64, size: u64) -> Vec<OpSection> {
    (0..count)
        .map(|i| OpSection::read(0x10_0000 + i * 0x1000, size))
        .collect()
}

#[test]
fn queue_bound_holds_under_load() {
    let mut engine = start_test(file!());
    let mut cfg = parse_topology(ONE_LEVEL).unwrap();
    cfg.endpoints[1].dma = with_reads(16, 256);
    let fabric = Fabric::build(&mut engine, &cfg).unwrap();

    run_simulation!(engine);
    fabric.check_complete().unwrap();

    let lb = fabric.link("lb").unwrap();
    assert_eq!(fabric.endpoint("b").unwrap().num_dma_completed(), 16);
    assert_eq!(lb.high_water_mark(), 1);
    assert_eq!(lb.stats(LinkDirection::DownstreamResponse).bytes, 16 * (256 + TLP_OVERHEAD_BYTES));
}

#[test]
fn stopped_with_transactions_in_flight() {
    let mut engine = start_test(file!());
    let mut cfg = parse_topology(ONE_LEVEL).unwrap();
    cfg.endpoints[0].dma = with_reads(1, 4);
    cfg.endpoints[1].dma = with_reads(16, 4096);
    let fabric = Fabric::build(&mut engine, &cfg).unwrap();

    let done = fabric.endpoint("a").unwrap().dma_done();
    engine.run_until(&done).unwrap();

    assert!(fabric.num_outstanding() > 0);
    let error = fabric.check_complete().unwrap_err().to_string();
    assert!(error.starts_with("Error: top::fabric: deadlock with "));
}

#[test]
#[serial(topology_file)]
fn from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(REFERENCE.as_bytes()).unwrap();

    let mut engine = start_test(file!());
    let fabric = Fabric::from_file(&mut engine, file.path()).unwrap();
    run_simulation!(engine);
    fabric.check_complete().unwrap();
    assert_eq!(fabric.host().num_dma_served(), 3);
}

#[test]
#[serial(topology_file)]
fn from_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.yaml");

    let mut engine = start_test(file!());
    let Err(errors) = Fabric::from_file(&mut engine, &path) else {
        panic!("expected a missing topology file to be reported");
    };
    assert_eq!(errors.len(), 1);
    assert!(errors.to_string().contains("missing.yaml"));
}

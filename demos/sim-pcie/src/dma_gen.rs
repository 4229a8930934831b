// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Seeded random DMA programs.

use lanes_models::link;
use lanes_platform::types::{OpSection, TopologyConfig};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

/// Bytes of host memory given to the random DMA of each endpoint.
pub const REGION_BYTES: u64 = 0x10_0000;

/// Base of the host memory used by random DMA.
pub const REGION_BASE: u64 = 0x1_0000_0000;

/// Generates the random DMA program of one endpoint.
///
/// Every endpoint works within its own region of host memory so that the
/// data read back by one endpoint is never changed by another.
pub struct DmaGen {
    rng: Xoshiro256PlusPlus,
    base: u64,
    max_bytes: u64,
}

impl DmaGen {
    #[must_use]
    pub fn new(seed: u64, endpoint_index: usize, max_bytes: u64) -> Self {
        // Create a local RNG which is different per endpoint
        let rng = Xoshiro256PlusPlus::seed_from_u64(seed ^ (endpoint_index as u64));
        Self {
            rng,
            base: REGION_BASE + endpoint_index as u64 * REGION_BYTES,
            max_bytes: max_bytes.clamp(1, REGION_BYTES),
        }
    }

    fn next_op(&mut self) -> OpSection {
        let size = self.rng.gen_range(1..=self.max_bytes);
        let offset = self.rng.gen_range(0..=REGION_BYTES - size) & !3;
        let address = self.base + offset;
        if self.rng.gen_bool(0.5) {
            OpSection::read(address, size)
        } else {
            let mut data = vec![0; size as usize];
            self.rng.fill(data.as_mut_slice());
            OpSection::write(address, data)
        }
    }

    pub fn program(&mut self, num_ops: usize) -> Vec<OpSection> {
        (0..num_ops).map(|_| self.next_op()).collect()
    }
}

/// Largest payload every link of the topology can carry.
#[must_use]
pub fn smallest_max_payload(topology: &TopologyConfig) -> u64 {
    let default = link::DEFAULT_MAX_PAYLOAD_BYTES as u64;
    topology
        .links
        .iter()
        .map(|l| l.max_payload_bytes.unwrap_or(default))
        .min()
        .unwrap_or(default)
}

/// Append `num_ops` random operations to the DMA program of every endpoint.
pub fn add_random_dma(topology: &mut TopologyConfig, num_ops: usize, max_bytes: u64, seed: u64) {
    let max_bytes = max_bytes.min(smallest_max_payload(topology));
    for (i, endpoint) in topology.endpoints.iter_mut().enumerate() {
        let mut dma_gen = DmaGen::new(seed, i, max_bytes);
        endpoint.dma.extend(dma_gen.program(num_ops));
    }
}

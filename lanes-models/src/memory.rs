// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Sparse byte-addressable memory.
//!
//! Storage is allocated a page at a time on first write. Bytes that have
//! never been written read as zero. An access may not run past the top of the
//! 64-bit address space.

use std::collections::BTreeMap;

use lanes_engine::sim_error;
use lanes_engine::types::{SimError, SimResult};

pub const PAGE_BYTES: u64 = 4096;

#[derive(Default)]
pub struct SparseMemory {
    pages: BTreeMap<u64, Box<[u8]>>,
}

impl SparseMemory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, address: u64, length: usize) -> Result<Vec<u8>, SimError> {
        check_access(address, length)?;
        let mut data = vec![0; length];
        let mut done = 0;
        while done < length {
            let current = address + done as u64;
            let (page, offset) = split(current);
            let chunk = chunk_len(offset, length - done);
            if let Some(bytes) = self.pages.get(&page) {
                data[done..done + chunk].copy_from_slice(&bytes[offset..offset + chunk]);
            }
            done += chunk;
        }
        Ok(data)
    }

    pub fn write(&mut self, address: u64, data: &[u8]) -> SimResult {
        check_access(address, data.len())?;
        let mut done = 0;
        while done < data.len() {
            let current = address + done as u64;
            let (page, offset) = split(current);
            let chunk = chunk_len(offset, data.len() - done);
            let bytes = self
                .pages
                .entry(page)
                .or_insert_with(|| vec![0; PAGE_BYTES as usize].into_boxed_slice());
            bytes[offset..offset + chunk].copy_from_slice(&data[done..done + chunk]);
            done += chunk;
        }
        Ok(())
    }

    /// Number of pages that have been allocated.
    #[must_use]
    pub fn num_pages(&self) -> usize {
        self.pages.len()
    }
}

/// Address of the last byte of an access, if it does not wrap.
#[must_use]
pub fn access_end(address: u64, length: usize) -> Option<u64> {
    address.checked_add((length as u64).saturating_sub(1))
}

fn check_access(address: u64, length: usize) -> SimResult {
    match access_end(address, length) {
        Some(_) => Ok(()),
        None => sim_error!("{length} byte access at 0x{address:x} runs past the end of memory"),
    }
}

fn split(address: u64) -> (u64, usize) {
    (address / PAGE_BYTES, (address % PAGE_BYTES) as usize)
}

fn chunk_len(offset: usize, remaining: usize) -> usize {
    (PAGE_BYTES as usize - offset).min(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_reads_zero() {
        let memory = SparseMemory::new();
        assert_eq!(memory.read(0x1234, 4).unwrap(), vec![0; 4]);
        assert_eq!(memory.num_pages(), 0);
    }

    #[test]
    fn write_across_pages() {
        let mut memory = SparseMemory::new();
        let data: Vec<u8> = (0..16).collect();
        memory.write(PAGE_BYTES - 8, &data).unwrap();
        assert_eq!(memory.num_pages(), 2);
        assert_eq!(memory.read(PAGE_BYTES - 8, 16).unwrap(), data);
        assert_eq!(memory.read(PAGE_BYTES - 10, 4).unwrap(), vec![0, 0, 0, 1]);
    }

    #[test]
    fn top_of_address_space() {
        let mut memory = SparseMemory::new();
        memory.write(u64::MAX - 3, &[1, 2, 3, 4]).unwrap();
        assert_eq!(memory.read(u64::MAX - 3, 4).unwrap(), vec![1, 2, 3, 4]);

        let error = memory.read(0xffff_ffff_ffff_fff0, 64).unwrap_err();
        assert!(error.to_string().contains("runs past the end of memory"));
        assert!(memory.write(u64::MAX, &[1, 2]).is_err());
        assert_eq!(memory.num_pages(), 1);
    }
}

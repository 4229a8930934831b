// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Transaction layer packets.
//!
//! A [Tlp] is the unit carried by a [Link](crate::link::Link). Requests are
//! routed by address while completions are routed back to their requester
//! using the `(requester, tag)` pair copied from the request.

use std::fmt;
use std::rc::Rc;

use lanes_engine::traits::{SimObject, TotalBytes};
use lanes_track::entity::Entity;
use lanes_track::Unique;
use lanes_track::{Id, create, create_id};

use crate::bdf::Bdf;

/// Bytes of framing, sequence number, header and LCRC around every TLP.
pub const TLP_OVERHEAD_BYTES: usize = 24;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TlpKind {
    MemRead,
    MemWrite,
    MemWriteNonPosted,
    Completion,
    CompletionData,
}

impl TlpKind {
    #[must_use]
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            TlpKind::MemRead | TlpKind::MemWrite | TlpKind::MemWriteNonPosted
        )
    }

    #[must_use]
    pub fn is_completion(&self) -> bool {
        !self.is_request()
    }

    /// Requests that expect exactly one completion.
    #[must_use]
    pub fn is_non_posted(&self) -> bool {
        matches!(self, TlpKind::MemRead | TlpKind::MemWriteNonPosted)
    }

    #[must_use]
    pub fn carries_data(&self) -> bool {
        matches!(
            self,
            TlpKind::MemWrite | TlpKind::MemWriteNonPosted | TlpKind::CompletionData
        )
    }
}

impl fmt::Display for TlpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TlpKind::MemRead => "MRd",
            TlpKind::MemWrite => "MWr",
            TlpKind::MemWriteNonPosted => "MWrNP",
            TlpKind::Completion => "Cpl",
            TlpKind::CompletionData => "CplD",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug)]
pub struct Tlp {
    id: Id,
    kind: TlpKind,
    requester: Bdf,
    tag: u16,
    address: u64,
    length_bytes: usize,
    data: Vec<u8>,
}

impl Tlp {
    fn build(
        created_by: &Rc<Entity>,
        kind: TlpKind,
        requester: Bdf,
        tag: u16,
        address: u64,
        length_bytes: usize,
        data: Vec<u8>,
    ) -> Self {
        let tlp = Self {
            id: create_id!(created_by),
            kind,
            requester,
            tag,
            address,
            length_bytes,
            data,
        };
        create!(created_by ; tlp, tlp.total_bytes(), kind as i8);
        tlp
    }

    /// A memory read of `length_bytes` at `address`.
    #[must_use]
    pub fn read(
        created_by: &Rc<Entity>,
        requester: Bdf,
        tag: u16,
        address: u64,
        length_bytes: usize,
    ) -> Self {
        Self::build(
            created_by,
            TlpKind::MemRead,
            requester,
            tag,
            address,
            length_bytes,
            Vec::new(),
        )
    }

    /// A memory write of `data` at `address`.
    #[must_use]
    pub fn write(
        created_by: &Rc<Entity>,
        requester: Bdf,
        tag: u16,
        address: u64,
        data: Vec<u8>,
        non_posted: bool,
    ) -> Self {
        let kind = if non_posted {
            TlpKind::MemWriteNonPosted
        } else {
            TlpKind::MemWrite
        };
        let length_bytes = data.len();
        Self::build(
            created_by,
            kind,
            requester,
            tag,
            address,
            length_bytes,
            data,
        )
    }

    /// The completion for this request. A read completes with the data
    /// given, a non-posted write with no data.
    #[must_use]
    pub fn completion(&self, created_by: &Rc<Entity>, data: Vec<u8>) -> Self {
        let kind = if self.kind == TlpKind::MemRead {
            TlpKind::CompletionData
        } else {
            TlpKind::Completion
        };
        let length_bytes = if kind == TlpKind::CompletionData {
            data.len()
        } else {
            0
        };
        Self::build(
            created_by,
            kind,
            self.requester,
            self.tag,
            self.address,
            length_bytes,
            data,
        )
    }

    #[must_use]
    pub fn kind(&self) -> TlpKind {
        self.kind
    }

    #[must_use]
    pub fn requester(&self) -> Bdf {
        self.requester
    }

    #[must_use]
    pub fn tag(&self) -> u16 {
        self.tag
    }

    /// The key used to match a completion with its request.
    #[must_use]
    pub fn transaction(&self) -> (Bdf, u16) {
        (self.requester, self.tag)
    }

    #[must_use]
    pub fn address(&self) -> u64 {
        self.address
    }

    #[must_use]
    pub fn length_bytes(&self) -> usize {
        self.length_bytes
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Bytes of payload carried on the wire.
    #[must_use]
    pub fn payload_bytes(&self) -> usize {
        if self.kind.carries_data() {
            self.length_bytes
        } else {
            0
        }
    }
}

impl fmt::Display for Tlp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} tag {} @0x{:x} {}B",
            self.kind, self.requester, self.tag, self.address, self.length_bytes
        )
    }
}

impl TotalBytes for Tlp {
    fn total_bytes(&self) -> usize {
        TLP_OVERHEAD_BYTES + self.payload_bytes()
    }
}

impl Unique for Tlp {
    fn id(&self) -> Id {
        self.id
    }
}

impl SimObject for Tlp {}

#[cfg(test)]
mod tests {
    use lanes_track::entity::toplevel;
    use lanes_track::tracker::dev_null_tracker;

    use super::*;

    #[test]
    fn wire_sizes() {
        let top = toplevel(&dev_null_tracker(), "top");
        let requester = Bdf::new(3, 0, 0).unwrap();

        let read = Tlp::read(&top, requester, 1, 0x1000, 64);
        assert_eq!(read.total_bytes(), TLP_OVERHEAD_BYTES);

        let write = Tlp::write(&top, requester, 2, 0x1000, vec![0; 128], false);
        assert_eq!(write.total_bytes(), TLP_OVERHEAD_BYTES + 128);

        let cpl = read.completion(&top, vec![7; 64]);
        assert_eq!(cpl.kind(), TlpKind::CompletionData);
        assert_eq!(cpl.total_bytes(), TLP_OVERHEAD_BYTES + 64);
        assert_eq!(cpl.transaction(), (requester, 1));
    }

    #[test]
    fn write_completion_has_no_data() {
        let top = toplevel(&dev_null_tracker(), "top");
        let write = Tlp::write(&top, Bdf::HOST, 9, 0x40, vec![1, 2], true);
        assert!(write.kind().is_non_posted());

        let cpl = write.completion(&top, Vec::new());
        assert_eq!(cpl.kind(), TlpKind::Completion);
        assert_eq!(cpl.payload_bytes(), 0);
        assert!(cpl.kind().is_completion());
    }
}

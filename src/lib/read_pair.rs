//! Aligned read pairs as they enter the collapse pipeline.

use bstr::BString;
use noodles::sam::alignment::record::cigar::op::{Kind, Op};

use crate::alignment::{AlignedBases, reference_length};

/// Orientation of a read relative to the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Strand {
    Forward,
    Reverse,
}

/// Which strand of the original duplex molecule a pair was sequenced from.
///
/// A pair is `Top` when mate A is its leftmost mate and `Bottom` when mate B is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceStrand {
    Top,
    Bottom,
}

/// One aligned read of a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mate {
    /// Index of the reference sequence in the input header
    pub ref_id: usize,
    /// 1-based alignment start
    pub start: usize,
    pub strand: Strand,
    pub cigar: Vec<Op>,
    /// Bases in reference orientation
    pub bases: Vec<u8>,
    /// Phred qualities, parallel to `bases`
    pub quals: Vec<u8>,
    /// Mismatches to the reference (the `NM` tag) when known
    pub mismatches: Option<u32>,
}

impl Mate {
    /// A mate with an all-match CIGAR covering its bases.
    #[must_use]
    pub fn new(ref_id: usize, start: usize, strand: Strand, bases: &[u8], quals: &[u8]) -> Self {
        Self {
            ref_id,
            start,
            strand,
            cigar: vec![Op::new(Kind::Match, bases.len())],
            bases: bases.to_vec(),
            quals: quals.to_vec(),
            mismatches: None,
        }
    }

    /// 1-based inclusive alignment end.
    #[must_use]
    pub fn end(&self) -> usize {
        (self.start + reference_length(&self.cigar)).saturating_sub(1).max(self.start)
    }

    /// True when every base has a quality; BAM records stored with QUAL `*` have none.
    #[must_use]
    pub fn has_qualities(&self) -> bool {
        self.quals.len() == self.bases.len()
    }

    /// The aligned bases of this mate in reference order.
    #[must_use]
    pub fn aligned(&self) -> AlignedBases<'_> {
        AlignedBases::new(&self.cigar, self.start)
    }
}

/// Two mated reads and the barcode fragment read from their adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPair {
    pub name: BString,
    pub mate_a: Mate,
    pub mate_b: Mate,
    /// Raw barcode fragment, with any separator between mate halves removed
    pub barcode: Vec<u8>,
}

impl ReadPair {
    /// True when the mates map to different reference sequences.
    #[must_use]
    pub fn is_discordant(&self) -> bool {
        self.mate_a.ref_id != self.mate_b.ref_id
    }

    /// True when mate A is the leftmost mate.
    ///
    /// On equal starts the forward mate is leftmost; when both mates share a strand, mate A is.
    #[must_use]
    pub fn mate_a_is_leftmost(&self) -> bool {
        let (a, b) = (&self.mate_a, &self.mate_b);
        a.start < b.start
            || (a.start == b.start && !(a.strand == Strand::Reverse && b.strand == Strand::Forward))
    }

    /// Strand of the source molecule this pair was read from.
    #[must_use]
    pub fn source_strand(&self) -> SourceStrand {
        if self.mate_a_is_leftmost() { SourceStrand::Top } else { SourceStrand::Bottom }
    }

    /// The leftmost mate.
    #[must_use]
    pub fn leftmost(&self) -> &Mate {
        if self.mate_a_is_leftmost() { &self.mate_a } else { &self.mate_b }
    }

    /// The mates as (leftmost, rightmost).
    #[must_use]
    pub fn oriented(&self) -> (&Mate, &Mate) {
        if self.mate_a_is_leftmost() {
            (&self.mate_a, &self.mate_b)
        } else {
            (&self.mate_b, &self.mate_a)
        }
    }

    /// Reference index and 1-based start of the leftmost mate.
    #[must_use]
    pub fn coordinate(&self) -> (usize, usize) {
        let left = self.leftmost();
        (left.ref_id, left.start)
    }
}

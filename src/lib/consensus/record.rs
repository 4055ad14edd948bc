//! Consensus output records.

use noodles::sam::alignment::record::cigar::op::Op;

use crate::alignment::{AlignedBases, reference_length};
use crate::grouper::{Family, StrandCounts};
use crate::read_pair::{Mate, Strand};

/// One consensus read, aligned to the reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusRecord {
    pub ref_id: usize,
    /// 1-based alignment start
    pub start: usize,
    pub strand: Strand,
    pub cigar: Vec<Op>,
    pub bases: Vec<u8>,
    pub quals: Vec<u8>,
    /// Observations counted at each base
    pub depths: Vec<u16>,
    /// Observations disagreeing with the call at each base
    pub errors: Vec<u16>,
}

impl ConsensusRecord {
    /// A record carrying `mate` unchanged, as for a family of one.
    #[must_use]
    pub fn from_mate(mate: &Mate) -> Self {
        Self {
            ref_id: mate.ref_id,
            start: mate.start,
            strand: mate.strand,
            cigar: mate.cigar.clone(),
            bases: mate.bases.clone(),
            quals: mate.quals.clone(),
            depths: vec![1; mate.bases.len()],
            errors: vec![0; mate.bases.len()],
        }
    }

    /// 1-based inclusive alignment end.
    #[must_use]
    pub fn end(&self) -> usize {
        (self.start + reference_length(&self.cigar)).saturating_sub(1).max(self.start)
    }

    #[must_use]
    pub fn aligned(&self) -> AlignedBases<'_> {
        AlignedBases::new(&self.cigar, self.start)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    #[must_use]
    pub fn max_depth(&self) -> u16 {
        self.depths.iter().copied().max().unwrap_or(0)
    }

    #[must_use]
    pub fn min_depth(&self) -> u16 {
        self.depths.iter().copied().min().unwrap_or(0)
    }

    /// Fraction of counted observations that disagreed with the consensus.
    #[must_use]
    pub fn error_rate(&self) -> f32 {
        let depth: u64 = self.depths.iter().map(|&d| u64::from(d)).sum();
        if depth == 0 {
            return 0.0;
        }
        let errors: u64 = self.errors.iter().map(|&e| u64::from(e)).sum();
        (errors as f64 / depth as f64) as f32
    }
}

/// Family-level annotations carried alongside the consensus reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilySummary {
    pub family_id: u64,
    pub ref_id: usize,
    pub bin: usize,
    pub strand: Strand,
    pub barcode: Vec<u8>,
    pub size: usize,
    pub strand_counts: StrandCounts,
    pub strand_biased: bool,
}

impl FamilySummary {
    #[must_use]
    pub fn new(family: &Family, strand_biased: bool) -> Self {
        Self {
            family_id: family.id,
            ref_id: family.ref_id,
            bin: family.bin,
            strand: family.strand,
            barcode: family.barcode.clone(),
            size: family.size(),
            strand_counts: family.strand_counts,
            strand_biased,
        }
    }
}

/// The consensus of a family: one record for the leftmost mates (`mate_a`) and one for the
/// rightmost (`mate_b`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusPair {
    pub summary: FamilySummary,
    pub mate_a: ConsensusRecord,
    pub mate_b: ConsensusRecord,
}

/// A consensus pair after its overlapping region has been reconciled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledPair {
    pub summary: FamilySummary,
    pub mate_a: ConsensusRecord,
    pub mate_b: ConsensusRecord,
    /// 1-based reference positions where the mates disagreed at equal quality
    pub low_confidence: Vec<usize>,
}

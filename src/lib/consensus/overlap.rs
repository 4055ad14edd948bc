//! Reconciling the reference positions covered by both consensus mates.
//!
//! Where the leftmost and rightmost consensus reads overlap they observe the same molecule
//! positions. Agreeing positions gain confidence. Disagreeing positions are resolved to the
//! strictly higher quality call, and a disagreement at equal quality is kept as-is and
//! reported as low-confidence.

use std::cmp::Ordering;

use crate::metrics::CollapseMetrics;
use crate::phred::{MIN_PHRED, NO_CALL_BASE, PhredScore};

use super::record::{ConsensusPair, ConsensusRecord, ReconciledPair};

/// How the quality of an agreeing overlapping base is adjusted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AgreementStrategy {
    /// Sum the two qualities, capped at the maximum consensus quality
    #[default]
    Consensus,
    /// Use the higher of the two qualities
    MaxQual,
    /// Leave both qualities unchanged
    PassThrough,
}

/// Applies overlap reconciliation to consensus pairs.
#[derive(Debug, Clone, Copy)]
pub struct OverlapReconciler {
    agreement: AgreementStrategy,
    max_quality: PhredScore,
}

impl OverlapReconciler {
    #[must_use]
    pub fn new(agreement: AgreementStrategy, max_quality: PhredScore) -> Self {
        Self { agreement, max_quality }
    }

    /// Reconciles the overlap of `pair`, counting what happened in `stats`.
    ///
    /// Positions outside the overlap are untouched. Within it, the two output bases are
    /// either identical or the reference position is listed in `low_confidence`.
    #[must_use]
    pub fn reconcile(&self, pair: ConsensusPair, stats: &mut CollapseMetrics) -> ReconciledPair {
        let ConsensusPair { summary, mut mate_a, mut mate_b } = pair;
        let mut low_confidence = Vec::new();

        if mate_a.ref_id == mate_b.ref_id && mate_a.start <= mate_b.end() && mate_b.start <= mate_a.end() {
            for (ref_pos, i, j) in shared_positions(&mate_a, &mate_b) {
                stats.overlapping_bases += 1;
                if !self.resolve(&mut mate_a, i, &mut mate_b, j, stats) {
                    low_confidence.push(ref_pos);
                }
            }
        }

        ReconciledPair { summary, mate_a, mate_b, low_confidence }
    }

    /// Resolves one shared position, returning false when it stays ambiguous.
    fn resolve(
        &self,
        a: &mut ConsensusRecord,
        i: usize,
        b: &mut ConsensusRecord,
        j: usize,
        stats: &mut CollapseMetrics,
    ) -> bool {
        let (base_a, qual_a) = (a.bases[i], a.quals[i]);
        let (base_b, qual_b) = (b.bases[j], b.quals[j]);

        if base_a == base_b {
            if base_a != NO_CALL_BASE {
                stats.overlap_agreements += 1;
                let qual = match self.agreement {
                    AgreementStrategy::Consensus => qual_a.saturating_add(qual_b).min(self.max_quality),
                    AgreementStrategy::MaxQual => qual_a.max(qual_b),
                    AgreementStrategy::PassThrough => return true,
                };
                a.quals[i] = qual;
                b.quals[j] = qual;
            }
            return true;
        }

        stats.overlap_disagreements += 1;
        let (base, qual) = match qual_a.cmp(&qual_b) {
            Ordering::Greater => (base_a, qual_a - qual_b),
            Ordering::Less => (base_b, qual_b - qual_a),
            Ordering::Equal => {
                stats.low_confidence_positions += 1;
                a.quals[i] = MIN_PHRED;
                b.quals[j] = MIN_PHRED;
                return false;
            }
        };
        stats.overlap_corrections += 1;
        let qual = qual.max(MIN_PHRED);
        a.bases[i] = base;
        b.bases[j] = base;
        a.quals[i] = qual;
        b.quals[j] = qual;
        true
    }
}

/// Reference positions aligned in both records, with each record's read offset there.
fn shared_positions(a: &ConsensusRecord, b: &ConsensusRecord) -> Vec<(usize, usize, usize)> {
    let mut shared = Vec::new();
    let mut left = a.aligned().peekable();
    let mut right = b.aligned().peekable();
    while let (Some(x), Some(y)) = (left.peek().copied(), right.peek().copied()) {
        match x.ref_pos.cmp(&y.ref_pos) {
            Ordering::Less => {
                left.next();
            }
            Ordering::Greater => {
                right.next();
            }
            Ordering::Equal => {
                if x.read_offset < a.len().min(a.quals.len()) && y.read_offset < b.len().min(b.quals.len()) {
                    shared.push((x.ref_pos, x.read_offset, y.read_offset));
                }
                left.next();
                right.next();
            }
        }
    }
    shared
}

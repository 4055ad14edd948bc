//! Building one consensus record per mate for each closed family.

use noodles::sam::alignment::record::cigar::op::Kind;

use crate::alignment::push_op;
use crate::config::ConsensusOptions;
use crate::grouper::Family;
use crate::phred::NO_CALL_BASE;
use crate::read_pair::{Mate, SourceStrand, Strand};
use crate::reference::ReferenceReader;

use super::record::{ConsensusPair, ConsensusRecord, FamilySummary};
use super::tally::{BaseTally, ErrorModel};

/// One base of one member at one reference position.
///
/// The derived ordering puts observations into a canonical order before they are summed, so
/// the consensus does not depend on the order of the family's members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Observation {
    ref_pos: usize,
    base: u8,
    qual: u8,
    source: SourceStrand,
}

/// Computes consensus pairs from families.
///
/// A builder holds no per-family state, so one instance can serve many threads.
#[derive(Debug, Clone)]
pub struct ConsensusBuilder {
    model: ErrorModel,
    options: ConsensusOptions,
    reference: Option<ReferenceReader>,
    /// Families can hold both source strands, so their composition is evaluated
    strand_bias: bool,
}

impl ConsensusBuilder {
    #[must_use]
    pub fn new(options: ConsensusOptions, reference: Option<ReferenceReader>) -> Self {
        let model = ErrorModel::new(options.error_rate_pre_umi, options.error_rate_post_umi);
        Self { model, options, reference, strand_bias: true }
    }

    /// Turns the strand-bias flag on or off.
    ///
    /// Without duplex joining every family holds a single source strand, so the flag would
    /// be raised on every family large enough to be evaluated.
    #[must_use]
    pub fn with_strand_bias(mut self, enabled: bool) -> Self {
        self.strand_bias = enabled;
        self
    }

    /// Builds the consensus of `family`.
    ///
    /// A family of one is passed through with its bases, qualities and alignment unchanged.
    /// Otherwise each side (leftmost mates, rightmost mates) is voted position by position
    /// over the reference span its members cover.
    #[must_use]
    pub fn build(&self, family: &Family) -> ConsensusPair {
        let strand_biased = self.strand_bias
            && family
                .strand_counts
                .is_biased(self.options.strand_bias_threshold, self.options.min_strand_bias_family_size);
        let summary = FamilySummary::new(family, strand_biased);

        if let [only] = &family.members[..] {
            let (left, right) = only.oriented();
            return ConsensusPair {
                summary,
                mate_a: ConsensusRecord::from_mate(left),
                mate_b: ConsensusRecord::from_mate(right),
            };
        }

        let favoured = family.strand_counts.majority();
        let (lefts, rights): (Vec<_>, Vec<_>) = family
            .members
            .iter()
            .map(|pair| {
                let (left, right) = pair.oriented();
                let source = pair.source_strand();
                ((left, source), (right, source))
            })
            .unzip();

        ConsensusPair {
            summary,
            mate_a: self.build_side(&lefts, favoured),
            mate_b: self.build_side(&rights, favoured),
        }
    }

    fn build_side(&self, mates: &[(&Mate, SourceStrand)], favoured: Option<SourceStrand>) -> ConsensusRecord {
        let mut observations: Vec<Observation> = Vec::new();
        for &(mate, source) in mates {
            for pos in mate.aligned() {
                let (Some(&base), Some(&qual)) = (mate.bases.get(pos.read_offset), mate.quals.get(pos.read_offset))
                else {
                    break;
                };
                observations.push(Observation { ref_pos: pos.ref_pos, base: base.to_ascii_uppercase(), qual, source });
            }
        }
        observations.sort_unstable();

        let Some(first) = observations.first() else {
            return ConsensusRecord::from_mate(mates[0].0);
        };
        let ref_id = mates[0].0.ref_id;
        let forward = mates.iter().filter(|(m, _)| m.strand == Strand::Forward).count();
        let strand = if forward * 2 >= mates.len() { Strand::Forward } else { Strand::Reverse };

        let mut record = ConsensusRecord {
            ref_id,
            start: first.ref_pos,
            strand,
            cigar: Vec::new(),
            bases: Vec::new(),
            quals: Vec::new(),
            depths: Vec::new(),
            errors: Vec::new(),
        };

        let mut tally = BaseTally::new(&self.model);
        let mut next_pos = first.ref_pos;
        for column in observations.chunk_by(|a, b| a.ref_pos == b.ref_pos) {
            let ref_pos = column[0].ref_pos;
            push_op(&mut record.cigar, Kind::Deletion, ref_pos - next_pos);

            // A column with no base at the minimum quality is voted over all of its bases.
            let min_qual = self.options.min_input_base_quality;
            let min_qual = if column.iter().any(|o| o.qual >= min_qual) { min_qual } else { 0 };
            tally.reset();
            for obs in column.iter().filter(|o| o.qual >= min_qual) {
                tally.add(obs.base, obs.qual, obs.source);
            }
            let reference_base = self.reference.as_ref().and_then(|r| r.base_at(ref_id, ref_pos));
            let (base, qual) = tally.call(reference_base, favoured);
            let depth = tally.contributions();
            let errors = if base == NO_CALL_BASE { 0 } else { depth - tally.observations_for(base) };

            record.bases.push(base);
            record.quals.push(qual.min(self.options.max_consensus_quality));
            record.depths.push(u16::try_from(depth).unwrap_or(u16::MAX));
            record.errors.push(u16::try_from(errors).unwrap_or(u16::MAX));
            push_op(&mut record.cigar, Kind::Match, 1);
            next_pos = ref_pos + 1;
        }
        record
    }
}

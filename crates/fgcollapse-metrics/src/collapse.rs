//! Run-scoped statistics for a collapse run.
//!
//! A single [`CollapseMetrics`] value is threaded through each pipeline stage. Stages running
//! on separate threads each own one, and they are combined with [`CollapseMetrics::merge`]
//! once the run completes. The result is written as a one-row TSV.

use serde::{Deserialize, Serialize};

use crate::family_size::FamilySizeHistogram;
use crate::rejection::RejectionReason;
use crate::{Metric, ProcessingMetrics};

/// Counts describing one collapse run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollapseMetrics {
    /// Read pairs presented for grouping, including those later excluded
    pub total_pairs: u64,

    /// Read pairs assigned to a family
    pub accepted_pairs: u64,

    /// Pairs excluded for a malformed barcode
    pub discarded_malformed_barcode: u64,

    /// Pairs excluded because the mates mapped to different chromosomes
    pub discarded_discordant: u64,

    /// Pairs excluded as chimeric (only when chimeric pairs are discarded)
    pub discarded_chimeric: u64,

    /// Pairs excluded for too many reference mismatches
    pub discarded_excessive_mismatches: u64,

    /// Pairs excluded because a mate carried no base qualities
    pub discarded_missing_qualities: u64,

    /// Records whose mate never appeared
    pub unpaired_records: u64,

    /// Records skipped as unmapped, secondary, supplementary or QC-failed
    pub filtered_records: u64,

    /// Accepted pairs whose barcode contained at least one N
    pub barcodes_with_no_calls: u64,

    /// Pairs whose barcode exceeded the adapter pattern mismatch limit
    pub chimeric_barcodes: u64,

    /// Families formed
    pub families: u64,

    /// Families with exactly one member
    pub singleton_families: u64,

    /// Families flagged for strand bias
    pub strand_biased_families: u64,

    /// Consensus pairs written
    pub consensus_pairs: u64,

    /// Reads removed by collapsing: sum over families of (size - 1) * 2
    pub reads_collapsed: u64,

    /// Reference positions covered by both consensus mates
    pub overlapping_bases: u64,

    /// Overlapping positions where both mates agreed
    pub overlap_agreements: u64,

    /// Overlapping positions where the mates disagreed
    pub overlap_disagreements: u64,

    /// Disagreements resolved in favour of the higher-quality mate
    pub overlap_corrections: u64,

    /// Disagreements left unresolved and marked low-confidence
    pub low_confidence_positions: u64,

    /// Mean read pairs per family
    pub mean_family_size: f64,

    #[serde(skip)]
    pub family_sizes: FamilySizeHistogram,
}

impl CollapseMetrics {
    /// Creates an empty metrics object.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one excluded pair or record.
    pub fn record_rejection(&mut self, reason: RejectionReason) {
        match reason {
            RejectionReason::MalformedBarcode => self.discarded_malformed_barcode += 1,
            RejectionReason::DiscordantPair => self.discarded_discordant += 1,
            RejectionReason::ChimericBarcode => self.discarded_chimeric += 1,
            RejectionReason::ExcessiveMismatches => self.discarded_excessive_mismatches += 1,
            RejectionReason::MissingQualities => self.discarded_missing_qualities += 1,
            RejectionReason::UnpairedRead => self.unpaired_records += 1,
            RejectionReason::FilteredRecord => self.filtered_records += 1,
        }
    }

    /// Number of pairs or records counted under `reason`.
    #[must_use]
    pub fn rejections(&self, reason: RejectionReason) -> u64 {
        match reason {
            RejectionReason::MalformedBarcode => self.discarded_malformed_barcode,
            RejectionReason::DiscordantPair => self.discarded_discordant,
            RejectionReason::ChimericBarcode => self.discarded_chimeric,
            RejectionReason::ExcessiveMismatches => self.discarded_excessive_mismatches,
            RejectionReason::MissingQualities => self.discarded_missing_qualities,
            RejectionReason::UnpairedRead => self.unpaired_records,
            RejectionReason::FilteredRecord => self.filtered_records,
        }
    }

    /// Records a closed family of `size` members.
    pub fn record_family(&mut self, size: usize, strand_biased: bool) {
        self.families += 1;
        if size == 1 {
            self.singleton_families += 1;
        }
        if strand_biased {
            self.strand_biased_families += 1;
        }
        self.reads_collapsed += size.saturating_sub(1) as u64 * 2;
        self.family_sizes.record(size);
    }

    /// Adds every count from `other` into this object.
    pub fn merge(&mut self, other: &Self) {
        self.total_pairs += other.total_pairs;
        self.accepted_pairs += other.accepted_pairs;
        self.discarded_malformed_barcode += other.discarded_malformed_barcode;
        self.discarded_discordant += other.discarded_discordant;
        self.discarded_chimeric += other.discarded_chimeric;
        self.discarded_excessive_mismatches += other.discarded_excessive_mismatches;
        self.discarded_missing_qualities += other.discarded_missing_qualities;
        self.unpaired_records += other.unpaired_records;
        self.filtered_records += other.filtered_records;
        self.barcodes_with_no_calls += other.barcodes_with_no_calls;
        self.chimeric_barcodes += other.chimeric_barcodes;
        self.families += other.families;
        self.singleton_families += other.singleton_families;
        self.strand_biased_families += other.strand_biased_families;
        self.consensus_pairs += other.consensus_pairs;
        self.reads_collapsed += other.reads_collapsed;
        self.overlapping_bases += other.overlapping_bases;
        self.overlap_agreements += other.overlap_agreements;
        self.overlap_disagreements += other.overlap_disagreements;
        self.overlap_corrections += other.overlap_corrections;
        self.low_confidence_positions += other.low_confidence_positions;
        self.family_sizes.merge(&other.family_sizes);
    }

    /// Computes derived values once all counts are in.
    pub fn finalize(&mut self) {
        self.mean_family_size = if self.families == 0 {
            0.0
        } else {
            #[expect(clippy::cast_precision_loss, reason = "read counts never exceed 2^53")]
            let mean = self.family_sizes.total_members() as f64 / self.families as f64;
            mean
        };
    }
}

impl Metric for CollapseMetrics {
    fn metric_name() -> &'static str {
        "collapse"
    }
}

impl ProcessingMetrics for CollapseMetrics {
    fn total_input(&self) -> u64 {
        self.total_pairs
    }

    fn total_output(&self) -> u64 {
        self.accepted_pairs
    }

    fn total_filtered(&self) -> u64 {
        self.discarded_malformed_barcode
            + self.discarded_discordant
            + self.discarded_chimeric
            + self.discarded_excessive_mismatches
            + self.discarded_missing_qualities
    }
}

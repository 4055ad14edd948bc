//! The collapse stages and the single-threaded driver.
//!
//! A run passes every read pair through four stages:
//!
//! 1. [`KeyingStage`]: validates the pair and derives its [`BarcodeKey`](crate::barcode::BarcodeKey).
//!    Per-record faults are counted here and never reach later stages.
//! 2. [`DuplicateGrouper`]: closes families as the coordinate frontier advances.
//! 3. [`ConsensusBuilder`]: one consensus record per mate for each family.
//! 4. [`OverlapReconciler`] and then the [`OutputAssembler`].
//!
//! [`run_serial`] chains the stages on the calling thread; [`crate::pipeline`] runs the same
//! stages on worker threads.

use log::debug;

use crate::barcode::{BarcodeExtractor, BarcodeKey, BarcodePattern};
use crate::config::CollapseConfig;
use crate::consensus::{ConsensusBuilder, ConsensusPair, OverlapReconciler, ReconciledPair};
use crate::errors::{CollapseError, Result};
use crate::grouper::{DuplicateGrouper, KeyedPair};
use crate::metrics::{CollapseMetrics, RejectionReason};
use crate::output::{OutputAssembler, PairWriter};
use crate::progress::ProgressTracker;
use crate::read_pair::ReadPair;
use crate::reference::ReferenceReader;

/// Screens read pairs and computes their grouping keys.
pub struct KeyingStage {
    extractor: BarcodeExtractor,
    max_pattern_mismatches: Option<u32>,
    discard_chimeric: bool,
    max_read_mismatches: Option<u32>,
    metrics: CollapseMetrics,
}

impl KeyingStage {
    #[must_use]
    pub fn new(config: &CollapseConfig, pattern: BarcodePattern) -> Self {
        Self {
            extractor: BarcodeExtractor::new(pattern, config.bin_width),
            max_pattern_mismatches: config.barcode.max_pattern_mismatches,
            discard_chimeric: config.barcode.discard_chimeric,
            max_read_mismatches: config.max_read_mismatches,
            metrics: CollapseMetrics::new(),
        }
    }

    /// Keys `pair`, or returns `None` when it was excluded and counted.
    ///
    /// Only errors that are not per-record faults are returned.
    pub fn key(&mut self, pair: ReadPair) -> Result<Option<KeyedPair>> {
        self.metrics.total_pairs += 1;

        let key = match self.screen(&pair) {
            Ok(key) => key,
            Err(e) => match e.rejection_reason() {
                Some(reason) => {
                    debug!("{e}");
                    self.metrics.record_rejection(reason);
                    return Ok(None);
                }
                None => return Err(e),
            },
        };

        if let Some(limit) = self.max_pattern_mismatches {
            if self.extractor.pattern().mismatches(&key.canonical) > limit {
                self.metrics.chimeric_barcodes += 1;
                if self.discard_chimeric {
                    self.metrics.record_rejection(RejectionReason::ChimericBarcode);
                    return Ok(None);
                }
            }
        }

        if let Some(limit) = self.max_read_mismatches {
            let excessive = [&pair.mate_a, &pair.mate_b].iter().any(|m| m.mismatches.is_some_and(|nm| nm > limit));
            if excessive {
                self.metrics.record_rejection(RejectionReason::ExcessiveMismatches);
                return Ok(None);
            }
        }

        if key.no_calls() > 0 {
            self.metrics.barcodes_with_no_calls += 1;
        }
        self.metrics.accepted_pairs += 1;
        Ok(Some(KeyedPair { key, pair }))
    }

    /// Checks the per-record requirements of `pair` and derives its key.
    fn screen(&self, pair: &ReadPair) -> Result<BarcodeKey> {
        if pair.is_discordant() {
            return Err(CollapseError::DiscordantPair {
                name: pair.name.to_string(),
                mate_a_ref: pair.mate_a.ref_id,
                mate_b_ref: pair.mate_b.ref_id,
            });
        }
        if let Some(mate) = [&pair.mate_a, &pair.mate_b].into_iter().find(|m| !m.has_qualities()) {
            return Err(CollapseError::MissingQualities {
                name: pair.name.to_string(),
                bases: mate.bases.len(),
                quals: mate.quals.len(),
            });
        }
        self.extractor.extract(pair)
    }

    #[must_use]
    pub fn metrics(&self) -> &CollapseMetrics {
        &self.metrics
    }

    pub fn into_metrics(self) -> CollapseMetrics {
        self.metrics
    }
}

/// The stage objects of one run, built from a validated configuration.
pub struct Stages {
    pub keying: KeyingStage,
    pub grouper: DuplicateGrouper,
    pub builder: ConsensusBuilder,
    pub reconciler: OverlapReconciler,
}

impl Stages {
    /// Validates `config` and builds every stage from it.
    ///
    /// Strand bias is only evaluated when top and bottom strand families are joined.
    pub fn new(config: &CollapseConfig, reference: Option<ReferenceReader>) -> Result<Self> {
        let pattern = config.validate()?;
        let duplex = config.duplex_join(&pattern)?;
        let builder =
            ConsensusBuilder::new(config.consensus.clone(), reference).with_strand_bias(duplex.is_some());
        let mut grouper = DuplicateGrouper::new(config.barcode.max_mismatches);
        if let Some(duplex) = duplex {
            grouper = grouper.with_duplex_join(duplex);
        }
        Ok(Self {
            keying: KeyingStage::new(config, pattern),
            grouper,
            builder,
            reconciler: OverlapReconciler::new(config.overlap_agreement, config.consensus.max_consensus_quality),
        })
    }
}

/// Reconciles a consensus pair and counts its family.
pub fn finish_family(
    reconciler: &OverlapReconciler,
    pair: ConsensusPair,
    metrics: &mut CollapseMetrics,
) -> ReconciledPair {
    metrics.record_family(pair.summary.size, pair.summary.strand_biased);
    metrics.consensus_pairs += 1;
    reconciler.reconcile(pair, metrics)
}

/// Runs every stage on the calling thread.
///
/// Returns the run's metrics, not yet finalized. Counts gathered before the pairs reach
/// this function (by the BAM pairer, for example) are not included.
pub fn run_serial<I, W>(
    config: &CollapseConfig,
    reference: Option<ReferenceReader>,
    pairs: I,
    output: &mut OutputAssembler<W>,
    progress: &ProgressTracker,
) -> Result<CollapseMetrics>
where
    I: IntoIterator<Item = Result<ReadPair>>,
    W: PairWriter,
{
    let Stages { mut keying, mut grouper, builder, reconciler } = Stages::new(config, reference)?;
    let mut metrics = CollapseMetrics::new();

    for pair in pairs {
        let pair = pair?;
        let (ref_id, start) = pair.coordinate();
        progress.record(1, || format!("{ref_id}:{start}"));

        let Some(keyed) = keying.key(pair)? else { continue };
        for family in grouper.push(keyed)? {
            let reconciled = finish_family(&reconciler, builder.build(&family), &mut metrics);
            output.write(&reconciled)?;
        }
    }
    for family in grouper.finish() {
        let reconciled = finish_family(&reconciler, builder.build(&family), &mut metrics);
        output.write(&reconciled)?;
    }

    metrics.merge(keying.metrics());
    Ok(metrics)
}

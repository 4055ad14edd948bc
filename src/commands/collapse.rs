//! Collapse duplicate read pairs into one consensus pair per source molecule.
//!
//! Pairs are grouped by alignment position, strand and a semi-degenerate barcode read from a
//! SAM tag. Each family is called base by base into a consensus pair, the overlapping bases of
//! the two consensus mates are reconciled, and the result is written in coordinate order.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;

use fgcollapse_lib::bam_io::{create_bam_reader, create_bam_writer};
use fgcollapse_lib::collapse::run_serial;
use fgcollapse_lib::config::{BarcodeOptions, CollapseConfig};
use fgcollapse_lib::consensus::AgreementStrategy;
use fgcollapse_lib::header::build_output_header;
use fgcollapse_lib::logging::{OperationTimer, log_collapse_summary};
use fgcollapse_lib::metrics::write_metrics_auto;
use fgcollapse_lib::output::{BamPairWriter, OutputAssembler};
use fgcollapse_lib::pairing::PairReader;
use fgcollapse_lib::pipeline::run_pipeline;
use fgcollapse_lib::progress::ProgressTracker;
use fgcollapse_lib::reference::ReferenceReader;
use fgcollapse_lib::validation::{string_to_tag, validate_file_exists};

use crate::commands::command::Command;
use crate::commands::common::{BamIoOptions, ConsensusCallingOptions, StatsOptions, ThreadingOptions};
use crate::version::VERSION;

/// How the quality of an overlapping base is set when both mates agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AgreementArg {
    /// Sum of the two qualities, capped at --max-consensus-quality
    Consensus,
    /// Higher of the two qualities
    MaxQual,
    /// Leave both qualities unchanged
    PassThrough,
}

impl From<AgreementArg> for AgreementStrategy {
    fn from(arg: AgreementArg) -> Self {
        match arg {
            AgreementArg::Consensus => Self::Consensus,
            AgreementArg::MaxQual => Self::MaxQual,
            AgreementArg::PassThrough => Self::PassThrough,
        }
    }
}

/// Collapses barcode-tagged duplicate read pairs into consensus pairs.
#[derive(Debug, Parser)]
#[command(
    name = "collapse",
    about = "\x1b[38;5;180m[CONSENSUS]\x1b[0m      \x1b[36mCollapse barcode-tagged duplicate read pairs\x1b[0m",
    long_about = r#"
Collapses PCR duplicates that carry a semi-degenerate molecular barcode into one consensus read pair per
source molecule.

The input must be a coordinate-sorted BAM of paired reads. The barcode of each pair is read from the tag
given by --barcode-tag (on either mate) and checked against --pattern, an IUPAC pattern such as
NNNWSMRWSYWKMWWT. A pattern of the form NNNT-NNNT describes a barcode split across the two adapters.

Pairs are grouped into a family when they share the leftmost mate's reference, genomic bin (--bin-width)
and source strand, and their barcodes agree exactly at the fixed pattern positions and differ at no more
than --max-mismatches degenerate positions. Barcodes that do not fit the pattern are counted and skipped.

When the two halves of a split pattern are identical, the families of the two source strands are then
joined: each bottom-strand family joins the closest unjoined top-strand family whose barcode differs at no
more than --duplex-max-mismatches of the positions selected by --duplex-mask. Both default to the family
settings.

Each family is called base by base: every input base at or above --min-input-base-quality votes with its
quality (all bases vote where none reaches it), the heaviest base wins, and ties go to the reference base
(--reference), then the base favoured by the family's majority strand, then the alphabetically first base.
Consensus qualities are capped at --max-consensus-quality. With duplex joining, families whose members sit
overwhelmingly on one strand are flagged (sb tag).

Where the two consensus mates overlap, agreeing bases are boosted according to --overlap-agreement and
disagreeing bases take the higher-quality call. A disagreement at equal quality leaves both bases at the
minimum quality and the position is listed in the lc tag.

Output records carry these tags:

  MI (int)    : family id            RX (string) : canonical barcode
  fs (int)    : family size          ts/bs (int) : members from the top/bottom strand
  sb (int)    : 1 when strand-biased lc (int[])  : low-confidence positions (1-based)
  cD/cM (int) : max/min depth        cE (float)  : consensus error rate
  cd/ce (short[]) : per-base depth and disagreeing bases
"#
)]
pub struct Collapse {
    #[command(flatten)]
    pub io: BamIoOptions,

    #[command(flatten)]
    pub stats_opts: StatsOptions,

    /// IUPAC barcode pattern, optionally split into mate halves with '-'
    #[arg(short = 'P', long = "pattern")]
    pub pattern: String,

    /// 0/1 mask selecting which pattern positions are compared
    #[arg(long = "mask")]
    pub mask: Option<String>,

    /// SAM tag holding the barcode
    #[arg(short = 't', long = "barcode-tag", default_value = "RX")]
    pub barcode_tag: String,

    /// Degenerate-position mismatches tolerated within a family
    #[arg(short = 'e', long = "max-mismatches", default_value = "1")]
    pub max_mismatches: u32,

    /// Width in bases of the genomic bins pairs are grouped in
    #[arg(long = "bin-width", default_value = "1")]
    pub bin_width: usize,

    /// Mismatches to the pattern above which a barcode is counted as chimeric
    #[arg(long = "max-pattern-mismatches")]
    pub max_pattern_mismatches: Option<u32>,

    /// Exclude chimeric barcodes instead of only counting them
    #[arg(long = "discard-chimeric", default_value = "false")]
    pub discard_chimeric: bool,

    /// 0/1 mask selecting the positions compared when joining strand families
    #[arg(long = "duplex-mask")]
    pub duplex_mask: Option<String>,

    /// Mismatches tolerated when joining strand families [default: --max-mismatches]
    #[arg(long = "duplex-max-mismatches")]
    pub duplex_max_mismatches: Option<u32>,

    /// Exclude pairs with a mate whose NM tag exceeds this value
    #[arg(long = "max-read-mismatches")]
    pub max_read_mismatches: Option<u32>,

    #[command(flatten)]
    pub consensus: ConsensusCallingOptions,

    /// Quality assigned to overlapping bases on which both mates agree
    #[arg(long = "overlap-agreement", value_enum, default_value_t = AgreementArg::Consensus)]
    pub overlap_agreement: AgreementArg,

    /// Prefix for consensus read names
    #[arg(short = 'p', long = "read-name-prefix", default_value = "collapsed")]
    pub read_name_prefix: String,

    /// Reference FASTA used to break consensus ties
    #[arg(short = 'r', long = "reference")]
    pub reference: Option<PathBuf>,

    #[command(flatten)]
    pub threading: ThreadingOptions,
}

impl Command for Collapse {
    fn execute(&self, command_line: &str) -> Result<()> {
        let timer = OperationTimer::new("Collapsing read pairs");

        self.io.validate()?;
        if let Some(reference) = &self.reference {
            validate_file_exists(reference, "Reference FASTA")?;
        }
        let config = self.config();
        let pattern = config.validate()?;
        let barcode_tag = string_to_tag(&config.barcode.tag, "barcode-tag")?;

        info!("Input: {}", self.io.input.display());
        info!("Output: {}", self.io.output.display());
        info!("Barcode pattern: {} (tag {})", config.barcode.pattern, config.barcode.tag);
        info!("Max barcode mismatches: {}", config.barcode.max_mismatches);
        if let Some(join) = config.duplex_join(&pattern)? {
            info!(
                "Joining strand families on {} barcode positions, max mismatches {}",
                join.positions.len(),
                join.tolerance
            );
        }
        info!("{}", self.threading.log_message());

        let (reader, header) = create_bam_reader(&self.io.input, self.threading.threads.unwrap_or(1))?;
        let reference = match &self.reference {
            Some(path) => {
                info!("Loading reference: {}", path.display());
                Some(ReferenceReader::for_header(path, &header)?)
            }
            None => None,
        };

        let output_header = build_output_header(&header, VERSION.as_str(), command_line)?;
        let writer = create_bam_writer(&self.io.output, &output_header)?;
        let mut output =
            OutputAssembler::new(BamPairWriter::new(writer, output_header, self.read_name_prefix.clone()));
        let mut pairs = PairReader::new(reader, header, barcode_tag);
        let progress = ProgressTracker::new("Processed read pairs");

        let mut metrics = match self.threading.pipeline_options() {
            None => run_serial(&config, reference, &mut pairs, &mut output, &progress)?,
            Some(options) => run_pipeline(&config, reference, &options, &mut pairs, &mut output, &progress)?,
        };
        progress.log_final();
        metrics.merge(pairs.metrics());
        metrics.finalize();

        let written = output.written();
        let mut writer = output.finish()?.into_inner();
        writer
            .try_finish()
            .with_context(|| format!("Failed to finish output BAM: {}", self.io.output.display()))?;
        info!("Wrote {written} consensus pairs");

        log_collapse_summary(&metrics);
        if let Some(path) = &self.stats_opts.stats {
            write_metrics_auto(path, std::slice::from_ref(&metrics))?;
            info!("Wrote statistics to {}", path.display());
        }
        if let Some(path) = &self.stats_opts.family_size_histogram {
            write_metrics_auto(path, &metrics.family_sizes.to_metrics())?;
            info!("Wrote family size histogram to {}", path.display());
        }

        timer.log_completion(metrics.total_pairs);
        Ok(())
    }
}

impl Collapse {
    /// Builds the run configuration from the command line.
    fn config(&self) -> CollapseConfig {
        CollapseConfig {
            barcode: BarcodeOptions {
                pattern: self.pattern.clone(),
                mask: self.mask.clone(),
                tag: self.barcode_tag.clone(),
                max_mismatches: self.max_mismatches,
                max_pattern_mismatches: self.max_pattern_mismatches,
                discard_chimeric: self.discard_chimeric,
                duplex_mask: self.duplex_mask.clone(),
                duplex_max_mismatches: self.duplex_max_mismatches,
            },
            bin_width: self.bin_width,
            max_read_mismatches: self.max_read_mismatches,
            consensus: (&self.consensus).into(),
            overlap_agreement: self.overlap_agreement.into(),
        }
    }
}

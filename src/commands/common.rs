//! Common CLI options.
//!
//! Argument groups that are composed into command structs using `#[command(flatten)]`.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use fgcollapse_lib::config::ConsensusOptions;
use fgcollapse_lib::pipeline::PipelineOptions;
use fgcollapse_lib::validation::validate_file_exists;

/// Input/output options for commands that read a BAM and write a BAM.
#[derive(Debug, Clone, Args)]
pub struct BamIoOptions {
    /// Input BAM file, coordinate sorted
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Output BAM file
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
}

impl BamIoOptions {
    /// Validates that the input file exists.
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_file_exists(&self.input, "Input BAM")?;
        Ok(())
    }
}

/// Options for writing statistics to files.
#[derive(Debug, Clone, Default, Args)]
pub struct StatsOptions {
    /// Optional output file for run statistics
    #[arg(short = 's', long = "stats")]
    pub stats: Option<PathBuf>,

    /// Optional output file for the family size histogram
    #[arg(long = "family-size-histogram")]
    pub family_size_histogram: Option<PathBuf>,
}

/// Options for consensus calling.
#[derive(Debug, Clone, Args)]
pub struct ConsensusCallingOptions {
    /// Phred-scaled error rate prior to barcode attachment
    #[arg(short = '1', long = "error-rate-pre-umi", default_value = "45")]
    pub error_rate_pre_umi: u8,

    /// Phred-scaled error rate post barcode attachment
    #[arg(short = '2', long = "error-rate-post-umi", default_value = "40")]
    pub error_rate_post_umi: u8,

    /// Minimum base quality in raw reads to use for consensus
    #[arg(short = 'm', long = "min-input-base-quality", default_value = "10")]
    pub min_input_base_quality: u8,

    /// Maximum quality of any consensus base
    #[arg(long = "max-consensus-quality", default_value = "93")]
    pub max_consensus_quality: u8,

    /// Fraction of a family on one strand above which the family is flagged strand-biased
    #[arg(long = "strand-bias-threshold", default_value = "0.9")]
    pub strand_bias_threshold: f64,

    /// Smallest family that can be flagged strand-biased
    #[arg(long = "min-strand-bias-family-size", default_value = "3")]
    pub min_strand_bias_family_size: usize,
}

impl Default for ConsensusCallingOptions {
    fn default() -> Self {
        Self::from(ConsensusOptions::default())
    }
}

impl From<ConsensusOptions> for ConsensusCallingOptions {
    fn from(options: ConsensusOptions) -> Self {
        Self {
            error_rate_pre_umi: options.error_rate_pre_umi,
            error_rate_post_umi: options.error_rate_post_umi,
            min_input_base_quality: options.min_input_base_quality,
            max_consensus_quality: options.max_consensus_quality,
            strand_bias_threshold: options.strand_bias_threshold,
            min_strand_bias_family_size: options.min_strand_bias_family_size,
        }
    }
}

impl From<&ConsensusCallingOptions> for ConsensusOptions {
    fn from(options: &ConsensusCallingOptions) -> Self {
        Self {
            error_rate_pre_umi: options.error_rate_pre_umi,
            error_rate_post_umi: options.error_rate_post_umi,
            min_input_base_quality: options.min_input_base_quality,
            max_consensus_quality: options.max_consensus_quality,
            strand_bias_threshold: options.strand_bias_threshold,
            min_strand_bias_family_size: options.min_strand_bias_family_size,
        }
    }
}

/// Threading options for the staged pipeline.
///
/// Without `--threads` every stage runs on the main thread. With `--threads N` (even
/// `--threads 1`) the stages run on their own threads and consensus calling uses a pool of
/// N workers.
#[derive(Debug, Clone, Args)]
pub struct ThreadingOptions {
    /// Number of consensus worker threads
    #[arg(long = "threads")]
    pub threads: Option<usize>,

    /// Maximum number of batches buffered between two stages
    #[arg(long = "queue-capacity", default_value = "64")]
    pub queue_capacity: usize,

    /// Number of pairs or families handed between stages at once
    #[arg(long = "batch-size", default_value = "256")]
    pub batch_size: usize,

    /// Seconds a stage may wait on a full queue before the run fails
    #[arg(long = "stall-timeout-secs", default_value = "300")]
    pub stall_timeout_secs: u64,
}

impl Default for ThreadingOptions {
    fn default() -> Self {
        Self::none()
    }
}

impl ThreadingOptions {
    /// Creates threading options with N threads (uses the pipeline).
    #[must_use]
    pub fn new(threads: usize) -> Self {
        Self { threads: Some(threads), ..Self::none() }
    }

    /// Creates threading options with no threads specified (single-threaded).
    #[must_use]
    pub fn none() -> Self {
        let defaults = PipelineOptions::default();
        Self {
            threads: None,
            queue_capacity: defaults.queue_capacity,
            batch_size: defaults.batch_size,
            stall_timeout_secs: defaults.stall_timeout.as_secs(),
        }
    }

    /// Returns true if running in single-threaded mode.
    #[must_use]
    pub fn is_single_threaded(&self) -> bool {
        self.threads.is_none()
    }

    /// Returns the pipeline options, or `None` in single-threaded mode.
    #[must_use]
    pub fn pipeline_options(&self) -> Option<PipelineOptions> {
        self.threads.map(|threads| PipelineOptions {
            threads,
            queue_capacity: self.queue_capacity,
            batch_size: self.batch_size,
            stall_timeout: Duration::from_secs(self.stall_timeout_secs),
        })
    }

    /// Returns a log message describing the threading configuration.
    #[must_use]
    pub fn log_message(&self) -> String {
        match self.threads {
            None => "Single-threaded mode".to_string(),
            Some(n) => format!("Using {n} consensus threads"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_is_single_threaded() {
        let opts = ThreadingOptions::none();
        assert!(opts.is_single_threaded());
        assert!(opts.pipeline_options().is_none());
        assert!(opts.log_message().contains("Single-threaded"));
    }

    #[test]
    fn test_new_uses_pipeline() {
        let opts = ThreadingOptions::new(1);
        assert!(!opts.is_single_threaded());
        let pipeline = opts.pipeline_options().unwrap();
        assert_eq!(pipeline.threads, 1);
        assert_eq!(pipeline.queue_capacity, 64);
        assert_eq!(pipeline.stall_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_log_message() {
        assert!(ThreadingOptions::new(8).log_message().contains("8 consensus threads"));
    }

    #[test]
    fn test_consensus_options_conversion() {
        let cli = ConsensusCallingOptions { max_consensus_quality: 60, ..Default::default() };
        let options = ConsensusOptions::from(&cli);
        assert_eq!(options.max_consensus_quality, 60);
        assert_eq!(options.error_rate_pre_umi, 45);
        assert_eq!(ConsensusCallingOptions::from(options).max_consensus_quality, 60);
    }

    #[test]
    fn test_missing_input_fails_validation() {
        let io = BamIoOptions {
            input: PathBuf::from("/nonexistent/input.bam"),
            output: PathBuf::from("out.bam"),
        };
        assert!(io.validate().unwrap_err().to_string().contains("does not exist"));
    }
}

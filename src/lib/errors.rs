//! Error types for collapse operations.
//!
//! Per-record faults (`MalformedBarcode`, `DiscordantPair`, `MissingQualities`) are
//! recoverable: the record is excluded and counted. Everything else aborts the run.

use std::io;

use thiserror::Error;

use crate::metrics::RejectionReason;

/// Result type alias for collapse operations
pub type Result<T> = std::result::Result<T, CollapseError>;

/// Error type for collapse operations
#[derive(Error, Debug)]
pub enum CollapseError {
    /// Barcode fragment does not fit the configured pattern
    #[error("Malformed barcode on read '{name}': {reason}")]
    MalformedBarcode {
        /// Read name
        name: String,
        /// What is wrong with the fragment
        reason: String,
    },

    /// Mates of a pair mapped to different reference sequences
    #[error("Discordant pair '{name}': mate A on reference {mate_a_ref}, mate B on reference {mate_b_ref}")]
    DiscordantPair {
        /// Read name
        name: String,
        /// Reference index of mate A
        mate_a_ref: usize,
        /// Reference index of mate B
        mate_b_ref: usize,
    },

    /// A mate carried no base qualities, or fewer qualities than bases
    #[error("Read '{name}' has {quals} base qualities for {bases} bases")]
    MissingQualities {
        /// Read name
        name: String,
        /// Number of bases on the offending mate
        bases: usize,
        /// Number of qualities on the offending mate
        quals: usize,
    },

    /// Input was not coordinate sorted
    #[error(
        "Input is not coordinate sorted: record {record_index} at {ref_id}:{position} follows {previous_ref_id}:{previous_position}"
    )]
    UnsortedInput {
        /// Zero-based index of the offending record in the input stream
        record_index: u64,
        /// Reference index of the offending record
        ref_id: usize,
        /// 1-based position of the offending record
        position: usize,
        /// Reference index of the furthest record seen so far
        previous_ref_id: usize,
        /// 1-based position of the furthest record seen so far
        previous_position: usize,
    },

    /// Reading the input failed
    #[error("Failed to read input: {0}")]
    Input(#[source] io::Error),

    /// Writing the output failed
    #[error("Failed to write output: {0}")]
    Output(#[source] io::Error),

    /// A pipeline stage made no progress within the stall timeout
    #[error("Pipeline stage '{stage}' stalled: downstream accepted no work for {seconds}s")]
    Stalled {
        /// Name of the stage that could not hand off its work
        stage: &'static str,
        /// Seconds waited
        seconds: u64,
    },

    /// The run was cancelled before completion
    #[error("Run cancelled")]
    Cancelled,

    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// Barcode pattern or mask could not be parsed
    #[error("Invalid barcode pattern '{pattern}': {reason}")]
    InvalidBarcodePattern {
        /// The pattern as given
        pattern: String,
        /// Explanation of the problem
        reason: String,
    },

    /// A pipeline worker failed unexpectedly
    #[error("Pipeline failure: {0}")]
    Pipeline(String),
}

impl CollapseError {
    /// The statistics bucket a per-record fault is counted under.
    ///
    /// `None` means the error is fatal and aborts the run.
    #[must_use]
    pub fn rejection_reason(&self) -> Option<RejectionReason> {
        match self {
            Self::MalformedBarcode { .. } => Some(RejectionReason::MalformedBarcode),
            Self::DiscordantPair { .. } => Some(RejectionReason::DiscordantPair),
            Self::MissingQualities { .. } => Some(RejectionReason::MissingQualities),
            _ => None,
        }
    }
}

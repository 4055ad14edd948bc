//! Rejection reason tracking for read pairs and records.
//!
//! Every recoverable per-record fault maps to a [`RejectionReason`] so that the run summary
//! can report how many inputs were excluded and why.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reasons why a read pair or record was excluded from grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionReason {
    /// Barcode fragment had the wrong length or characters outside ACGTN
    MalformedBarcode,
    /// Mates mapped to different chromosomes
    DiscordantPair,
    /// Barcode did not match the adapter pattern and chimeric pairs are discarded
    ChimericBarcode,
    /// A mate had more reference mismatches than allowed
    ExcessiveMismatches,
    /// A mate had no base qualities, or fewer qualities than bases
    MissingQualities,
    /// Record's mate never appeared in the input
    UnpairedRead,
    /// Record was unmapped, secondary, supplementary or failed QC
    FilteredRecord,
}

impl RejectionReason {
    /// Returns a human-readable description.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::MalformedBarcode => "Barcode fragment was malformed",
            Self::DiscordantPair => "Mates mapped to different chromosomes",
            Self::ChimericBarcode => "Barcode did not match the adapter pattern",
            Self::ExcessiveMismatches => "Read had too many mismatches to the reference",
            Self::MissingQualities => "Read had no base qualities",
            Self::UnpairedRead => "Read had no mate in the input",
            Self::FilteredRecord => "Record was unmapped, secondary, supplementary or QC-failed",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Formats a count with thousands separators.
///
/// # Examples
///
/// ```
/// use fgcollapse_metrics::rejection::format_count;
///
/// assert_eq!(format_count(1234567), "1,234,567");
/// assert_eq!(format_count(123), "123");
/// ```
#[must_use]
pub fn format_count(n: u64) -> String {
    let digits = n.to_string().into_bytes();
    digits
        .rchunks(3)
        .rev()
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join(",")
}

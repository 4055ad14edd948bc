#![deny(unsafe_code)]

//! Structured metric types and TSV writer for fgcollapse runs.
//!
//! This crate provides:
//! - [`Metric`] and [`ProcessingMetrics`] traits for extensible metric types
//! - [`collapse::CollapseMetrics`], the run-scoped statistics object
//! - [`family_size`] histogram rows and collector
//! - [`rejection`] module for rejection reason tracking
//! - [`writer`] module for TSV file output

pub mod collapse;
pub mod family_size;
pub mod rejection;
pub mod writer;

use serde::{Deserialize, Serialize};

/// Number of decimal places used for float metrics.
pub const FLOAT_PRECISION: usize = 6;

/// Formats a float value with the standard precision for metrics.
///
/// # Example
/// ```
/// use fgcollapse_metrics::format_float;
/// assert_eq!(format_float(0.9), "0.900000");
/// assert_eq!(format_float(0.0), "0.000000");
/// ```
#[must_use]
pub fn format_float(value: f64) -> String {
    format!("{value:.FLOAT_PRECISION$}")
}

/// A metric type that can be serialized to TSV files.
pub trait Metric: Serialize + for<'de> Deserialize<'de> + Clone + Default {
    /// Human-readable name for this metric type.
    ///
    /// Used in error messages and logging when writing metrics files.
    fn metric_name() -> &'static str;
}

/// Common interface for metrics that track processing pipeline counts.
pub trait ProcessingMetrics {
    /// Total number of input items processed.
    fn total_input(&self) -> u64;

    /// Total number of items that made it through to output.
    fn total_output(&self) -> u64;

    /// Total number of items filtered out or rejected.
    fn total_filtered(&self) -> u64;

    /// Processing efficiency as a percentage (output / input * 100).
    fn efficiency(&self) -> f64 {
        if self.total_input() == 0 {
            0.0
        } else {
            #[expect(clippy::cast_precision_loss, reason = "read counts never exceed 2^53")]
            let result = self.total_output() as f64 / self.total_input() as f64 * 100.0;
            result
        }
    }
}

pub use collapse::CollapseMetrics;
pub use family_size::{FamilySizeHistogram, FamilySizeMetrics};
pub use rejection::{RejectionReason, format_count};
pub use writer::{write_metrics, write_metrics_auto};

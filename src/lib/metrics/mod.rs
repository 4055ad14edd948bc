//! Run statistics for collapse runs.
//!
//! - [`CollapseMetrics`] - the run-scoped counters, merged across pipeline stages
//! - [`FamilySizeHistogram`] - family size distribution
//! - [`write_metrics`] - metrics file output

pub use fgcollapse_metrics::{
    CollapseMetrics, FLOAT_PRECISION, FamilySizeHistogram, FamilySizeMetrics, Metric, ProcessingMetrics,
    RejectionReason, format_count, format_float, write_metrics, write_metrics_auto,
};

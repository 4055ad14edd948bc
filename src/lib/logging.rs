//! Formatting helpers and run summaries for log output.

use std::time::{Duration, Instant};

use crate::metrics::{CollapseMetrics, ProcessingMetrics, RejectionReason, format_count};

/// Formats a fraction (0.0-1.0) as a percentage with `decimals` decimal places.
///
/// # Examples
///
/// ```
/// use fgcollapse_lib::logging::format_percent;
///
/// assert_eq!(format_percent(0.9543, 2), "95.43%");
/// assert_eq!(format_percent(1.0, 0), "100%");
/// ```
#[must_use]
pub fn format_percent(value: f64, decimals: usize) -> String {
    format!("{:.decimals$}%", value * 100.0)
}

/// Formats a duration as e.g. "45s", "2m 15s" or "1h 30m".
///
/// # Examples
///
/// ```
/// use fgcollapse_lib::logging::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_secs(135)), "2m 15s");
/// ```
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match secs {
        0..60 => format!("{secs}s"),
        60..3600 => match (secs / 60, secs % 60) {
            (mins, 0) => format!("{mins}m"),
            (mins, rem) => format!("{mins}m {rem}s"),
        },
        _ => match (secs / 3600, (secs % 3600) / 60) {
            (hours, 0) => format!("{hours}h"),
            (hours, mins) => format!("{hours}h {mins}m"),
        },
    }
}

/// Formats a processing rate for `count` items of kind `unit` over `duration`.
///
/// # Examples
///
/// ```
/// use fgcollapse_lib::logging::format_rate;
/// use std::time::Duration;
///
/// assert_eq!(format_rate(1000, Duration::from_secs(1), "pairs"), "1,000 pairs/s");
/// assert_eq!(format_rate(30, Duration::from_secs(60), "pairs"), "30.0 pairs/min");
/// ```
#[must_use]
pub fn format_rate(count: u64, duration: Duration, unit: &str) -> String {
    let secs = duration.as_secs_f64();
    if secs < 0.001 {
        return format!("{} {unit}/s", format_count(count));
    }

    let rate = count as f64 / secs;
    if rate >= 1.0 {
        format!("{} {unit}/s", format_count(rate as u64))
    } else {
        format!("{:.1} {unit}/min", count as f64 / (secs / 60.0))
    }
}

/// Logs the end-of-run summary: every recoverable condition's count, family and overlap
/// statistics.
pub fn log_collapse_summary(metrics: &CollapseMetrics) {
    log::info!("Collapse Summary:");
    log::info!("  Read pairs: {}", format_count(metrics.total_pairs));
    log::info!("  Accepted pairs: {}", format_count(metrics.accepted_pairs));
    if metrics.total_pairs > 0 {
        log::info!("  Accept rate: {}", format_percent(metrics.efficiency() / 100.0, 2));
    }

    for reason in [
        RejectionReason::MalformedBarcode,
        RejectionReason::DiscordantPair,
        RejectionReason::ChimericBarcode,
        RejectionReason::ExcessiveMismatches,
        RejectionReason::MissingQualities,
        RejectionReason::UnpairedRead,
        RejectionReason::FilteredRecord,
    ] {
        let count = metrics.rejections(reason);
        if count > 0 || matches!(reason, RejectionReason::MalformedBarcode | RejectionReason::DiscordantPair) {
            log::info!("  Excluded ({reason}): {}", format_count(count));
        }
    }
    if metrics.chimeric_barcodes > 0 {
        log::info!("  Chimeric barcodes: {}", format_count(metrics.chimeric_barcodes));
    }
    if metrics.barcodes_with_no_calls > 0 {
        log::info!("  Barcodes containing N: {}", format_count(metrics.barcodes_with_no_calls));
    }

    log::info!("  Families formed: {}", format_count(metrics.families));
    if metrics.families > 0 {
        log::info!("  Mean family size: {:.2}", metrics.mean_family_size);
        log::info!("  Singleton families: {}", format_count(metrics.singleton_families));
        log::info!("  Strand-biased families: {}", format_count(metrics.strand_biased_families));
        log::info!("  Reads collapsed: {}", format_count(metrics.reads_collapsed));
    }

    log::info!("  Overlapping bases: {}", format_count(metrics.overlapping_bases));
    if metrics.overlapping_bases > 0 {
        log::info!(
            "    agreeing {}, disagreeing {}, corrected {}",
            format_count(metrics.overlap_agreements),
            format_count(metrics.overlap_disagreements),
            format_count(metrics.overlap_corrections)
        );
    }
    log::info!("  Low-confidence positions: {}", format_count(metrics.low_confidence_positions));
}

/// Times an operation and logs its start and completion.
///
/// ```no_run
/// use fgcollapse_lib::logging::OperationTimer;
///
/// let timer = OperationTimer::new("Collapsing read pairs");
/// timer.log_completion(10_000);
/// ```
pub struct OperationTimer {
    operation: String,
    start_time: Instant,
}

impl OperationTimer {
    /// Creates a new operation timer and logs the start.
    #[must_use]
    pub fn new(operation: &str) -> Self {
        log::info!("{operation} ...");
        Self { operation: operation.to_string(), start_time: Instant::now() }
    }

    /// Logs the completion with the number of read pairs processed and the rate.
    pub fn log_completion(&self, pairs: u64) {
        let duration = self.start_time.elapsed();
        log::info!(
            "{} completed: {} read pairs in {} ({})",
            self.operation,
            format_count(pairs),
            format_duration(duration),
            format_rate(pairs, duration, "pairs")
        );
    }
}

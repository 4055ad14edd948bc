//! Periodic progress logging.

use log::info;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::metrics::format_count;

/// Default number of read pairs between progress messages.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100_000;

/// Logs a message each time the running count crosses a multiple of the interval.
///
/// The counter is atomic so a tracker can be shared between pipeline stages.
///
/// ```
/// use fgcollapse_lib::progress::ProgressTracker;
///
/// let tracker = ProgressTracker::new("Grouped read pairs").with_interval(2);
/// tracker.record(3, || "chr1:1000".to_string());
/// tracker.log_final();
/// assert_eq!(tracker.count(), 3);
/// ```
pub struct ProgressTracker {
    interval: u64,
    message: String,
    count: AtomicU64,
}

impl ProgressTracker {
    /// Creates a tracker that logs every [`DEFAULT_PROGRESS_INTERVAL`] items.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            interval: DEFAULT_PROGRESS_INTERVAL,
            message: message.into(),
            count: AtomicU64::new(0),
        }
    }

    /// Sets the logging interval. An interval of zero is treated as one.
    #[must_use]
    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = interval.max(1);
        self
    }

    /// Adds `additional` to the count and logs once per interval boundary crossed, naming
    /// the most recent locus. `locus` is only evaluated when a message is logged.
    ///
    /// Returns true if at least one message was logged.
    pub fn record(&self, additional: u64, locus: impl FnOnce() -> String) -> bool {
        if additional == 0 {
            return false;
        }
        let prev = self.count.fetch_add(additional, Ordering::Relaxed);
        let crossed = (prev / self.interval + 1)..=((prev + additional) / self.interval);
        if crossed.is_empty() {
            return false;
        }
        let locus = locus();
        for milestone in crossed {
            info!("{} {} (last at {locus})", self.message, format_count(milestone * self.interval));
        }
        true
    }

    /// Logs the final count unless it sits exactly on an interval boundary already logged.
    pub fn log_final(&self) {
        let count = self.count();
        if count > 0 && !count.is_multiple_of(self.interval) {
            info!("{} {} (complete)", self.message, format_count(count));
        }
    }

    /// Current count.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

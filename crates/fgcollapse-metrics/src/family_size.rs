//! Family size distribution.
//!
//! [`FamilySizeHistogram`] accumulates family sizes as families close; each pipeline stage
//! keeps its own and they are merged at the end of the run. [`FamilySizeMetrics`] is the row
//! type written to the histogram TSV.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Metric;

/// Family size distribution metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilySizeMetrics {
    /// Family size (number of read pairs)
    pub family_size: usize,

    /// Number of families with this size
    pub count: u64,

    /// Fraction of all families with this size
    pub fraction: f64,

    /// Cumulative fraction (families with size >= this value)
    pub fraction_gt_or_eq_family_size: f64,
}

impl FamilySizeMetrics {
    /// Creates a new family size metric.
    #[must_use]
    pub fn new(family_size: usize) -> Self {
        Self { family_size, count: 0, fraction: 0.0, fraction_gt_or_eq_family_size: 0.0 }
    }
}

impl Default for FamilySizeMetrics {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Metric for FamilySizeMetrics {
    fn metric_name() -> &'static str {
        "family size"
    }
}

/// Counts of families by size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FamilySizeHistogram {
    counts: BTreeMap<usize, u64>,
}

impl FamilySizeHistogram {
    /// Records one family of the given size.
    pub fn record(&mut self, family_size: usize) {
        *self.counts.entry(family_size).or_insert(0) += 1;
    }

    /// Adds every count in `other` to this histogram.
    pub fn merge(&mut self, other: &Self) {
        for (&size, &count) in &other.counts {
            *self.counts.entry(size).or_insert(0) += count;
        }
    }

    /// Total number of families recorded.
    #[must_use]
    pub fn total_families(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Total number of read pairs across all recorded families.
    #[must_use]
    pub fn total_members(&self) -> u64 {
        self.counts.iter().map(|(&size, &count)| size as u64 * count).sum()
    }

    /// Number of families of exactly `family_size`.
    #[must_use]
    pub fn count(&self, family_size: usize) -> u64 {
        self.counts.get(&family_size).copied().unwrap_or(0)
    }

    /// One row per observed family size, in ascending size order.
    #[must_use]
    pub fn to_metrics(&self) -> Vec<FamilySizeMetrics> {
        let total = self.total_families();
        if total == 0 {
            return Vec::new();
        }

        #[expect(clippy::cast_precision_loss, reason = "family counts never exceed 2^53")]
        let total_f = total as f64;
        let mut remaining = total;
        let mut metrics = Vec::with_capacity(self.counts.len());
        for (&family_size, &count) in &self.counts {
            #[expect(clippy::cast_precision_loss, reason = "family counts never exceed 2^53")]
            let (fraction, at_least) = (count as f64 / total_f, remaining as f64 / total_f);
            metrics.push(FamilySizeMetrics {
                family_size,
                count,
                fraction,
                fraction_gt_or_eq_family_size: at_least,
            });
            remaining -= count;
        }
        metrics
    }
}

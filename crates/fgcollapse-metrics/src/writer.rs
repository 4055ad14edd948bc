//! Writing metrics files.

use anyhow::{Context, Result};
use fgoxide::io::DelimFile;
use serde::Serialize;
use std::path::Path;

use super::Metric;

/// Writes `metrics` to a TSV file with a header row.
///
/// `description` names the metrics in the error message if the file cannot be written.
///
/// # Errors
/// Returns an error if the file cannot be created or written to
pub fn write_metrics<P: AsRef<Path>, T: Serialize>(
    path: P,
    metrics: &[T],
    description: &str,
) -> Result<()> {
    let path = path.as_ref();
    DelimFile::default()
        .write_tsv(&path, metrics)
        .with_context(|| format!("Failed to write {description} metrics: {}", path.display()))
}

/// Writes metrics implementing [`Metric`], naming them by [`Metric::metric_name`] on error.
///
/// # Errors
/// Returns an error if the file cannot be created or written to
pub fn write_metrics_auto<P: AsRef<Path>, T: Metric>(path: P, metrics: &[T]) -> Result<()> {
    write_metrics(path, metrics, T::metric_name())
}

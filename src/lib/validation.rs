//! Validation of command-line parameters and input paths.
//!
//! Every function here reports problems as [`CollapseError::InvalidParameter`] naming the
//! offending parameter.

use crate::errors::{CollapseError, Result};
use crate::phred::MAX_PHRED;
use noodles::sam::alignment::record::data::field::Tag;
use std::fmt::Display;
use std::path::Path;

fn invalid(parameter: &str, reason: String) -> CollapseError {
    CollapseError::InvalidParameter { parameter: parameter.to_string(), reason }
}

/// Validate that a file exists.
///
/// ```
/// use fgcollapse_lib::validation::validate_file_exists;
///
/// assert!(validate_file_exists("/nonexistent/file.bam", "input").is_err());
/// ```
pub fn validate_file_exists<P: AsRef<Path>>(path: P, parameter: &str) -> Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(invalid(parameter, format!("File does not exist: {}", path.display())));
    }
    Ok(())
}

/// Parse a two-character SAM tag name.
pub fn string_to_tag(tag: &str, parameter: &str) -> Result<Tag> {
    match tag.as_bytes() {
        &[a, b] if a.is_ascii_alphabetic() && b.is_ascii_alphanumeric() => Ok(Tag::new(a, b)),
        _ => Err(invalid(parameter, format!("Tag must be a letter then a letter or digit, got: '{tag}'"))),
    }
}

/// Validate that `value` is strictly positive.
#[allow(clippy::needless_pass_by_value)]
pub fn validate_positive<T: Ord + Display + Default>(value: T, parameter: &str) -> Result<()> {
    if value <= T::default() {
        return Err(invalid(parameter, format!("Must be positive (> 0), got: {value}")));
    }
    Ok(())
}

/// Validate a Phred quality in `0..=93`.
pub fn validate_quality_score(quality: u8, parameter: &str) -> Result<()> {
    if quality > MAX_PHRED {
        return Err(invalid(parameter, format!("Must be between 0 and {MAX_PHRED}, got: {quality}")));
    }
    Ok(())
}

/// Validate that a fraction lies in `min..=max`.
pub fn validate_fraction(value: f64, min: f64, max: f64, parameter: &str) -> Result<()> {
    if !(min..=max).contains(&value) {
        return Err(invalid(parameter, format!("Must be between {min} and {max}, got: {value}")));
    }
    Ok(())
}

//! CLI command implementations for fgcollapse.
//!
//! - [`collapse`] - Collapse barcode-tagged duplicate read pairs into consensus pairs

#![allow(
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::too_many_lines
)]

pub mod collapse;
pub mod command;
pub mod common;

#![deny(unsafe_code)]
// Numeric casts are routine in quality and count arithmetic; error docs live on the
// `CollapseError` variants rather than on every function.
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::needless_pass_by_value,
    clippy::items_after_statements,
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

//! # fgcollapse - barcode-aware read error suppression
//!
//! Collapses duplicate read pairs that share a semi-degenerate molecular barcode and an
//! alignment position into one consensus pair per source molecule.
//!
//! ## Stages
//!
//! - **[`collapse::KeyingStage`]** - screens each [`read_pair::ReadPair`] and derives its
//!   [`barcode::BarcodeKey`]
//! - **[`grouper`]** - sliding-window grouping of keyed pairs into families
//! - **[`consensus`]** - quality-weighted consensus and overlap reconciliation
//! - **[`output`]** - coordinate-ordered emission of reconciled pairs
//!
//! [`collapse::run_serial`] runs the stages in-line; [`pipeline::run_pipeline`] runs them on
//! worker threads with bounded queues. Both produce identical output.
//!
//! ## Utilities
//!
//! - **[`pairing`]** - joins coordinate-sorted BAM records into read pairs
//! - **[`bam_io`]** / **[`header`]** - BAM reading, writing and output headers
//! - **[`reference`][mod@reference]** - in-memory reference for consensus tie breaking
//! - **[`metrics`]**, **[`logging`]**, **[`progress`]** - run statistics and reporting
//! - **[`config`]**, **[`validation`]** - run parameters and their checks
//!
//! ## Quick Start
//!
//! ```
//! use bstr::BString;
//! use fgcollapse_lib::collapse::run_serial;
//! use fgcollapse_lib::config::CollapseConfig;
//! use fgcollapse_lib::output::{OutputAssembler, PairCollector};
//! use fgcollapse_lib::progress::ProgressTracker;
//! use fgcollapse_lib::read_pair::{Mate, ReadPair, Strand};
//!
//! # fn main() -> anyhow::Result<()> {
//! let pair = |name: &str, last: &[u8], quals: &[u8]| ReadPair {
//!     name: BString::from(name),
//!     mate_a: Mate::new(0, 1000, Strand::Forward, b"ACGT", &[30; 4]),
//!     mate_b: Mate::new(0, 1100, Strand::Reverse, last, quals),
//!     barcode: b"ACGTTG".to_vec(),
//! };
//! let pairs = vec![
//!     Ok(pair("q1", b"ACGT", &[30, 30, 30, 10])),
//!     Ok(pair("q2", b"ACGA", &[30, 30, 30, 35])),
//! ];
//!
//! let config = CollapseConfig::new("NNNNNN");
//! let mut output = OutputAssembler::new(PairCollector::default());
//! let progress = ProgressTracker::new("Processed");
//! let metrics = run_serial(&config, None, pairs, &mut output, &progress)?;
//!
//! let collapsed = output.finish()?.pairs;
//! assert_eq!(collapsed.len(), 1);
//! assert_eq!(collapsed[0].mate_b.bases, b"ACGA");
//! assert_eq!(metrics.families, 1);
//! # Ok(())
//! # }
//! ```

pub mod alignment;
pub mod bam_io;
pub mod barcode;
pub mod collapse;
pub mod config;
pub mod consensus;
pub mod errors;
pub mod grouper;
pub mod header;
pub mod logging;
pub mod metrics;
pub mod output;
pub mod pairing;
pub mod phred;
pub mod pipeline;
pub mod progress;
pub mod read_pair;
pub mod reference;
pub mod validation;

pub use errors::{CollapseError, Result};

//! Integration tests for the fgcollapse binary.
//!
//! These tests write small coordinate-sorted BAMs, run `fgcollapse collapse` on them and
//! check the records and statistics it produces.

mod helpers;
mod test_collapse_command;
mod test_error_paths;
mod test_pipeline_concurrency;

//! Failure modes of the collapse command: each must exit non-zero with a clear message.

use crate::helpers::{BamBuilder, TestPaths, run_collapse};

fn write_unsorted(paths: &TestPaths) {
    let mut bam = BamBuilder::new();
    bam.add_pair("late").start1(2000).start2(2100).barcode("ACGTTG").build();
    bam.add_pair("early").start1(1000).start2(1100).barcode("ACGTTG").build();
    bam.write_bam_unsorted(&paths.input).unwrap();
}

#[test]
fn test_unsorted_input_is_fatal() {
    let paths = TestPaths::new();
    write_unsorted(&paths);

    let output = run_collapse(&paths, &["--pattern", "NNNNNN"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not coordinate sorted"), "{stderr}");
    assert!(stderr.contains("record 2 at 0:1000 follows 0:2100"), "{stderr}");
}

#[test]
fn test_unsorted_input_is_fatal_with_threads() {
    let paths = TestPaths::new();
    write_unsorted(&paths);

    let output = run_collapse(&paths, &["--pattern", "NNNNNN", "--threads", "2"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not coordinate sorted"));
}

#[test]
fn test_missing_input_fails() {
    let paths = TestPaths::new();
    let output = run_collapse(&paths, &["--pattern", "NNNNNN"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("does not exist"));
}

#[test]
fn test_invalid_pattern_fails() {
    let paths = TestPaths::new();
    let mut bam = BamBuilder::new();
    bam.add_pair("q1").barcode("ACGTTG").build();
    bam.write_bam(&paths.input).unwrap();

    let output = run_collapse(&paths, &["--pattern", "NN-NN-NN"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid barcode pattern"));
    assert!(!paths.output.exists());
}

#[test]
fn test_invalid_parameter_fails() {
    let paths = TestPaths::new();
    let mut bam = BamBuilder::new();
    bam.add_pair("q1").barcode("ACGTTG").build();
    bam.write_bam(&paths.input).unwrap();

    let output = run_collapse(&paths, &["--pattern", "NNNNNN", "--bin-width", "0"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("bin-width"));
}

#[test]
fn test_unwritable_output_fails() {
    let paths = TestPaths::new();
    let mut bam = BamBuilder::new();
    bam.add_pair("q1").barcode("ACGTTG").build();
    bam.write_bam(&paths.input).unwrap();

    let output = std::process::Command::new(env!("CARGO_BIN_EXE_fgcollapse"))
        .args(["collapse", "--pattern", "NNNNNN", "--input"])
        .arg(&paths.input)
        .args(["--output", "/nonexistent/dir/out.bam"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to create output BAM"));
}

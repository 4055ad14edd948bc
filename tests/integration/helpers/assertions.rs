//! Helpers for running the binary and inspecting its output.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use noodles::sam::Header;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::RecordBuf;
use noodles::sam::alignment::record_buf::data::field::Value;
use noodles::sam::alignment::record_buf::data::field::value::Array;
use tempfile::TempDir;

/// Input, output and statistics paths inside a temporary directory.
pub struct TestPaths {
    _dir: TempDir,
    pub input: PathBuf,
    pub output: PathBuf,
    pub stats: PathBuf,
    pub histogram: PathBuf,
}

impl TestPaths {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        Self {
            input: dir.path().join("input.bam"),
            output: dir.path().join("output.bam"),
            stats: dir.path().join("stats.tsv"),
            histogram: dir.path().join("family_sizes.tsv"),
            _dir: dir,
        }
    }
}

/// Runs `fgcollapse collapse` on `paths` with `args` appended.
pub fn run_collapse(paths: &TestPaths, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_fgcollapse"))
        .arg("collapse")
        .arg("--input")
        .arg(&paths.input)
        .arg("--output")
        .arg(&paths.output)
        .arg("--stats")
        .arg(&paths.stats)
        .arg("--family-size-histogram")
        .arg(&paths.histogram)
        .args(args)
        .output()
        .expect("Failed to run fgcollapse")
}

/// Runs the command and fails the test with its stderr if it did not succeed.
pub fn run_collapse_ok(paths: &TestPaths, args: &[&str]) {
    let output = run_collapse(paths, args);
    assert!(output.status.success(), "collapse failed: {}", String::from_utf8_lossy(&output.stderr));
}

/// Reads the header and every record of a BAM.
pub fn read_bam(path: &Path) -> (Header, Vec<RecordBuf>) {
    let mut reader = noodles::bam::io::reader::Builder.build_from_path(path).unwrap();
    let header = reader.read_header().unwrap();
    let records = reader
        .records()
        .map(|result| RecordBuf::try_from_alignment_record(&header, &result.unwrap()).unwrap())
        .collect();
    (header, records)
}

fn tag(name: &str) -> Tag {
    let bytes = name.as_bytes();
    Tag::new(bytes[0], bytes[1])
}

pub fn int_tag(record: &RecordBuf, name: &str) -> Option<i64> {
    match record.data().get(&tag(name))? {
        Value::Int8(v) => Some(i64::from(*v)),
        Value::UInt8(v) => Some(i64::from(*v)),
        Value::Int16(v) => Some(i64::from(*v)),
        Value::UInt16(v) => Some(i64::from(*v)),
        Value::Int32(v) => Some(i64::from(*v)),
        Value::UInt32(v) => Some(i64::from(*v)),
        _ => None,
    }
}

pub fn string_tag(record: &RecordBuf, name: &str) -> Option<String> {
    match record.data().get(&tag(name))? {
        Value::String(s) => Some(s.to_string()),
        _ => None,
    }
}

pub fn u32_array_tag(record: &RecordBuf, name: &str) -> Option<Vec<u32>> {
    match record.data().get(&tag(name))? {
        Value::Array(Array::UInt32(values)) => Some(values.clone()),
        _ => None,
    }
}

/// Reads a one-row-per-line TSV into (header, rows).
pub fn read_tsv(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let content = std::fs::read_to_string(path).unwrap();
    let mut lines = content.lines().map(|line| line.split('\t').map(str::to_string).collect::<Vec<_>>());
    let header = lines.next().unwrap_or_default();
    (header, lines.collect())
}

/// Value of `column` in the single data row of a statistics file.
pub fn stat(path: &Path, column: &str) -> String {
    let (header, rows) = read_tsv(path);
    let index = header.iter().position(|h| h == column).unwrap_or_else(|| panic!("no column {column}"));
    rows[0][index].clone()
}

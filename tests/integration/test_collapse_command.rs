//! End-to-end CLI tests for the collapse command.

use std::fs;

use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::header::record::value::map::program::tag as program_tag;

use crate::helpers::{
    BamBuilder, TestPaths, int_tag, read_bam, read_tsv, run_collapse, run_collapse_ok, stat, string_tag,
    u32_array_tag,
};

/// Two duplicate pairs whose second mates differ in their last base.
fn write_duplicate_pairs(paths: &TestPaths) {
    let mut bam = BamBuilder::new();
    bam.add_pair("q1")
        .start1(1000)
        .start2(1100)
        .bases1("ACGT")
        .bases2("ACGT")
        .quals2(&[30, 30, 30, 10])
        .barcode("ACGTTG")
        .build();
    bam.add_pair("q2")
        .start1(1000)
        .start2(1100)
        .bases1("ACGT")
        .bases2("ACGA")
        .quals2(&[30, 30, 30, 35])
        .barcode("ACGTTG")
        .build();
    bam.write_bam(&paths.input).unwrap();
}

#[test]
fn test_duplicates_collapse_to_higher_quality_call() {
    let paths = TestPaths::new();
    write_duplicate_pairs(&paths);
    run_collapse_ok(&paths, &["--pattern", "NNNNNN"]);

    let (_, records) = read_bam(&paths.output);
    assert_eq!(records.len(), 2);
    let first = records.iter().find(|r| r.flags().is_first_segment()).unwrap();
    let last = records.iter().find(|r| r.flags().is_last_segment()).unwrap();

    let last_bases: Vec<u8> = last.sequence().as_ref().to_vec();
    assert_eq!(last_bases, b"ACGA");
    assert_eq!(first.name(), last.name());
    assert!(first.name().unwrap().to_string().starts_with("collapsed:"));
    assert_eq!(first.alignment_start().map(usize::from), Some(1000));
    assert_eq!(last.alignment_start().map(usize::from), Some(1100));
    assert!(last.flags().is_reverse_complemented());

    for record in [first, last] {
        assert_eq!(int_tag(record, "fs"), Some(2));
        assert_eq!(int_tag(record, "ts"), Some(2));
        assert_eq!(int_tag(record, "bs"), Some(0));
        assert_eq!(int_tag(record, "sb"), Some(0));
        assert_eq!(string_tag(record, "RX").as_deref(), Some("ACGTTG"));
        assert!(string_tag(record, "MI").is_some());
        assert!(u32_array_tag(record, "lc").is_none());
    }
    assert_eq!(int_tag(first, "cD"), Some(2));

    assert_eq!(stat(&paths.stats, "total_pairs"), "2");
    assert_eq!(stat(&paths.stats, "families"), "1");
    assert_eq!(stat(&paths.stats, "consensus_pairs"), "1");
}

#[test]
fn test_malformed_barcode_is_counted_and_run_continues() {
    let paths = TestPaths::new();
    let mut bam = BamBuilder::new();
    bam.add_pair("short").start1(1000).start2(1100).barcode("ACGTT").build();
    bam.add_pair("ok").start1(2000).start2(2100).barcode("ACGTTG").build();
    bam.write_bam(&paths.input).unwrap();

    run_collapse_ok(&paths, &["--pattern", "NNNNNN"]);

    let (_, records) = read_bam(&paths.output);
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.alignment_start().map(usize::from) >= Some(2000)));
    assert_eq!(stat(&paths.stats, "discarded_malformed_barcode"), "1");
    assert_eq!(stat(&paths.stats, "accepted_pairs"), "1");
}

#[test]
fn test_equal_quality_overlap_conflict_is_marked_low_confidence() {
    let paths = TestPaths::new();
    let mut bam = BamBuilder::new();
    bam.add_pair("q1").start1(1000).start2(1003).bases1("ACGA").bases2("TCCC").barcode("ACGTTG").build();
    bam.write_bam(&paths.input).unwrap();

    run_collapse_ok(&paths, &["--pattern", "NNNNNN"]);

    let (_, records) = read_bam(&paths.output);
    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(u32_array_tag(record, "lc"), Some(vec![1003]));
    }
    assert_eq!(stat(&paths.stats, "low_confidence_positions"), "1");
}

#[test]
fn test_discordant_pairs_are_excluded() {
    let paths = TestPaths::new();
    let mut bam = BamBuilder::new();
    bam.add_pair("split").start1(1000).contig2(1).start2(1100).barcode("ACGTTG").build();
    bam.add_pair("ok").start1(1500).start2(1600).barcode("ACGTTG").build();
    bam.write_bam(&paths.input).unwrap();

    run_collapse_ok(&paths, &["--pattern", "NNNNNN"]);

    let (_, records) = read_bam(&paths.output);
    assert_eq!(records.len(), 2);
    assert_eq!(stat(&paths.stats, "discarded_discordant"), "1");
    assert_eq!(stat(&paths.stats, "total_pairs"), "2");
}

#[test]
fn test_barcodes_outside_tolerance_form_separate_families() {
    let paths = TestPaths::new();
    let mut bam = BamBuilder::new();
    bam.add_pair("q1").barcode("AAAAAA").build();
    bam.add_pair("q2").barcode("AAAAAT").build();
    bam.add_pair("q3").barcode("AAAATT").build();
    bam.write_bam(&paths.input).unwrap();

    run_collapse_ok(&paths, &["--pattern", "NNNNNN", "--max-mismatches", "0"]);
    let (_, records) = read_bam(&paths.output);
    assert_eq!(records.len(), 6);

    run_collapse_ok(&paths, &["--pattern", "NNNNNN", "--max-mismatches", "2"]);
    let (_, records) = read_bam(&paths.output);
    assert_eq!(records.len(), 2);
    assert_eq!(int_tag(&records[0], "fs"), Some(3));
}

#[test]
fn test_read_mismatch_filter_uses_nm_tag() {
    let paths = TestPaths::new();
    let mut bam = BamBuilder::new();
    bam.add_pair("clean").barcode("ACGTTG").attr("NM", 1i32).build();
    bam.add_pair("noisy").start1(1200).start2(1300).barcode("ACGTTG").attr("NM", 6i32).build();
    bam.write_bam(&paths.input).unwrap();

    run_collapse_ok(&paths, &["--pattern", "NNNNNN", "--max-read-mismatches", "3"]);

    let (_, records) = read_bam(&paths.output);
    assert_eq!(records.len(), 2);
    assert_eq!(stat(&paths.stats, "discarded_excessive_mismatches"), "1");
}

#[test]
fn test_reference_breaks_quality_ties() {
    let paths = TestPaths::new();
    let mut bam = BamBuilder::new();
    bam.add_pair("q1").bases1("AAAA").bases2("ACGT").barcode("ACGTTG").build();
    bam.add_pair("q2").bases1("ACAA").bases2("ACGT").barcode("ACGTTG").build();
    bam.write_bam(&paths.input).unwrap();

    // Position 1001 holds C in the reference.
    let fasta = paths.input.with_extension("fa");
    let mut chr1 = "A".repeat(2000).into_bytes();
    chr1[1000] = b'C';
    fs::write(&fasta, format!(">chr1\n{}\n", String::from_utf8(chr1).unwrap())).unwrap();

    run_collapse_ok(&paths, &["--pattern", "NNNNNN"]);
    let (_, records) = read_bam(&paths.output);
    let first = records.iter().find(|r| r.flags().is_first_segment()).unwrap();
    assert_eq!(first.sequence().as_ref(), b"AAAA");

    run_collapse_ok(&paths, &["--pattern", "NNNNNN", "--reference", fasta.to_str().unwrap()]);
    let (_, records) = read_bam(&paths.output);
    let first = records.iter().find(|r| r.flags().is_first_segment()).unwrap();
    assert_eq!(first.sequence().as_ref(), b"ACAA");
}

#[test]
fn test_output_header_records_program() {
    let paths = TestPaths::new();
    write_duplicate_pairs(&paths);
    run_collapse_ok(&paths, &["--pattern", "NNNNNN"]);

    let (header, _) = read_bam(&paths.output);
    assert_eq!(header.reference_sequences().len(), 2);
    let program = header.programs().as_ref().get(b"fgcollapse".as_slice()).expect("fgcollapse @PG");
    let previous = program.other_fields().get(&program_tag::PREVIOUS_PROGRAM_ID);
    assert_eq!(previous.map(|v| v.to_string()).as_deref(), Some("aligner"));
    let command_line = program.other_fields().get(&program_tag::COMMAND_LINE).unwrap().to_string();
    assert!(command_line.contains("collapse"));
}

#[test]
fn test_family_size_histogram_is_written() {
    let paths = TestPaths::new();
    let mut bam = BamBuilder::new();
    bam.add_pair("a1").barcode("AAAAAA").build();
    bam.add_pair("a2").barcode("AAAAAA").build();
    bam.add_pair("c1").barcode("CCCCCC").build();
    bam.write_bam(&paths.input).unwrap();

    run_collapse_ok(&paths, &["--pattern", "NNNNNN", "--max-mismatches", "0"]);

    let (header, rows) = read_tsv(&paths.histogram);
    assert_eq!(header[0], "family_size");
    let counts: Vec<(String, String)> = rows.iter().map(|row| (row[0].clone(), row[1].clone())).collect();
    assert_eq!(counts, vec![("1".to_string(), "1".to_string()), ("2".to_string(), "1".to_string())]);
    assert_eq!(stat(&paths.stats, "singleton_families"), "1");
}

#[test]
fn test_strand_bias_flag_on_one_sided_family() {
    let paths = TestPaths::new();
    let mut bam = BamBuilder::new();
    for i in 0..4 {
        bam.add_pair(&format!("q{i}")).barcode("ACG-TTG").build();
    }
    bam.write_bam(&paths.input).unwrap();

    run_collapse_ok(&paths, &["--pattern", "NNN-NNN", "--strand-bias-threshold", "0.9"]);

    let (_, records) = read_bam(&paths.output);
    assert_eq!(int_tag(&records[0], "sb"), Some(1));
    assert_eq!(stat(&paths.stats, "strand_biased_families"), "1");
}

#[test]
fn test_unsplit_pattern_never_flags_strand_bias() {
    let paths = TestPaths::new();
    let mut bam = BamBuilder::new();
    for i in 0..4 {
        bam.add_pair(&format!("q{i}")).barcode("ACGTTG").build();
    }
    bam.write_bam(&paths.input).unwrap();

    run_collapse_ok(&paths, &["--pattern", "NNNNNN", "--strand-bias-threshold", "0.9"]);

    let (_, records) = read_bam(&paths.output);
    assert_eq!(int_tag(&records[0], "fs"), Some(4));
    assert_eq!(int_tag(&records[0], "sb"), Some(0));
    assert_eq!(stat(&paths.stats, "strand_biased_families"), "0");
}

#[test]
fn test_pair_without_qualities_is_counted_and_run_continues() {
    let paths = TestPaths::new();
    let mut bam = BamBuilder::new();
    bam.add_pair("missing").start2(1005).quals1(&[]).barcode("ACGTTG").build();
    bam.add_pair("ok").start2(1005).barcode("ACGTTG").build();
    bam.write_bam(&paths.input).unwrap();

    run_collapse_ok(&paths, &["--pattern", "NNNNNN"]);

    let (_, records) = read_bam(&paths.output);
    assert_eq!(records.len(), 2);
    assert_eq!(int_tag(&records[0], "fs"), Some(1));
    assert_eq!(stat(&paths.stats, "discarded_missing_qualities"), "1");
}

/// A top-strand pair and a bottom-strand pair of one molecule whose barcodes differ at one base.
fn write_duplex_pairs(paths: &TestPaths) {
    let mut bam = BamBuilder::new();
    bam.add_pair("top").barcode("AAC-GGT").build();
    bam.add_pair("bottom").bottom_strand().start1(1100).start2(1000).barcode("GGA-AAC").build();
    bam.write_bam(&paths.input).unwrap();
}

#[test]
fn test_duplex_join_tolerance() {
    let paths = TestPaths::new();
    write_duplex_pairs(&paths);

    run_collapse_ok(&paths, &["--pattern", "NNN-NNN", "--max-mismatches", "0", "--duplex-max-mismatches", "1"]);
    let (_, records) = read_bam(&paths.output);
    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(int_tag(record, "fs"), Some(2));
        assert_eq!(int_tag(record, "ts"), Some(1));
        assert_eq!(int_tag(record, "bs"), Some(1));
        assert_eq!(string_tag(record, "RX").as_deref(), Some("AACGGT"));
    }

    run_collapse_ok(&paths, &["--pattern", "NNN-NNN", "--max-mismatches", "0", "--duplex-max-mismatches", "0"]);
    let (_, records) = read_bam(&paths.output);
    assert_eq!(records.len(), 4);
    assert_eq!(stat(&paths.stats, "singleton_families"), "2");
}

#[test]
fn test_duplex_mask_limits_compared_positions() {
    let paths = TestPaths::new();
    write_duplex_pairs(&paths);

    run_collapse_ok(
        &paths,
        &["--pattern", "NNN-NNN", "--max-mismatches", "0", "--duplex-max-mismatches", "0", "--duplex-mask", "110"],
    );
    let (_, records) = read_bam(&paths.output);
    assert_eq!(records.len(), 2);
    assert_eq!(int_tag(&records[0], "fs"), Some(2));
}

#[test]
fn test_duplex_options_need_a_split_pattern() {
    let paths = TestPaths::new();
    write_duplicate_pairs(&paths);

    let output = run_collapse(&paths, &["--pattern", "NNNNNN", "--duplex-mask", "110011"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("duplex-mask"));
}

#[test]
fn test_custom_barcode_tag() {
    let paths = TestPaths::new();
    let mut bam = BamBuilder::new();
    bam.add_pair("q1").attr("BC", "ACGTTG").build();
    bam.write_bam(&paths.input).unwrap();

    let output = run_collapse(&paths, &["--pattern", "NNNNNN"]);
    assert!(output.status.success());
    assert_eq!(stat(&paths.stats, "discarded_malformed_barcode"), "1");

    run_collapse_ok(&paths, &["--pattern", "NNNNNN", "--barcode-tag", "BC"]);
    let (_, records) = read_bam(&paths.output);
    assert_eq!(records.len(), 2);
    assert!(records[0].data().get(&Tag::new(b'R', b'X')).is_some());
}

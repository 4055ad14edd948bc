//! The threaded pipeline must write exactly what the single-threaded path writes.

use rstest::rstest;

use crate::helpers::{BamBuilder, TestPaths, read_bam, read_tsv, run_collapse_ok};

/// Families at many positions, with barcodes that partly fall within tolerance.
fn write_many_families(paths: &TestPaths) {
    let barcodes = ["ACGTTG", "ACGTTA", "GGCCAA", "TTTTTT", "ACGAAG"];
    let bases = ["ACGTACGTAC", "ACGTACGTAA", "TCGTACGTAC", "ACGTTCGTAC"];
    let mut bam = BamBuilder::new();
    for i in 0..300 {
        let start = 1000 + (i / 6) * 9;
        let quals: Vec<u8> = (0..10).map(|j| 12 + ((i * 5 + j) % 28) as u8).collect();
        let mut pair = bam
            .add_pair(&format!("q{i:04}"))
            .start1(start)
            .start2(start + 6)
            .bases1(bases[i % 4])
            .bases2(bases[(i + 1) % 4])
            .quals1(&quals)
            .quals2(&quals)
            .barcode(barcodes[i % 5]);
        if i % 7 == 0 {
            pair = pair.bottom_strand();
        }
        pair.build();
    }
    bam.write_bam(&paths.input).unwrap();
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(8)]
fn test_threaded_output_matches_single_threaded(#[case] threads: usize) {
    let serial = TestPaths::new();
    write_many_families(&serial);
    run_collapse_ok(&serial, &["--pattern", "NNNNNN"]);

    let threaded = TestPaths::new();
    write_many_families(&threaded);
    let threads = threads.to_string();
    run_collapse_ok(
        &threaded,
        &["--pattern", "NNNNNN", "--threads", &threads, "--queue-capacity", "2", "--batch-size", "5"],
    );

    let (_, expected) = read_bam(&serial.output);
    let (_, actual) = read_bam(&threaded.output);
    assert!(!expected.is_empty());
    assert_eq!(actual, expected);
    assert_eq!(read_tsv(&threaded.stats), read_tsv(&serial.stats));
    assert_eq!(read_tsv(&threaded.histogram), read_tsv(&serial.histogram));
}

//! Utilities for generating test BAM data programmatically.

#![allow(dead_code)]

use std::num::NonZeroUsize;
use std::path::Path;

use bstr::BString;
use noodles::core::Position;
use noodles::sam::Header;
use noodles::sam::alignment::io::Write as AlignmentWrite;
use noodles::sam::alignment::record::Flags;
use noodles::sam::alignment::record::MappingQuality;
use noodles::sam::alignment::record::cigar::op::{Kind, Op};
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::data::field::Value as BufValue;
use noodles::sam::alignment::record_buf::{QualityScores, RecordBuf, Sequence};
use noodles::sam::header::record::value::Map;
use noodles::sam::header::record::value::map::{Program, ReferenceSequence};

/// Length of each test reference sequence.
pub const REFERENCE_LENGTH: usize = 100_000;

/// Accumulates read pairs and writes them as a coordinate-sorted BAM.
pub struct BamBuilder {
    header: Header,
    records: Vec<RecordBuf>,
}

impl BamBuilder {
    /// Creates a builder with references `chr1` and `chr2`.
    pub fn new() -> Self {
        let mut builder = Header::builder();
        for name in ["chr1", "chr2"] {
            let map = Map::<ReferenceSequence>::new(NonZeroUsize::new(REFERENCE_LENGTH).unwrap());
            builder = builder.add_reference_sequence(BString::from(name), map);
        }
        builder = builder.add_program(BString::from("aligner"), Map::<Program>::default());
        Self { header: builder.build(), records: Vec::new() }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Starts a pair named `name` with mate A on chr1.
    pub fn add_pair(&mut self, name: &str) -> PairBuilder<'_> {
        PairBuilder {
            parent: self,
            name: name.to_string(),
            contig: 0,
            contig2: None,
            start1: 1000,
            start2: 1100,
            bases1: "ACGTACGTAC".to_string(),
            bases2: "ACGTACGTAC".to_string(),
            quals1: None,
            quals2: None,
            reverse1: false,
            reverse2: true,
            barcode: None,
            attrs: Vec::new(),
        }
    }

    /// Writes the records sorted by coordinate.
    pub fn write_bam(&mut self, path: &Path) -> std::io::Result<()> {
        self.records.sort_by_key(|r| (r.reference_sequence_id(), r.alignment_start()));
        self.write_bam_unsorted(path)
    }

    /// Writes the records in the order they were added.
    pub fn write_bam_unsorted(&self, path: &Path) -> std::io::Result<()> {
        let file = std::fs::File::create(path)?;
        let mut writer = noodles::bam::io::Writer::new(file);
        writer.write_header(&self.header)?;
        for record in &self.records {
            writer.write_alignment_record(&self.header, record)?;
        }
        writer.try_finish()
    }
}

/// Builder for one read pair. Mate A is the first segment.
pub struct PairBuilder<'a> {
    parent: &'a mut BamBuilder,
    name: String,
    contig: usize,
    contig2: Option<usize>,
    start1: usize,
    start2: usize,
    bases1: String,
    bases2: String,
    quals1: Option<Vec<u8>>,
    quals2: Option<Vec<u8>>,
    reverse1: bool,
    reverse2: bool,
    barcode: Option<String>,
    attrs: Vec<(Tag, BufValue)>,
}

impl PairBuilder<'_> {
    pub fn contig(mut self, contig: usize) -> Self {
        self.contig = contig;
        self
    }

    pub fn contig2(mut self, contig: usize) -> Self {
        self.contig2 = Some(contig);
        self
    }

    pub fn start1(mut self, start: usize) -> Self {
        self.start1 = start;
        self
    }

    pub fn start2(mut self, start: usize) -> Self {
        self.start2 = start;
        self
    }

    pub fn bases1(mut self, bases: &str) -> Self {
        self.bases1 = bases.to_string();
        self
    }

    pub fn bases2(mut self, bases: &str) -> Self {
        self.bases2 = bases.to_string();
        self
    }

    pub fn quals1(mut self, quals: &[u8]) -> Self {
        self.quals1 = Some(quals.to_vec());
        self
    }

    pub fn quals2(mut self, quals: &[u8]) -> Self {
        self.quals2 = Some(quals.to_vec());
        self
    }

    /// Puts mate A on the reverse strand and mate B on the forward strand.
    pub fn bottom_strand(mut self) -> Self {
        self.reverse1 = true;
        self.reverse2 = false;
        self
    }

    /// Sets the RX barcode on mate A.
    pub fn barcode(mut self, barcode: &str) -> Self {
        self.barcode = Some(barcode.to_string());
        self
    }

    pub fn attr<V: Into<BufValue>>(mut self, tag: &str, value: V) -> Self {
        let bytes = tag.as_bytes();
        self.attrs.push((Tag::new(bytes[0], bytes[1]), value.into()));
        self
    }

    pub fn build(self) {
        let contig2 = self.contig2.unwrap_or(self.contig);
        let quals1 = self.quals1.clone().unwrap_or_else(|| vec![30; self.bases1.len()]);
        let quals2 = self.quals2.clone().unwrap_or_else(|| vec![30; self.bases2.len()]);

        let mut first = mate(
            &self.name,
            Flags::FIRST_SEGMENT,
            (self.contig, self.start1, self.reverse1, &self.bases1, quals1),
            (contig2, self.start2, self.reverse2),
        );
        let mut second = mate(
            &self.name,
            Flags::LAST_SEGMENT,
            (contig2, self.start2, self.reverse2, &self.bases2, quals2),
            (self.contig, self.start1, self.reverse1),
        );

        if let Some(barcode) = &self.barcode {
            first.data_mut().insert(Tag::new(b'R', b'X'), BufValue::from(barcode.clone()));
        }
        for (tag, value) in &self.attrs {
            first.data_mut().insert(*tag, value.clone());
            second.data_mut().insert(*tag, value.clone());
        }

        if self.contig == contig2 {
            let left = self.start1.min(self.start2);
            let right = (self.start1 + self.bases1.len()).max(self.start2 + self.bases2.len());
            let tlen = i32::try_from(right - left).unwrap();
            *first.template_length_mut() = if self.start1 <= self.start2 { tlen } else { -tlen };
            *second.template_length_mut() = if self.start1 <= self.start2 { -tlen } else { tlen };
        }

        self.parent.records.push(first);
        self.parent.records.push(second);
    }
}

fn mate(
    name: &str,
    segment: Flags,
    (contig, start, reverse, bases, quals): (usize, usize, bool, &str, Vec<u8>),
    (mate_contig, mate_start, mate_reverse): (usize, usize, bool),
) -> RecordBuf {
    let mut flags = Flags::SEGMENTED | segment;
    if reverse {
        flags |= Flags::REVERSE_COMPLEMENTED;
    }
    if mate_reverse {
        flags |= Flags::MATE_REVERSE_COMPLEMENTED;
    }

    let mut record = RecordBuf::default();
    *record.name_mut() = Some(BString::from(name));
    *record.flags_mut() = flags;
    *record.reference_sequence_id_mut() = Some(contig);
    *record.alignment_start_mut() = Position::new(start);
    *record.mapping_quality_mut() = MappingQuality::new(60);
    *record.cigar_mut() = [Op::new(Kind::Match, bases.len())].into_iter().collect();
    *record.sequence_mut() = Sequence::from(bases.as_bytes().to_vec());
    *record.quality_scores_mut() = QualityScores::from(quals);
    *record.mate_reference_sequence_id_mut() = Some(mate_contig);
    *record.mate_alignment_start_mut() = Position::new(mate_start);
    record
}

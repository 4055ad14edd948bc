//! Emitting reconciled pairs.
//!
//! [`OutputAssembler`] enforces the coordinate order of the emitted pairs and turns any
//! write failure into a fatal [`CollapseError::Output`]. The [`PairWriter`] behind it decides
//! where pairs go: a BAM file ([`BamPairWriter`]) or memory ([`PairCollector`]).

use std::io::{self, Write};

use bstr::BString;
use noodles::core::Position;
use noodles::sam::Header;
use noodles::sam::alignment::io::Write as AlignmentWrite;
use noodles::sam::alignment::record::Flags;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::data::field::Value as BufValue;
use noodles::sam::alignment::record_buf::{QualityScores, RecordBuf, Sequence};

use crate::consensus::{ConsensusRecord, ReconciledPair};
use crate::errors::{CollapseError, Result};
use crate::read_pair::Strand;

/// Family id.
pub const MOLECULE_ID_TAG: Tag = Tag::new(b'M', b'I');
/// Canonical barcode of the family.
pub const BARCODE_TAG: Tag = Tag::new(b'R', b'X');
pub const FAMILY_SIZE_TAG: Tag = Tag::new(b'f', b's');
pub const TOP_STRAND_TAG: Tag = Tag::new(b't', b's');
pub const BOTTOM_STRAND_TAG: Tag = Tag::new(b'b', b's');
pub const STRAND_BIAS_TAG: Tag = Tag::new(b's', b'b');
/// 1-based reference positions left ambiguous by overlap reconciliation.
pub const LOW_CONFIDENCE_TAG: Tag = Tag::new(b'l', b'c');
pub const MAX_DEPTH_TAG: Tag = Tag::new(b'c', b'D');
pub const MIN_DEPTH_TAG: Tag = Tag::new(b'c', b'M');
pub const ERROR_RATE_TAG: Tag = Tag::new(b'c', b'E');
pub const PER_BASE_DEPTH_TAG: Tag = Tag::new(b'c', b'd');
pub const PER_BASE_ERROR_TAG: Tag = Tag::new(b'c', b'e');

/// A destination for reconciled pairs.
pub trait PairWriter {
    /// Writes both records of `pair`.
    fn write_pair(&mut self, pair: &ReconciledPair) -> io::Result<()>;

    /// Flushes buffered output. Called once after the last pair.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Keeps pairs in memory.
#[derive(Debug, Default)]
pub struct PairCollector {
    pub pairs: Vec<ReconciledPair>,
}

impl PairWriter for PairCollector {
    fn write_pair(&mut self, pair: &ReconciledPair) -> io::Result<()> {
        self.pairs.push(pair.clone());
        Ok(())
    }
}

/// Writes pairs as BAM records.
///
/// Both records of a pair are encoded before either reaches the underlying writer, so a
/// record that cannot be encoded never leaves half a pair in the output.
pub struct BamPairWriter<W: Write> {
    writer: noodles::bam::io::Writer<W>,
    header: Header,
    read_name_prefix: String,
    /// Encoded records of the pair being written.
    scratch: noodles::bam::io::Writer<Vec<u8>>,
}

impl<W: Write> BamPairWriter<W> {
    /// Wraps a writer whose header has already been written.
    pub fn new(writer: noodles::bam::io::Writer<W>, header: Header, read_name_prefix: impl Into<String>) -> Self {
        Self {
            writer,
            header,
            read_name_prefix: read_name_prefix.into(),
            scratch: noodles::bam::io::Writer::from(Vec::new()),
        }
    }

    pub fn into_inner(self) -> noodles::bam::io::Writer<W> {
        self.writer
    }
}

impl<W: Write> PairWriter for BamPairWriter<W> {
    fn write_pair(&mut self, pair: &ReconciledPair) -> io::Result<()> {
        let [first, last] = to_records(pair, &self.read_name_prefix);
        self.scratch.get_mut().clear();
        self.scratch.write_alignment_record(&self.header, &first)?;
        self.scratch.write_alignment_record(&self.header, &last)?;
        self.writer.get_mut().write_all(self.scratch.get_ref())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.get_mut().flush()
    }
}

/// Converts a reconciled pair into its first- and last-segment records.
#[must_use]
pub fn to_records(pair: &ReconciledPair, read_name_prefix: &str) -> [RecordBuf; 2] {
    let name = BString::from(format!("{read_name_prefix}:{}", pair.summary.family_id));
    let (a, b) = (&pair.mate_a, &pair.mate_b);

    let left = a.start.min(b.start);
    let right = a.end().max(b.end());
    let span = i32::try_from(right + 1 - left).unwrap_or(i32::MAX);
    let tlen = if a.ref_id == b.ref_id { span } else { 0 };

    let mut first = base_record(name.clone(), a, b, Flags::FIRST_SEGMENT, tlen);
    let mut last = base_record(name, b, a, Flags::LAST_SEGMENT, -tlen);
    for record in [&mut first, &mut last] {
        add_family_tags(record, pair);
    }
    add_depth_tags(&mut first, a);
    add_depth_tags(&mut last, b);
    [first, last]
}

fn base_record(name: BString, read: &ConsensusRecord, mate: &ConsensusRecord, segment: Flags, tlen: i32) -> RecordBuf {
    let mut flags = Flags::SEGMENTED | segment;
    if read.strand == Strand::Reverse {
        flags |= Flags::REVERSE_COMPLEMENTED;
    }
    if mate.strand == Strand::Reverse {
        flags |= Flags::MATE_REVERSE_COMPLEMENTED;
    }

    let mut record = RecordBuf::default();
    *record.name_mut() = Some(name);
    *record.flags_mut() = flags;
    *record.reference_sequence_id_mut() = Some(read.ref_id);
    *record.alignment_start_mut() = Position::new(read.start);
    *record.cigar_mut() = read.cigar.iter().copied().collect();
    *record.sequence_mut() = Sequence::from(read.bases.clone());
    *record.quality_scores_mut() = QualityScores::from(read.quals.clone());
    *record.mate_reference_sequence_id_mut() = Some(mate.ref_id);
    *record.mate_alignment_start_mut() = Position::new(mate.start);
    *record.template_length_mut() = tlen;
    record
}

fn add_family_tags(record: &mut RecordBuf, pair: &ReconciledPair) {
    let summary = &pair.summary;
    let data = record.data_mut();
    data.insert(MOLECULE_ID_TAG, BufValue::from(summary.family_id.to_string()));
    data.insert(BARCODE_TAG, BufValue::from(String::from_utf8_lossy(&summary.barcode).into_owned()));
    data.insert(FAMILY_SIZE_TAG, int_value(summary.size));
    data.insert(TOP_STRAND_TAG, int_value(summary.strand_counts.top));
    data.insert(BOTTOM_STRAND_TAG, int_value(summary.strand_counts.bottom));
    data.insert(STRAND_BIAS_TAG, int_value(usize::from(summary.strand_biased)));
    if !pair.low_confidence.is_empty() {
        let positions: Vec<u32> =
            pair.low_confidence.iter().map(|&p| u32::try_from(p).unwrap_or(u32::MAX)).collect();
        data.insert(LOW_CONFIDENCE_TAG, BufValue::from(positions));
    }
}

fn add_depth_tags(record: &mut RecordBuf, read: &ConsensusRecord) {
    let to_i16 = |values: &[u16]| -> Vec<i16> {
        values.iter().map(|&v| i16::try_from(v).unwrap_or(i16::MAX)).collect()
    };
    let data = record.data_mut();
    data.insert(MAX_DEPTH_TAG, int_value(usize::from(read.max_depth())));
    data.insert(MIN_DEPTH_TAG, int_value(usize::from(read.min_depth())));
    data.insert(ERROR_RATE_TAG, BufValue::from(read.error_rate()));
    data.insert(PER_BASE_DEPTH_TAG, BufValue::from(to_i16(&read.depths)));
    data.insert(PER_BASE_ERROR_TAG, BufValue::from(to_i16(&read.errors)));
}

/// Smallest signed integer value holding `value`.
fn int_value(value: usize) -> BufValue {
    if let Ok(v) = i8::try_from(value) {
        BufValue::Int8(v)
    } else if let Ok(v) = i16::try_from(value) {
        BufValue::Int16(v)
    } else {
        BufValue::Int32(i32::try_from(value).unwrap_or(i32::MAX))
    }
}

/// Writes pairs in coordinate order, failing fatally on any write error.
pub struct OutputAssembler<W: PairWriter> {
    writer: W,
    last: Option<(usize, usize)>,
    written: u64,
}

impl<W: PairWriter> OutputAssembler<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, last: None, written: 0 }
    }

    /// Number of pairs written so far.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Emits `pair`, which must not precede the previous pair's (reference, bin).
    pub fn write(&mut self, pair: &ReconciledPair) -> Result<()> {
        let coordinate = (pair.summary.ref_id, pair.summary.bin);
        if let Some(last) = self.last.filter(|&last| coordinate < last) {
            return Err(CollapseError::Pipeline(format!(
                "family {} at {}:{} emitted after {}:{}",
                pair.summary.family_id, coordinate.0, coordinate.1, last.0, last.1
            )));
        }
        self.writer.write_pair(pair).map_err(CollapseError::Output)?;
        self.last = Some(coordinate);
        self.written += 1;
        Ok(())
    }

    /// Flushes and returns the writer.
    pub fn finish(mut self) -> Result<W> {
        self.writer.finish().map_err(CollapseError::Output)?;
        Ok(self.writer)
    }
}

//! Pairing coordinate-sorted BAM records into [`ReadPair`]s.
//!
//! The [`MatePairer`] holds the first-seen mate of each template until its partner arrives,
//! then releases completed pairs ordered by their leftmost mate. [`PairReader`] drives a
//! pairer from a BAM reader.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::io::BufRead;

use ahash::AHashMap;
use bstr::BString;
use noodles::sam::Header;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::RecordBuf;
use noodles::sam::alignment::record_buf::data::field::Value;

use crate::barcode::HALF_SEPARATOR;
use crate::errors::{CollapseError, Result};
use crate::metrics::{CollapseMetrics, RejectionReason};
use crate::read_pair::{Mate, ReadPair, Strand};

/// Reference index, 1-based start and arrival order of a mate.
type SlotKey = (usize, usize, u64);

struct PendingMate {
    key: SlotKey,
    expected: SlotKey,
    mate: Mate,
    first_segment: bool,
    barcode: Option<Vec<u8>>,
}

/// Joins mates by read name over a coordinate-sorted record stream.
pub struct MatePairer {
    barcode_tag: Tag,
    pending: AHashMap<BString, PendingMate>,
    /// Coordinates of the held first mates
    waiting: BTreeSet<SlotKey>,
    /// Where each held mate's partner should appear
    expected: BTreeMap<SlotKey, BString>,
    completed: BTreeMap<SlotKey, ReadPair>,
    last: Option<(usize, usize)>,
    records_seen: u64,
    next_slot: u64,
    metrics: CollapseMetrics,
}

impl MatePairer {
    /// Creates a pairer reading barcode fragments from `barcode_tag`.
    #[must_use]
    pub fn new(barcode_tag: Tag) -> Self {
        Self {
            barcode_tag,
            pending: AHashMap::new(),
            waiting: BTreeSet::new(),
            expected: BTreeMap::new(),
            completed: BTreeMap::new(),
            last: None,
            records_seen: 0,
            next_slot: 0,
            metrics: CollapseMetrics::new(),
        }
    }

    /// Counts gathered while pairing: filtered and unpaired records, discordant pairs.
    #[must_use]
    pub fn metrics(&self) -> &CollapseMetrics {
        &self.metrics
    }

    /// Number of mates waiting for their partner.
    #[must_use]
    pub fn pending_mates(&self) -> usize {
        self.pending.len()
    }

    /// Adds one record.
    ///
    /// Fails with [`CollapseError::UnsortedInput`] when a mapped record lies before one
    /// already read. Filtered, discordant and orphaned records are counted, not returned.
    pub fn push(&mut self, record: RecordBuf) -> Result<()> {
        let record_index = self.records_seen;
        self.records_seen += 1;

        let flags = record.flags();
        let position = record.reference_sequence_id().zip(record.alignment_start().map(usize::from));
        if let (Some(coordinate), false) = (position, flags.is_unmapped()) {
            if let Some(previous) = self.last.filter(|&previous| coordinate < previous) {
                return Err(CollapseError::UnsortedInput {
                    record_index,
                    ref_id: coordinate.0,
                    position: coordinate.1,
                    previous_ref_id: previous.0,
                    previous_position: previous.1,
                });
            }
            self.last = Some(coordinate);
            self.abandon_before(coordinate);
        }

        if !flags.is_segmented()
            || flags.is_unmapped()
            || flags.is_mate_unmapped()
            || flags.is_secondary()
            || flags.is_supplementary()
            || flags.is_qc_fail()
        {
            self.metrics.record_rejection(RejectionReason::FilteredRecord);
            return Ok(());
        }

        let mate_position =
            record.mate_reference_sequence_id().zip(record.mate_alignment_start().map(usize::from));
        let (Some((ref_id, start)), Some((mate_ref_id, mate_start)), Some(name)) =
            (position, mate_position, record.name().map(BString::from))
        else {
            self.metrics.record_rejection(RejectionReason::FilteredRecord);
            return Ok(());
        };

        if ref_id != mate_ref_id {
            if flags.is_first_segment() {
                self.metrics.total_pairs += 1;
                self.metrics.record_rejection(RejectionReason::DiscordantPair);
            }
            return Ok(());
        }

        let mate = mate_from_record(&record, ref_id, start);
        let barcode = self.barcode_of(&record);

        if let Some(first) = self.pending.remove(&name) {
            self.waiting.remove(&first.key);
            self.expected.remove(&first.expected);
            let barcode = first.barcode.or(barcode).unwrap_or_default();
            let (mate_a, mate_b) = if first.first_segment { (first.mate, mate) } else { (mate, first.mate) };
            self.completed.insert(first.key, ReadPair { name, mate_a, mate_b, barcode });
            return Ok(());
        }

        let slot = self.next_slot;
        self.next_slot += 1;
        let expected = (mate_ref_id, mate_start, slot);
        if (mate_ref_id, mate_start) < (ref_id, start) {
            // The partner should already have been read
            self.metrics.record_rejection(RejectionReason::UnpairedRead);
            return Ok(());
        }
        let key = (ref_id, start, slot);
        self.waiting.insert(key);
        self.expected.insert(expected, name.clone());
        self.pending.insert(name, PendingMate { key, expected, mate, first_segment: flags.is_first_segment(), barcode });
        Ok(())
    }

    /// Removes the next completed pair that no held mate can precede.
    pub fn pop_ready(&mut self) -> Option<ReadPair> {
        let (&key, _) = self.completed.first_key_value()?;
        if self.waiting.first().is_some_and(|&held| held < key) {
            return None;
        }
        self.completed.pop_first().map(|(_, pair)| pair)
    }

    /// Ends the input: counts every held mate as unpaired and returns the remaining pairs.
    pub fn finish(&mut self) -> Vec<ReadPair> {
        let orphans = self.pending.len();
        for _ in 0..orphans {
            self.metrics.record_rejection(RejectionReason::UnpairedRead);
        }
        self.pending.clear();
        self.waiting.clear();
        self.expected.clear();
        std::mem::take(&mut self.completed).into_values().collect()
    }

    /// Drops held mates whose partner should have appeared before `coordinate`.
    fn abandon_before(&mut self, coordinate: (usize, usize)) {
        while let Some(entry) = self.expected.first_entry() {
            if (entry.key().0, entry.key().1) >= coordinate {
                break;
            }
            let name = entry.remove();
            if let Some(orphan) = self.pending.remove(&name) {
                self.waiting.remove(&orphan.key);
                self.metrics.record_rejection(RejectionReason::UnpairedRead);
            }
        }
    }

    fn barcode_of(&self, record: &RecordBuf) -> Option<Vec<u8>> {
        match record.data().get(&self.barcode_tag) {
            Some(Value::String(s)) => Some(s.iter().copied().filter(|&b| b != HALF_SEPARATOR).collect()),
            _ => None,
        }
    }
}

fn mate_from_record(record: &RecordBuf, ref_id: usize, start: usize) -> Mate {
    let strand =
        if record.flags().is_reverse_complemented() { Strand::Reverse } else { Strand::Forward };
    Mate {
        ref_id,
        start,
        strand,
        cigar: record.cigar().as_ref().to_vec(),
        bases: record.sequence().as_ref().to_vec(),
        quals: record.quality_scores().as_ref().to_vec(),
        mismatches: int_tag(record, Tag::EDIT_DISTANCE).and_then(|nm| u32::try_from(nm).ok()),
    }
}

fn int_tag(record: &RecordBuf, tag: Tag) -> Option<i64> {
    match record.data().get(&tag)? {
        Value::Int8(v) => Some(i64::from(*v)),
        Value::UInt8(v) => Some(i64::from(*v)),
        Value::Int16(v) => Some(i64::from(*v)),
        Value::UInt16(v) => Some(i64::from(*v)),
        Value::Int32(v) => Some(i64::from(*v)),
        Value::UInt32(v) => Some(i64::from(*v)),
        _ => None,
    }
}

/// Reads [`ReadPair`]s from a coordinate-sorted BAM.
pub struct PairReader<R> {
    reader: noodles::bam::io::Reader<R>,
    header: Header,
    pairer: MatePairer,
    record: RecordBuf,
    drained: Option<VecDeque<ReadPair>>,
}

impl<R: BufRead> PairReader<R> {
    /// Wraps a BAM reader whose header has already been read.
    pub fn new(reader: noodles::bam::io::Reader<R>, header: Header, barcode_tag: Tag) -> Self {
        Self { reader, header, pairer: MatePairer::new(barcode_tag), record: RecordBuf::default(), drained: None }
    }

    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Counts gathered by the underlying [`MatePairer`].
    #[must_use]
    pub fn metrics(&self) -> &CollapseMetrics {
        self.pairer.metrics()
    }

    fn next_pair(&mut self) -> Result<Option<ReadPair>> {
        loop {
            if let Some(drained) = self.drained.as_mut() {
                return Ok(drained.pop_front());
            }
            if let Some(pair) = self.pairer.pop_ready() {
                return Ok(Some(pair));
            }
            let read = self.reader.read_record_buf(&self.header, &mut self.record).map_err(CollapseError::Input)?;
            if read == 0 {
                self.drained = Some(self.pairer.finish().into());
            } else {
                self.pairer.push(std::mem::take(&mut self.record))?;
            }
        }
    }
}

impl<R: BufRead> Iterator for PairReader<R> {
    type Item = Result<ReadPair>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_pair().transpose()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use noodles::core::Position;
    use noodles::sam::alignment::record::Flags;
    use noodles::sam::alignment::record::cigar::op::{Kind, Op};
    use noodles::sam::alignment::record_buf::{QualityScores, Sequence};

    /// A mapped paired-end record with a 4-base all-match alignment.
    pub(crate) fn mate_record(
        name: &str,
        first: bool,
        (ref_id, start, reverse): (usize, usize, bool),
        (mate_ref_id, mate_start): (usize, usize),
        barcode: Option<&str>,
    ) -> RecordBuf {
        let mut record = RecordBuf::default();
        *record.name_mut() = Some(BString::from(name));
        let mut flags = Flags::SEGMENTED | if first { Flags::FIRST_SEGMENT } else { Flags::LAST_SEGMENT };
        if reverse {
            flags |= Flags::REVERSE_COMPLEMENTED;
        }
        *record.flags_mut() = flags;
        *record.reference_sequence_id_mut() = Some(ref_id);
        *record.alignment_start_mut() = Position::new(start);
        *record.mate_reference_sequence_id_mut() = Some(mate_ref_id);
        *record.mate_alignment_start_mut() = Position::new(mate_start);
        *record.cigar_mut() = [Op::new(Kind::Match, 4)].into_iter().collect();
        *record.sequence_mut() = Sequence::from(b"ACGT".to_vec());
        *record.quality_scores_mut() = QualityScores::from(vec![30; 4]);
        if let Some(barcode) = barcode {
            record.data_mut().insert(Tag::from([b'R', b'X']), Value::from(barcode));
        }
        record
    }

    fn pairer() -> MatePairer {
        MatePairer::new(Tag::from([b'R', b'X']))
    }

    #[test]
    fn test_pairs_by_name_with_first_segment_as_mate_a() {
        let mut pairer = pairer();
        pairer.push(mate_record("q1", false, (0, 100, false), (0, 200), Some("AC-GT"))).unwrap();
        assert!(pairer.pop_ready().is_none());
        pairer.push(mate_record("q1", true, (0, 200, true), (0, 100), None)).unwrap();

        let pair = pairer.pop_ready().unwrap();
        assert_eq!(pair.name, "q1");
        assert_eq!(pair.mate_a.start, 200);
        assert_eq!(pair.mate_a.strand, Strand::Reverse);
        assert_eq!(pair.mate_b.start, 100);
        assert_eq!(pair.barcode, b"ACGT");
        assert_eq!(pairer.pending_mates(), 0);
    }

    #[test]
    fn test_pairs_released_in_leftmost_order() {
        let mut pairer = pairer();
        pairer.push(mate_record("long", true, (0, 100, false), (0, 300), None)).unwrap();
        pairer.push(mate_record("short", true, (0, 150, false), (0, 160), None)).unwrap();
        pairer.push(mate_record("short", false, (0, 160, true), (0, 150), None)).unwrap();
        // "short" is complete but "long" started earlier and is still held
        assert!(pairer.pop_ready().is_none());
        pairer.push(mate_record("long", false, (0, 300, true), (0, 100), None)).unwrap();
        assert_eq!(pairer.pop_ready().unwrap().name, "long");
        assert_eq!(pairer.pop_ready().unwrap().name, "short");
        assert!(pairer.pop_ready().is_none());
    }

    #[test]
    fn test_unsorted_input_reports_record_index() {
        let mut pairer = pairer();
        pairer.push(mate_record("a", true, (0, 500, false), (0, 600), None)).unwrap();
        let err = pairer.push(mate_record("b", true, (0, 400, false), (0, 600), None)).unwrap_err();
        match err {
            CollapseError::UnsortedInput { record_index, position, previous_position, .. } => {
                assert_eq!(record_index, 1);
                assert_eq!(position, 400);
                assert_eq!(previous_position, 500);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_discordant_pair_counted_once() {
        let mut pairer = pairer();
        pairer.push(mate_record("d", true, (0, 100, false), (1, 100), None)).unwrap();
        pairer.push(mate_record("d", false, (1, 100, true), (0, 100), None)).unwrap();
        assert_eq!(pairer.metrics().discarded_discordant, 1);
        assert_eq!(pairer.metrics().total_pairs, 1);
        assert!(pairer.finish().is_empty());
        assert_eq!(pairer.metrics().unpaired_records, 0);
    }

    #[test]
    fn test_filtered_records_counted() {
        let mut pairer = pairer();
        let mut secondary = mate_record("s", true, (0, 100, false), (0, 200), None);
        *secondary.flags_mut() |= Flags::SECONDARY;
        let mut qc_fail = mate_record("f", true, (0, 100, false), (0, 200), None);
        *qc_fail.flags_mut() |= Flags::QC_FAIL;
        let mut fragment = mate_record("u", true, (0, 100, false), (0, 200), None);
        *fragment.flags_mut() = Flags::empty();
        for record in [secondary, qc_fail, fragment] {
            pairer.push(record).unwrap();
        }
        assert_eq!(pairer.metrics().filtered_records, 3);
        assert_eq!(pairer.pending_mates(), 0);
    }

    #[test]
    fn test_orphans_abandoned_once_passed() {
        let mut pairer = pairer();
        pairer.push(mate_record("orphan", true, (0, 100, false), (0, 150), None)).unwrap();
        pairer.push(mate_record("p", true, (0, 120, false), (0, 300), None)).unwrap();
        assert_eq!(pairer.pending_mates(), 2);
        pairer.push(mate_record("p", false, (0, 300, true), (0, 120), None)).unwrap();
        assert_eq!(pairer.metrics().unpaired_records, 1);
        assert_eq!(pairer.pop_ready().unwrap().name, "p");

        pairer.push(mate_record("late", true, (0, 400, false), (0, 500), None)).unwrap();
        assert!(pairer.finish().is_empty());
        assert_eq!(pairer.metrics().unpaired_records, 2);
    }

    #[test]
    fn test_nm_tag_read_as_mismatches() {
        let mut pairer = pairer();
        let mut a = mate_record("n", true, (0, 100, false), (0, 100), None);
        a.data_mut().insert(Tag::EDIT_DISTANCE, Value::UInt8(3));
        pairer.push(a).unwrap();
        pairer.push(mate_record("n", false, (0, 100, true), (0, 100), None)).unwrap();
        let pair = pairer.pop_ready().unwrap();
        assert_eq!(pair.mate_a.mismatches, Some(3));
        assert_eq!(pair.mate_b.mismatches, None);
    }
}

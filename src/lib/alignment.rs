//! Walking a CIGAR to pair read offsets with reference positions.

use noodles::sam::alignment::record::cigar::op::{Kind, Op};

/// A read base aligned to a reference base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignedPosition {
    /// 1-based reference position
    pub ref_pos: usize,
    /// 0-based offset into the read's bases
    pub read_offset: usize,
}

/// Iterates the aligned (`M`, `=`, `X`) bases of a read in reference order.
///
/// Insertions and soft clips advance the read only; deletions and skips advance the
/// reference only; hard clips and padding advance neither.
pub struct AlignedBases<'a> {
    ops: &'a [Op],
    op_index: usize,
    in_op: usize,
    ref_pos: usize,
    read_offset: usize,
}

impl<'a> AlignedBases<'a> {
    /// Starts a walk over `ops` for a read aligned at 1-based `start`.
    #[must_use]
    pub fn new(ops: &'a [Op], start: usize) -> Self {
        Self { ops, op_index: 0, in_op: 0, ref_pos: start, read_offset: 0 }
    }
}

impl Iterator for AlignedBases<'_> {
    type Item = AlignedPosition;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let op = self.ops.get(self.op_index)?;
            let kind = op.kind();
            if matches!(kind, Kind::Match | Kind::SequenceMatch | Kind::SequenceMismatch) {
                if self.in_op < op.len() {
                    let item =
                        AlignedPosition { ref_pos: self.ref_pos, read_offset: self.read_offset };
                    self.in_op += 1;
                    self.ref_pos += 1;
                    self.read_offset += 1;
                    return Some(item);
                }
            } else {
                if kind.consumes_read() {
                    self.read_offset += op.len();
                }
                if kind.consumes_reference() {
                    self.ref_pos += op.len();
                }
            }
            self.op_index += 1;
            self.in_op = 0;
        }
    }
}

/// Number of reference bases spanned by `ops`.
#[must_use]
pub fn reference_length(ops: &[Op]) -> usize {
    ops.iter().filter(|op| op.kind().consumes_reference()).map(|op| op.len()).sum()
}

/// Appends `len` of `kind` to `ops`, extending the last op when it has the same kind.
pub fn push_op(ops: &mut Vec<Op>, kind: Kind, len: usize) {
    if len == 0 {
        return;
    }
    match ops.last_mut() {
        Some(last) if last.kind() == kind => *last = Op::new(kind, last.len() + len),
        _ => ops.push(Op::new(kind, len)),
    }
}

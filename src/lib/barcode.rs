//! Barcode keys: turning a read pair's barcode fragment into an error-tolerant grouping key.
//!
//! A barcode pattern is written in IUPAC notation. Positions with a single-base code (`A`,
//! `C`, `G`, `T`) are *fixed* and must match exactly between members of a family. All other
//! positions are *degenerate*; they are compared by Hamming distance against the family's
//! mismatch tolerance. A position mask (a string of `0`/`1`) removes positions from both
//! comparisons.
//!
//! A pattern may be split with `-` into the adapter halves carried by mate A and mate B.
//! When both halves have the same pattern and mask, the halves of a bottom-strand pair are
//! swapped so that both strands of one molecule produce the same key.

use fgcollapse_dna::BitEnc;
use fgcollapse_dna::bitenc::MAX_BASES;
use fgcollapse_dna::iupac;

use crate::errors::{CollapseError, Result};
use crate::read_pair::{ReadPair, SourceStrand, Strand};

/// Separator between the mate A and mate B halves of a barcode.
pub const HALF_SEPARATOR: u8 = b'-';

/// A parsed barcode pattern with its position mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarcodePattern {
    /// Uppercase IUPAC codes, separator removed
    codes: Vec<u8>,
    /// Length of mate A's half when the pattern is split
    first_half: Option<usize>,
    fixed: Vec<usize>,
    degenerate: Vec<usize>,
    /// Positions included by the mask
    masked: Vec<usize>,
    symmetric: bool,
}

impl BarcodePattern {
    /// Parses a pattern such as `NNNWSMRWSYWKMWWT` or `NNNT-NNNT`, with an optional mask.
    ///
    /// The mask may cover the whole pattern or, for a pattern split into equal halves, a
    /// single half that is then applied to both.
    pub fn parse(pattern: &str, mask: Option<&str>) -> Result<Self> {
        let fail = |reason: String| CollapseError::InvalidBarcodePattern {
            pattern: pattern.to_string(),
            reason,
        };

        let halves: Vec<&[u8]> = pattern.as_bytes().split(|&b| b == HALF_SEPARATOR).collect();
        if halves.len() > 2 {
            return Err(fail("at most one '-' separator is allowed".to_string()));
        }
        if halves.iter().any(|h| h.is_empty()) {
            return Err(fail("pattern halves must not be empty".to_string()));
        }
        let codes: Vec<u8> = halves.concat().iter().map(u8::to_ascii_uppercase).collect();
        if let Some(bad) = codes.iter().find(|&&c| !iupac::is_iupac(c)) {
            return Err(fail(format!("'{}' is not an IUPAC code", *bad as char)));
        }
        let first_half = (halves.len() == 2).then(|| halves[0].len());

        let include = match mask {
            None => vec![true; codes.len()],
            Some(mask) => Self::parse_mask(mask, codes.len(), first_half).map_err(|reason| {
                fail(format!("mask '{mask}' {reason}"))
            })?,
        };

        let masked: Vec<usize> = (0..codes.len()).filter(|&i| include[i]).collect();
        if masked.is_empty() {
            return Err(fail("mask excludes every position".to_string()));
        }
        let (fixed, degenerate): (Vec<usize>, Vec<usize>) =
            masked.iter().partition(|&&i| iupac::is_fixed(codes[i]));
        if degenerate.len() > MAX_BASES {
            return Err(fail(format!("more than {MAX_BASES} degenerate positions")));
        }

        let symmetric = first_half.is_some_and(|n| {
            n * 2 == codes.len()
                && codes[..n] == codes[n..]
                && include[..n] == include[n..]
        });

        Ok(Self { codes, first_half, fixed, degenerate, masked, symmetric })
    }

    fn parse_mask(
        mask: &str,
        pattern_len: usize,
        first_half: Option<usize>,
    ) -> std::result::Result<Vec<bool>, String> {
        let mut include = Vec::with_capacity(pattern_len);
        for b in mask.bytes().filter(|&b| b != HALF_SEPARATOR) {
            match b {
                b'1' => include.push(true),
                b'0' => include.push(false),
                _ => return Err("may only contain '0' and '1'".to_string()),
            }
        }
        if include.len() == pattern_len {
            return Ok(include);
        }
        let halves_equal = first_half.is_none_or(|n| n * 2 == pattern_len);
        if halves_equal && include.len() * 2 == pattern_len {
            include.extend_from_within(..);
            return Ok(include);
        }
        Err(format!("has length {} but the pattern has length {pattern_len}", include.len()))
    }

    /// Number of barcode bases the pattern describes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Always false: a parsed pattern has at least one position.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// True when the halves are interchangeable, so bottom-strand pairs are swapped.
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        self.symmetric
    }

    /// Positions selected by another 0/1 `mask` over this pattern, following the same
    /// length rules as the pattern's own mask. `None` selects the pattern's masked positions.
    pub fn positions_for_mask(&self, mask: Option<&str>) -> Result<Vec<usize>> {
        let Some(mask) = mask else {
            return Ok(self.masked.clone());
        };
        let fail = |reason: String| CollapseError::InvalidBarcodePattern {
            pattern: String::from_utf8_lossy(&self.codes).into_owned(),
            reason: format!("mask '{mask}' {reason}"),
        };
        let include = Self::parse_mask(mask, self.codes.len(), self.first_half).map_err(fail)?;
        let positions: Vec<usize> = (0..include.len()).filter(|&i| include[i]).collect();
        if positions.is_empty() {
            return Err(fail("excludes every position".to_string()));
        }
        Ok(positions)
    }

    /// Masked positions whose code admits more than one base.
    #[must_use]
    pub fn degenerate_positions(&self) -> &[usize] {
        &self.degenerate
    }

    /// Masked positions whose code admits a single base.
    #[must_use]
    pub fn fixed_positions(&self) -> &[usize] {
        &self.fixed
    }

    /// Number of masked positions where `fragment` is not admitted by the pattern.
    ///
    /// `fragment` must already be validated to the pattern's length.
    #[must_use]
    pub fn mismatches(&self, fragment: &[u8]) -> u32 {
        self.masked.iter().filter(|&&i| !iupac::matches(self.codes[i], fragment[i])).count() as u32
    }

    fn canonicalize(&self, fragment: &[u8], source: SourceStrand) -> Vec<u8> {
        match self.first_half {
            Some(n) if self.symmetric && source == SourceStrand::Bottom => {
                let mut swapped = fragment[n..].to_vec();
                swapped.extend_from_slice(&fragment[..n]);
                swapped
            }
            _ => fragment.to_vec(),
        }
    }
}

/// The grouping key of one read pair.
///
/// Two keys can only belong to the same family when their reference, bin, strand and fixed
/// bases are identical; their degenerate bases then decide by Hamming distance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BarcodeKey {
    pub ref_id: usize,
    /// Leftmost mate start divided into bins of the configured width
    pub bin: usize,
    /// Strand of the leftmost mate
    pub strand: Strand,
    /// Bases at the fixed positions
    pub fixed: Vec<u8>,
    /// Bases at the degenerate positions
    pub degenerate: BitEnc,
    /// Full barcode after canonicalization
    pub canonical: Vec<u8>,
}

impl BarcodeKey {
    /// Degenerate-region distance to `other`, or `None` when they can never share a family.
    #[must_use]
    pub fn distance(&self, other: &Self) -> Option<u32> {
        let comparable = self.ref_id == other.ref_id
            && self.bin == other.bin
            && self.strand == other.strand
            && self.fixed == other.fixed;
        comparable.then(|| self.degenerate.hamming_distance(&other.degenerate))
    }

    /// Number of `N` bases in the degenerate region.
    #[must_use]
    pub fn no_calls(&self) -> u32 {
        self.degenerate.no_call_count() + self.fixed.iter().filter(|&&b| b == b'N').count() as u32
    }
}

/// Derives [`BarcodeKey`]s from read pairs.
#[derive(Debug, Clone)]
pub struct BarcodeExtractor {
    pattern: BarcodePattern,
    bin_width: usize,
}

impl BarcodeExtractor {
    /// Creates an extractor binning positions into windows of `bin_width` bases.
    #[must_use]
    pub fn new(pattern: BarcodePattern, bin_width: usize) -> Self {
        Self { pattern, bin_width: bin_width.max(1) }
    }

    #[must_use]
    pub fn pattern(&self) -> &BarcodePattern {
        &self.pattern
    }

    /// Uppercases `raw`, drops half separators and checks it against the pattern.
    pub fn normalize(&self, name: &str, raw: &[u8]) -> Result<Vec<u8>> {
        let malformed = |reason: String| CollapseError::MalformedBarcode {
            name: name.to_string(),
            reason,
        };
        let fragment: Vec<u8> = raw
            .iter()
            .filter(|&&b| b != HALF_SEPARATOR)
            .map(u8::to_ascii_uppercase)
            .collect();
        if let Some(&bad) = fragment.iter().find(|b| !matches!(b, b'A' | b'C' | b'G' | b'T' | b'N')) {
            return Err(malformed(format!("invalid character '{}'", bad.escape_ascii())));
        }
        if fragment.len() != self.pattern.len() {
            return Err(malformed(format!(
                "length {} does not match pattern length {}",
                fragment.len(),
                self.pattern.len()
            )));
        }
        Ok(fragment)
    }

    /// Computes the key for `pair`.
    ///
    /// Fails with [`CollapseError::MalformedBarcode`] when the fragment is shorter or longer
    /// than the pattern, or contains characters other than `ACGTN`.
    pub fn extract(&self, pair: &ReadPair) -> Result<BarcodeKey> {
        let fragment = self.normalize(&pair.name.to_string(), &pair.barcode)?;
        let canonical = self.pattern.canonicalize(&fragment, pair.source_strand());

        let fixed = self.pattern.fixed.iter().map(|&i| canonical[i]).collect();
        let degenerate_bases: Vec<u8> =
            self.pattern.degenerate.iter().map(|&i| canonical[i]).collect();
        let degenerate = BitEnc::from_bytes(&degenerate_bases).ok_or_else(|| {
            CollapseError::MalformedBarcode {
                name: pair.name.to_string(),
                reason: "barcode could not be encoded".to_string(),
            }
        })?;

        let left = pair.leftmost();
        Ok(BarcodeKey {
            ref_id: left.ref_id,
            bin: (left.start.saturating_sub(1)) / self.bin_width,
            strand: left.strand,
            fixed,
            degenerate,
            canonical,
        })
    }
}

//! A 2-bit DNA encoding for fast barcode comparison.
//!
//! Barcodes are compared by Hamming distance many times per genomic position, once for every
//! open family in a bucket. Packing each barcode into a `u128` reduces a comparison to an XOR
//! and a popcount. No-calls (`N`) are tracked in a separate mask and always count as a mismatch.
//!
//! # Example
//!
//! ```
//! use fgcollapse_dna::bitenc::BitEnc;
//!
//! let a = BitEnc::from_bytes(b"ACGT").unwrap();
//! let b = BitEnc::from_bytes(b"ACTT").unwrap();
//! assert_eq!(a.hamming_distance(&b), 1);
//!
//! let n = BitEnc::from_bytes(b"ACNT").unwrap();
//! assert_eq!(a.hamming_distance(&n), 1);
//! assert_eq!(n.hamming_distance(&n), 1);
//! ```

/// Maximum number of bases a [`BitEnc`] can hold.
pub const MAX_BASES: usize = 64;

/// Even bit of every 2-bit slot.
const EVEN_BITS: u128 = 0x5555_5555_5555_5555_5555_5555_5555_5555;

/// A 2-bit encoded DNA sequence stored in a u128, with a no-call mask.
///
/// Supports sequences up to 64 bases.
/// Each base is encoded as: A=0, C=1, G=2, T=3. `N` is stored as A with its slot
/// flagged in the no-call mask.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BitEnc {
    /// The encoded sequence, with bases packed from LSB.
    bits: u128,
    /// One bit (the even bit of the slot) per `N` position.
    no_calls: u128,
    /// Number of bases in the sequence.
    len: u8,
}

impl BitEnc {
    #[inline]
    const fn encode_base(base: u8) -> Option<u128> {
        match base {
            b'A' | b'a' => Some(0),
            b'C' | b'c' => Some(1),
            b'G' | b'g' => Some(2),
            b'T' | b't' => Some(3),
            _ => None,
        }
    }

    /// Create a `BitEnc` from a byte slice.
    ///
    /// Returns None if the sequence contains bases other than ACGTN or exceeds 64 bases.
    #[inline]
    #[must_use]
    pub fn from_bytes(seq: &[u8]) -> Option<Self> {
        if seq.len() > MAX_BASES {
            return None;
        }

        let mut bits: u128 = 0;
        let mut no_calls: u128 = 0;
        for (i, &base) in seq.iter().enumerate() {
            if base == b'N' || base == b'n' {
                no_calls |= 1 << (i * 2);
            } else {
                bits |= Self::encode_base(base)? << (i * 2);
            }
        }

        let len = u8::try_from(seq.len()).ok()?;
        Some(Self { bits, no_calls, len })
    }

    /// Get the number of bases in this sequence.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    /// Check if the sequence is empty.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of `N` bases in the sequence.
    #[inline]
    #[must_use]
    pub const fn no_call_count(&self) -> u32 {
        self.no_calls.count_ones()
    }

    /// Compute the Hamming distance between two encoded sequences.
    ///
    /// A position counts as different when the bases differ or either side is `N`.
    /// Both sequences must have the same length (debug assertion).
    #[inline]
    #[must_use]
    pub fn hamming_distance(&self, other: &Self) -> u32 {
        debug_assert_eq!(self.len, other.len, "Sequences must have equal length");

        let diff = self.bits ^ other.bits;
        // Fold the odd bit of each slot onto its even bit.
        let differs = ((diff >> 1) | diff) & EVEN_BITS;

        (differs | self.no_calls | other.no_calls).count_ones()
    }

    /// Decode back into an uppercase byte sequence.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        (0..self.len())
            .map(|i| {
                if (self.no_calls >> (i * 2)) & 1 == 1 {
                    b'N'
                } else {
                    #[expect(clippy::cast_possible_truncation, reason = "masked to 2 bits")]
                    let code = ((self.bits >> (i * 2)) & 0b11) as usize;
                    b"ACGT"[code]
                }
            })
            .collect()
    }
}

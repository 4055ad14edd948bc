#![deny(unsafe_code)]

//! DNA sequence utilities and constants.
//!
//! This crate provides the low-level pieces of barcode handling:
//! - 2-bit encoding for fast barcode comparison (Hamming distance with no-call awareness)
//! - IUPAC code handling for semi-degenerate barcode patterns
//! - Common constants for base quality and no-call handling

pub mod bitenc;
pub mod iupac;

pub use bitenc::BitEnc;

/// No-call base character.
pub const NO_CALL_BASE: u8 = b'N';

/// Minimum Phred score.
pub const MIN_PHRED: u8 = 2;

/// Maximum Phred score representable in SAM quality strings.
pub const MAX_PHRED: u8 = 93;

/// Index of a base in ACGT order, or `None` for anything else.
#[inline]
#[must_use]
pub const fn base_index(base: u8) -> Option<usize> {
    match base {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' => Some(3),
        _ => None,
    }
}

/// Bases in index order.
pub const BASES: [u8; 4] = *b"ACGT";

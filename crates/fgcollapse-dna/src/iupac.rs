//! IUPAC nucleotide codes.
//!
//! Barcode patterns are written in IUPAC notation: `A`, `C`, `G` and `T` mark fixed
//! positions, every other code marks a degenerate position that admits a subset of bases.

/// Bitmask of the bases admitted by an IUPAC code (A=1, C=2, G=4, T=8).
///
/// Returns `None` for bytes that are not IUPAC nucleotide codes. Lowercase is accepted.
#[inline]
#[must_use]
pub const fn base_mask(code: u8) -> Option<u8> {
    let mask = match code.to_ascii_uppercase() {
        b'A' => 0b0001,
        b'C' => 0b0010,
        b'G' => 0b0100,
        b'T' | b'U' => 0b1000,
        b'R' => 0b0101,
        b'Y' => 0b1010,
        b'S' => 0b0110,
        b'W' => 0b1001,
        b'K' => 0b1100,
        b'M' => 0b0011,
        b'B' => 0b1110,
        b'D' => 0b1101,
        b'H' => 0b1011,
        b'V' => 0b0111,
        b'N' => 0b1111,
        _ => return None,
    };
    Some(mask)
}

/// True if `code` is any IUPAC nucleotide code.
#[inline]
#[must_use]
pub const fn is_iupac(code: u8) -> bool {
    base_mask(code).is_some()
}

/// True if `code` admits exactly one base.
#[inline]
#[must_use]
pub const fn is_fixed(code: u8) -> bool {
    matches!(base_mask(code), Some(mask) if mask.count_ones() == 1)
}

/// True if the observed `base` is admitted by the pattern `code`.
///
/// An observed `N` only satisfies a pattern position that is itself `N`.
#[inline]
#[must_use]
pub const fn matches(code: u8, base: u8) -> bool {
    let Some(code_mask) = base_mask(code) else {
        return false;
    };
    match base.to_ascii_uppercase() {
        b'N' => code_mask == 0b1111,
        b'A' | b'C' | b'G' | b'T' => match base_mask(base) {
            Some(observed) => code_mask & observed != 0,
            None => false,
        },
        _ => false,
    }
}

//! In-memory reference sequences, indexed like the input BAM header.
//!
//! The reference is only consulted to break consensus ties, so sequences are loaded once and
//! shared between threads behind an `Arc`.

use anyhow::{Context, Result};
use bstr::BString;
use log::{debug, warn};
use noodles::sam;
use std::path::Path;
use std::sync::Arc;

/// Reference bases addressed by the header's reference sequence index.
#[derive(Clone, Default, Debug)]
pub struct ReferenceReader {
    sequences: Arc<Vec<Option<Vec<u8>>>>,
}

impl ReferenceReader {
    /// Loads every FASTA record named in `header`'s reference sequence dictionary.
    ///
    /// Records the header does not name are skipped; header sequences missing from the
    /// FASTA simply have no reference bases.
    pub fn for_header<P: AsRef<Path>>(path: P, header: &sam::Header) -> Result<Self> {
        let path = path.as_ref();
        debug!("Reading reference FASTA into memory: {}", path.display());

        let dictionary = header.reference_sequences();
        let mut sequences: Vec<Option<Vec<u8>>> = vec![None; dictionary.len()];
        let mut reader = noodles::fasta::io::reader::Builder
            .build_from_path(path)
            .with_context(|| format!("Failed to open reference: {}", path.display()))?;

        for result in reader.records() {
            let record = result.with_context(|| format!("Failed to read reference: {}", path.display()))?;
            let name = BString::from(record.name());
            if let Some(index) = dictionary.get_index_of(&name) {
                let bases: &[u8] = record.sequence().as_ref();
                sequences[index] = Some(bases.to_ascii_uppercase());
            }
        }

        let missing = sequences.iter().filter(|s| s.is_none()).count();
        if missing > 0 {
            warn!("{missing} reference sequence(s) in the BAM header were not found in {}", path.display());
        }
        Ok(Self { sequences: Arc::new(sequences) })
    }

    /// Builds a reader from sequences already in header order.
    #[must_use]
    pub fn from_sequences(sequences: Vec<Option<Vec<u8>>>) -> Self {
        let sequences = sequences.into_iter().map(|s| s.map(|b| b.to_ascii_uppercase())).collect();
        Self { sequences: Arc::new(sequences) }
    }

    /// Uppercase base at 1-based `position`, if known.
    #[must_use]
    pub fn base_at(&self, ref_id: usize, position: usize) -> Option<u8> {
        let sequence = self.sequences.get(ref_id)?.as_ref()?;
        sequence.get(position.checked_sub(1)?).copied()
    }
}

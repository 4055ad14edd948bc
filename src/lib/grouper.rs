//! Sliding-window grouping of keyed read pairs into families.
//!
//! Pairs arrive in coordinate order and are parked in a bucket per (reference, bin, strand).
//! When the coordinate frontier moves past a bucket's bin, no further pair can join it, so the
//! bucket is clustered into families and evicted. Memory is bounded by the pairs at the
//! positions currently in flight.
//!
//! Clustering happens once per bucket, after every member has arrived, over the members in
//! a canonical order. Family membership therefore depends only on each pair's coordinates and
//! barcode, not on the order pairs were read within a position.
//!
//! With [`DuplexJoin`] configured, clustering has two tiers: top-strand and bottom-strand
//! pairs first form strand families separately, then each bottom-strand family joins the
//! closest unpaired top-strand family within the duplex tolerance.

use std::collections::BTreeMap;

use crate::barcode::BarcodeKey;
use crate::errors::{CollapseError, Result};
use crate::read_pair::{ReadPair, SourceStrand, Strand};

/// A read pair with its barcode key.
#[derive(Debug, Clone)]
pub struct KeyedPair {
    pub key: BarcodeKey,
    pub pair: ReadPair,
}

/// Top vs bottom strand membership of a family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StrandCounts {
    pub top: usize,
    pub bottom: usize,
}

impl StrandCounts {
    pub fn add(&mut self, source: SourceStrand) {
        match source {
            SourceStrand::Top => self.top += 1,
            SourceStrand::Bottom => self.bottom += 1,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.top + self.bottom
    }

    /// The strand with more members, or `None` on a tie.
    #[must_use]
    pub fn majority(&self) -> Option<SourceStrand> {
        match self.top.cmp(&self.bottom) {
            std::cmp::Ordering::Greater => Some(SourceStrand::Top),
            std::cmp::Ordering::Less => Some(SourceStrand::Bottom),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// True when the family has at least `min_family_size` members and the majority strand
    /// supplies more than `threshold` of them.
    #[must_use]
    pub fn is_biased(&self, threshold: f64, min_family_size: usize) -> bool {
        let total = self.total();
        if total == 0 || total < min_family_size {
            return false;
        }
        self.top.max(self.bottom) as f64 / total as f64 > threshold
    }
}

/// Read pairs judged to come from one source molecule.
#[derive(Debug, Clone)]
pub struct Family {
    /// Run-unique id, assigned in close order
    pub id: u64,
    pub ref_id: usize,
    pub bin: usize,
    pub strand: Strand,
    /// Canonical barcode of the founding pair
    pub barcode: Vec<u8>,
    /// Members in canonical order
    pub members: Vec<ReadPair>,
    pub strand_counts: StrandCounts,
}

impl Family {
    #[must_use]
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// Moves the members of the opposite-strand family `other` into this one.
    fn absorb(&mut self, other: Family) {
        self.strand_counts.top += other.strand_counts.top;
        self.strand_counts.bottom += other.strand_counts.bottom;
        self.members.extend(other.members);
    }
}

/// How top-strand and bottom-strand families of one molecule are joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplexJoin {
    /// Canonical barcode positions compared between the two strand families
    pub positions: Vec<usize>,
    /// Mismatches tolerated at those positions
    pub tolerance: u32,
}

impl DuplexJoin {
    /// Mismatches between two canonical barcodes at the compared positions; `N` never matches.
    #[must_use]
    pub fn distance(&self, a: &[u8], b: &[u8]) -> u32 {
        self.positions.iter().filter(|&&i| a[i] != b[i] || a[i] == b'N').count() as u32
    }

    /// Pairs each bottom-strand family with the closest top-strand family not yet paired,
    /// breaking ties by the earlier top-strand family.
    fn join(&self, top: Vec<Family>, bottom: Vec<Family>) -> Vec<Family> {
        let mut families = top;
        let mut paired = vec![false; families.len()];
        let mut unpaired = Vec::new();
        for family in bottom {
            let best = families
                .iter()
                .enumerate()
                .filter(|&(i, _)| !paired[i])
                .map(|(i, candidate)| (self.distance(&candidate.barcode, &family.barcode), i))
                .filter(|&(d, _)| d <= self.tolerance)
                .min();
            match best {
                Some((_, i)) => {
                    paired[i] = true;
                    families[i].absorb(family);
                }
                None => unpaired.push(family),
            }
        }
        families.extend(unpaired);
        families
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct BucketKey {
    ref_id: usize,
    bin: usize,
    strand: Strand,
}

/// Groups a coordinate-sorted stream of keyed pairs into families.
pub struct DuplicateGrouper {
    tolerance: u32,
    duplex: Option<DuplexJoin>,
    buckets: BTreeMap<BucketKey, Vec<KeyedPair>>,
    /// Furthest (reference, leftmost start) seen
    frontier: Option<(usize, usize)>,
    records_seen: u64,
    next_family_id: u64,
}

impl DuplicateGrouper {
    /// Creates a grouper joining barcodes within `tolerance` degenerate-base mismatches.
    #[must_use]
    pub fn new(tolerance: u32) -> Self {
        Self {
            tolerance,
            duplex: None,
            buckets: BTreeMap::new(),
            frontier: None,
            records_seen: 0,
            next_family_id: 0,
        }
    }

    /// Forms strand families per source strand and joins them with `duplex`.
    #[must_use]
    pub fn with_duplex_join(mut self, duplex: DuplexJoin) -> Self {
        self.duplex = Some(duplex);
        self
    }

    /// Adds a pair and returns every family closed by the frontier advancing to it.
    ///
    /// Fails with [`CollapseError::UnsortedInput`] when the pair lies before a pair already
    /// seen.
    pub fn push(&mut self, keyed: KeyedPair) -> Result<Vec<Family>> {
        let coordinate = keyed.pair.coordinate();
        if let Some(frontier) = self.frontier {
            if coordinate < frontier {
                return Err(CollapseError::UnsortedInput {
                    record_index: self.records_seen,
                    ref_id: coordinate.0,
                    position: coordinate.1,
                    previous_ref_id: frontier.0,
                    previous_position: frontier.1,
                });
            }
        }
        self.records_seen += 1;
        self.frontier = Some(coordinate);

        let closed = self.close_before(keyed.key.ref_id, keyed.key.bin);
        let bucket = BucketKey { ref_id: keyed.key.ref_id, bin: keyed.key.bin, strand: keyed.key.strand };
        self.buckets.entry(bucket).or_default().push(keyed);
        Ok(closed)
    }

    /// Closes every remaining bucket. Call once the input is exhausted.
    pub fn finish(&mut self) -> Vec<Family> {
        self.close_before(usize::MAX, usize::MAX)
    }

    /// Number of pairs waiting in open buckets.
    #[must_use]
    pub fn pending_pairs(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    fn close_before(&mut self, ref_id: usize, bin: usize) -> Vec<Family> {
        let mut closed = Vec::new();
        while let Some(entry) = self.buckets.first_entry() {
            if (entry.key().ref_id, entry.key().bin) >= (ref_id, bin) {
                break;
            }
            let (bucket, pairs) = entry.remove_entry();
            self.cluster(bucket, pairs, &mut closed);
        }
        closed
    }

    fn cluster(&mut self, bucket: BucketKey, pairs: Vec<KeyedPair>, out: &mut Vec<Family>) {
        let families = match &self.duplex {
            None => strand_families(bucket, pairs, self.tolerance),
            Some(duplex) => {
                let (top, bottom): (Vec<_>, Vec<_>) =
                    pairs.into_iter().partition(|k| k.pair.source_strand() == SourceStrand::Top);
                duplex.join(
                    strand_families(bucket, top, self.tolerance),
                    strand_families(bucket, bottom, self.tolerance),
                )
            }
        };

        for mut family in families {
            family.id = self.next_family_id;
            self.next_family_id += 1;
            out.push(family);
        }
    }
}

/// Clusters the pairs of one bucket around founders, in canonical order.
fn strand_families(bucket: BucketKey, mut pairs: Vec<KeyedPair>, tolerance: u32) -> Vec<Family> {
    pairs.sort_by(|a, b| {
        a.key
            .fixed
            .cmp(&b.key.fixed)
            .then_with(|| a.key.canonical.cmp(&b.key.canonical))
            .then_with(|| a.pair.name.cmp(&b.pair.name))
            .then_with(|| a.pair.coordinate().cmp(&b.pair.coordinate()))
            .then_with(|| a.pair.mate_a.start.cmp(&b.pair.mate_a.start))
            .then_with(|| a.pair.mate_b.start.cmp(&b.pair.mate_b.start))
    });

    let mut founders: Vec<BarcodeKey> = Vec::new();
    let mut families: Vec<Family> = Vec::new();
    for KeyedPair { key, pair } in pairs {
        let best = founders
            .iter()
            .enumerate()
            .filter_map(|(i, founder)| founder.distance(&key).map(|d| (d, i)))
            .filter(|&(d, _)| d <= tolerance)
            .min();

        let family = match best {
            Some((_, i)) => &mut families[i],
            None => {
                families.push(Family {
                    id: 0,
                    ref_id: bucket.ref_id,
                    bin: bucket.bin,
                    strand: bucket.strand,
                    barcode: key.canonical.clone(),
                    members: Vec::new(),
                    strand_counts: StrandCounts::default(),
                });
                founders.push(key);
                let last = families.len() - 1;
                &mut families[last]
            }
        };
        family.strand_counts.add(pair.source_strand());
        family.members.push(pair);
    }
    families
}

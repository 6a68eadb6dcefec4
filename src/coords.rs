use serde::{Deserialize, Serialize};

/// Index into the chromosome name table shared by all species.
pub type ChromId = u16;

/// A 0-based position on a chromosome. Ordered lexicographically by
/// `(chrom, loc)`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Coords {
    pub chrom: ChromId,
    pub loc: u32,
}

impl Coords {
    pub fn new(chrom: ChromId, loc: u32) -> Self {
        Coords { chrom, loc }
    }
}

/// One aligned block of a pairwise whole-genome alignment.
///
/// `[ref_start, ref_end)` on `ref_chrom` corresponds to the interval on
/// `qry_chrom` bounded by `qry_start` and `qry_end`. `qry_start > qry_end`
/// marks an alignment to the reverse strand; `qry_start == qry_end` is
/// forbidden.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PwalnEntry {
    pub ref_start: u32,
    pub ref_end: u32,
    pub qry_start: u32,
    pub qry_end: u32,
    pub ref_chrom: ChromId,
    pub qry_chrom: ChromId,
}

impl PwalnEntry {
    /// Whether the block aligns to the reverse strand of the query.
    pub fn is_reversed(&self) -> bool {
        self.qry_start > self.qry_end
    }
}

/// Flanking aligned blocks used for interpolation. Both fields are the same
/// entry when the projected location lies inside an aligned block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchors {
    pub upstream: PwalnEntry,
    pub downstream: PwalnEntry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strand_classification() {
        let forward = PwalnEntry {
            ref_start: 0,
            ref_end: 10,
            qry_start: 100,
            qry_end: 110,
            ref_chrom: 0,
            qry_chrom: 1,
        };
        assert!(!forward.is_reversed());

        let reverse = PwalnEntry {
            qry_start: 110,
            qry_end: 100,
            ..forward
        };
        assert!(reverse.is_reversed());
    }

    #[test]
    fn test_coords_ordering() {
        let a = Coords::new(0, 500);
        let b = Coords::new(1, 0);
        let c = Coords::new(1, 10);
        assert!(a < b);
        assert!(b < c);
    }
}

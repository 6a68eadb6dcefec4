//! Anchor selection for a reference location: neighbor scan, major-query-
//! chromosome filter, collinearity filter, closest-anchor pick.
//!
//! Collinearity is judged over a window of candidates on both sides of the
//! location rather than only the nearest pair, so that locally consistent
//! blocks which are outliers in the larger syntenic block get removed.

use crate::collinear::longest_collinear_chain;
use crate::coords::{Anchors, ChromId, Coords, PwalnEntry};
use crate::pwaln::Pwaln;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Minimum number of collinear anchors required around a location. One
/// side may contribute as little as one anchor.
pub const MIN_COLLINEAR_ANCHORS: usize = 5;

/// Anchor candidates kept on each side of the location.
pub const TOP_ANCHORS: usize = 20;

/// Upstream candidate ordered by descending `ref_end`. Entries with equal
/// `ref_end` compare equal, so the candidate set keeps only the first one
/// seen per `ref_end`.
#[derive(Clone, Copy, Debug)]
struct ByRefEndDesc(PwalnEntry);

impl PartialEq for ByRefEndDesc {
    fn eq(&self, other: &Self) -> bool {
        self.0.ref_end == other.0.ref_end
    }
}

impl Eq for ByRefEndDesc {}

impl PartialOrd for ByRefEndDesc {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ByRefEndDesc {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.ref_end.cmp(&self.0.ref_end)
    }
}

/// Find flanking anchors for `ref_coords` in one species pair, or `None`
/// when the location lies outside the usable syntenic region (no bucket
/// for the chromosome, a missing flank, or too few collinear anchors).
pub fn find_anchors(pwaln: &Pwaln, ref_coords: Coords) -> Option<Anchors> {
    let entries = pwaln.get(&ref_coords.chrom)?;
    let loc = ref_coords.loc;

    let mut upstream: BTreeSet<ByRefEndDesc> = BTreeSet::new();
    let mut overlap: Vec<PwalnEntry> = Vec::new();
    let mut downstream: Vec<PwalnEntry> = Vec::new();

    for &entry in entries {
        if entry.ref_end <= loc {
            // [ anchor ]    x
            upstream.insert(ByRefEndDesc(entry));
            if upstream.len() > 10 * TOP_ANCHORS {
                // Truncate to the closest TOP_ANCHORS; done once per
                // 10*TOP_ANCHORS insertions to amortize the rebuild.
                upstream = upstream.into_iter().take(TOP_ANCHORS).collect();
            }
        } else if loc < entry.ref_start {
            //    x     [ anchor ]
            downstream.push(entry);
            if downstream.len() == TOP_ANCHORS {
                // Entries are sorted by ref_start, so everything that
                // follows is farther away.
                break;
            }
        } else {
            // [ anchor ]
            //      x
            overlap.push(entry);
        }
    }

    let mut upstream: Vec<PwalnEntry> =
        upstream.iter().take(TOP_ANCHORS).map(|w| w.0).collect();

    // Keep only anchors pointing to the majority query chromosome among
    // the candidates on both sides.
    let major = major_qry_chrom(&upstream, &overlap, &downstream);
    upstream.retain(|e| e.qry_chrom == major);
    overlap.retain(|e| e.qry_chrom == major);
    downstream.retain(|e| e.qry_chrom == major);

    if upstream.is_empty() || downstream.is_empty() {
        return None;
    }

    // Upstream candidates are ordered by descending ref_end here; restore
    // ascending ref_start order before the collinearity pass.
    let mut candidates = upstream;
    candidates.extend(overlap);
    candidates.extend(downstream);
    candidates.sort_by_key(|e| (e.ref_start, e.ref_end));

    let collinear = longest_collinear_chain(&candidates);
    if collinear.len() < MIN_COLLINEAR_ANCHORS {
        return None;
    }

    select_anchors(&collinear, loc)
}

/// The query chromosome with the most candidate anchors. Ties are broken
/// by the smallest chromosome id.
fn major_qry_chrom(
    upstream: &[PwalnEntry],
    overlap: &[PwalnEntry],
    downstream: &[PwalnEntry],
) -> ChromId {
    let mut counts: FxHashMap<ChromId, u32> = FxHashMap::default();
    for entry in upstream.iter().chain(overlap).chain(downstream) {
        *counts.entry(entry.qry_chrom).or_insert(0) += 1;
    }

    let mut best: Option<(ChromId, u32)> = None;
    for (&chrom, &count) in &counts {
        match best {
            None => best = Some((chrom, count)),
            Some((best_chrom, best_count)) => {
                if count > best_count || (count == best_count && chrom < best_chrom) {
                    best = Some((chrom, count));
                }
            }
        }
    }
    best.map_or(0, |(chrom, _)| chrom)
}

fn min_edge_dist(entry: &PwalnEntry, loc: u32) -> u32 {
    entry.ref_start.abs_diff(loc).min(entry.ref_end.abs_diff(loc))
}

/// Pick the final anchors from the collinear chain (sorted by ref_start):
/// the overlapping entry with the nearest edge if any, otherwise the
/// closest flank on each side.
fn select_anchors(chain: &[PwalnEntry], loc: u32) -> Option<Anchors> {
    let mut closest_upstream: Option<PwalnEntry> = None;
    let mut closest_overlap: Option<PwalnEntry> = None;
    let mut closest_downstream: Option<PwalnEntry> = None;

    for &entry in chain {
        if entry.ref_end <= loc {
            if closest_upstream.is_none_or(|up| up.ref_end < entry.ref_end) {
                closest_upstream = Some(entry);
            }
        } else if loc < entry.ref_start {
            closest_downstream = Some(entry);
            // The chain is sorted, so later entries only get farther.
            break;
        } else {
            match closest_overlap {
                None => closest_overlap = Some(entry),
                Some(current) => {
                    if min_edge_dist(&entry, loc) < min_edge_dist(&current, loc) {
                        closest_overlap = Some(entry);
                    }
                }
            }
        }
    }

    if let Some(overlap) = closest_overlap {
        return Some(Anchors {
            upstream: overlap,
            downstream: overlap,
        });
    }
    match (closest_upstream, closest_downstream) {
        (Some(upstream), Some(downstream)) => Some(Anchors {
            upstream,
            downstream,
        }),
        // A synteny break can leave one side without anchors to the
        // majority chromosome.
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ref_start: u32, ref_end: u32, qry_start: u32, qry_end: u32, qry_chrom: ChromId) -> PwalnEntry {
        PwalnEntry {
            ref_start,
            ref_end,
            qry_start,
            qry_end,
            ref_chrom: 0,
            qry_chrom,
        }
    }

    /// `count` forward identity-mapped blocks of width 50 every 100 bp.
    fn identity_run(count: u32, qry_chrom: ChromId) -> Vec<PwalnEntry> {
        (0..count)
            .map(|i| entry(i * 100, i * 100 + 50, i * 100, i * 100 + 50, qry_chrom))
            .collect()
    }

    fn pwaln_of(entries: Vec<PwalnEntry>) -> Pwaln {
        let mut pwaln = Pwaln::new();
        pwaln.insert(0, entries);
        pwaln
    }

    #[test]
    fn test_missing_chromosome_bucket() {
        let pwaln = pwaln_of(identity_run(7, 0));
        assert!(find_anchors(&pwaln, Coords::new(3, 25)).is_none());
    }

    #[test]
    fn test_overlap_anchor() {
        let pwaln = pwaln_of(identity_run(7, 0));
        let anchors = find_anchors(&pwaln, Coords::new(0, 325)).unwrap();
        assert_eq!(anchors.upstream, anchors.downstream);
        assert_eq!(anchors.upstream.ref_start, 300);
    }

    #[test]
    fn test_flank_anchors() {
        let pwaln = pwaln_of(identity_run(7, 0));
        // 375 falls in the gap between blocks 3 and 4.
        let anchors = find_anchors(&pwaln, Coords::new(0, 375)).unwrap();
        assert_eq!(anchors.upstream.ref_end, 350);
        assert_eq!(anchors.downstream.ref_start, 400);
    }

    #[test]
    fn test_too_few_collinear_anchors() {
        let pwaln = pwaln_of(identity_run(4, 0));
        assert!(find_anchors(&pwaln, Coords::new(0, 125)).is_none());
    }

    #[test]
    fn test_missing_flank() {
        // All blocks upstream of the location: no downstream flank.
        let pwaln = pwaln_of(identity_run(7, 0));
        assert!(find_anchors(&pwaln, Coords::new(0, 5000)).is_none());
    }

    #[test]
    fn test_major_chrom_filter_drops_outlier() {
        let mut entries = identity_run(7, 1);
        // One anchor points at another query chromosome; it would
        // otherwise be the closest upstream flank.
        entries.push(entry(360, 370, 9000, 9010, 2));
        entries.sort_by_key(|e| e.ref_start);
        let pwaln = pwaln_of(entries);

        let anchors = find_anchors(&pwaln, Coords::new(0, 375)).unwrap();
        assert_eq!(anchors.upstream.qry_chrom, 1);
        assert_eq!(anchors.downstream.qry_chrom, 1);
        assert_eq!(anchors.downstream.ref_start, 400);
    }

    #[test]
    fn test_major_chrom_tie_breaks_to_lower_id() {
        // Five identity anchors each to chroms 2 and 5, interleaved. The
        // tie resolves to chrom 2: the location then sits in a gap between
        // chrom-2 anchors instead of inside the chrom-5 block covering it.
        let mut entries = Vec::new();
        for i in 0..5u32 {
            entries.push(entry(i * 100, i * 100 + 40, i * 100, i * 100 + 40, 2));
            entries.push(entry(i * 100 + 50, i * 100 + 90, i * 100 + 50, i * 100 + 90, 5));
        }
        let pwaln = pwaln_of(entries);

        let anchors = find_anchors(&pwaln, Coords::new(0, 260)).unwrap();
        assert_eq!(anchors.upstream.qry_chrom, 2);
        assert_eq!(anchors.upstream.ref_end, 240);
        assert_eq!(anchors.downstream.ref_start, 300);
    }

    #[test]
    fn test_upstream_equal_ref_end_dedup() {
        // Two upstream blocks share ref_end 150; only the first seen is
        // kept as a candidate. That leaves 4 collinear anchors, below the
        // minimum, so no anchors are reported.
        let entries = vec![
            entry(0, 50, 0, 50, 0),
            entry(100, 150, 100, 150, 0),
            entry(140, 150, 150, 160, 0),
            entry(200, 250, 200, 250, 0),
            entry(300, 350, 300, 350, 0),
        ];
        let pwaln = pwaln_of(entries);
        assert!(find_anchors(&pwaln, Coords::new(0, 160)).is_none());
    }

    #[test]
    fn test_downstream_scan_stops_at_top_n() {
        // More than TOP_ANCHORS downstream blocks; the nearest ones are
        // kept and anchors still resolve.
        let pwaln = pwaln_of(identity_run(60, 0));
        let anchors = find_anchors(&pwaln, Coords::new(0, 160)).unwrap();
        assert_eq!(anchors.upstream.ref_end, 150);
        assert_eq!(anchors.downstream.ref_start, 200);
    }

    #[test]
    fn test_collinearity_filter_removes_outlier_block() {
        let mut entries = identity_run(7, 0);
        // Same query chromosome but wildly off-position: collinearity
        // (not the major-chrom filter) has to remove it.
        entries.push(entry(360, 380, 9000, 9020, 0));
        entries.sort_by_key(|e| (e.ref_start, e.ref_end));
        let pwaln = pwaln_of(entries);

        let anchors = find_anchors(&pwaln, Coords::new(0, 390)).unwrap();
        assert_eq!(anchors.upstream.ref_end, 350);
        assert_eq!(anchors.downstream.ref_start, 400);
    }
}

//! Longest collinear subsequence of aligned blocks.
//!
//! Outlier alignments are removed by keeping the longest chain of blocks
//! whose query intervals are strictly monotone and non-overlapping. Plus-
//! and minus-strand chains are computed separately; negating the
//! coordinates turns the minus-strand case into the same increasing-chain
//! problem.

use crate::coords::PwalnEntry;

/// Longest chain under a filter: consecutive picked elements `a, b` must
/// satisfy `qry_hi(a) <= qry_lo(b)`. `seq` must already be sorted by
/// `ref_start` ascending. Patience-sort recurrence, O(n log n).
fn longest_chain_with<F, L, H>(seq: &[PwalnEntry], filter: F, qry_lo: L, qry_hi: H) -> Vec<PwalnEntry>
where
    F: Fn(&PwalnEntry) -> bool,
    L: Fn(&PwalnEntry) -> i64,
    H: Fn(&PwalnEntry) -> i64,
{
    // tails[k] is the index into seq of the smallest qry_hi known to end a
    // chain of length k+1; prev[i] links each element to its predecessor.
    let mut tails: Vec<usize> = Vec::with_capacity(seq.len());
    let mut prev = vec![0usize; seq.len()];

    for i in 0..seq.len() {
        if !filter(&seq[i]) {
            continue;
        }

        match tails.last().copied() {
            None => {
                tails.push(i);
                continue;
            }
            Some(last) if qry_hi(&seq[last]) <= qry_lo(&seq[i]) => {
                prev[i] = last;
                tails.push(i);
                continue;
            }
            Some(_) => {}
        }

        // Binary search over tails for the longest chain seq[i] can extend.
        let mut lo = 0usize;
        let mut hi = tails.len() - 1;
        while lo < hi {
            let mid = (lo + hi) / 2;
            if qry_hi(&seq[tails[mid]]) <= qry_lo(&seq[i]) {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        if qry_hi(&seq[i]) < qry_hi(&seq[tails[lo]]) {
            if lo > 0 {
                prev[i] = tails[lo - 1];
            }
            tails[lo] = i;
        }
    }

    if tails.is_empty() {
        return Vec::new();
    }

    let mut chain = vec![seq[0]; tails.len()];
    let mut v = *tails.last().unwrap();
    for slot in chain.iter_mut().rev() {
        *slot = seq[v];
        v = prev[v];
    }
    chain
}

/// The longer of the longest strictly-forward and strictly-reverse chains
/// by query coordinate. Forward wins ties. `seq` must be sorted by
/// `ref_start` ascending.
pub fn longest_collinear_chain(seq: &[PwalnEntry]) -> Vec<PwalnEntry> {
    let forward = longest_chain_with(
        seq,
        |e| !e.is_reversed(),
        |e| i64::from(e.qry_start),
        |e| i64::from(e.qry_end),
    );
    let reverse = longest_chain_with(
        seq,
        |e| e.is_reversed(),
        |e| -i64::from(e.qry_start),
        |e| -i64::from(e.qry_end),
    );

    #[cfg(debug_assertions)]
    {
        let mut loc: i64 = i64::MIN;
        for e in &forward {
            debug_assert!(loc <= i64::from(e.qry_start));
            debug_assert!(e.qry_start < e.qry_end);
            loc = i64::from(e.qry_end);
        }
        let mut loc = u32::MAX;
        for e in &reverse {
            debug_assert!(loc >= e.qry_end);
            debug_assert!(e.qry_start > e.qry_end);
            loc = e.qry_start;
        }
    }

    if forward.len() >= reverse.len() {
        forward
    } else {
        reverse
    }
}

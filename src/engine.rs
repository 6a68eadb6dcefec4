//! Projection engine: distance-decay scoring, single-hop interpolation
//! between anchors, and the multi-species best-path search.

use crate::anchor::find_anchors;
use crate::coords::{Anchors, Coords};
use crate::error::{Error, Result};
use crate::store::PwalnStore;
use indexmap::IndexMap;
use log::trace;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Single-hop projection of a point into a neighboring species.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GenomicProjectionResult {
    /// In `(0, 1]`; 1.0 when the location lies inside an aligned block.
    pub score: f64,
    pub coords: Coords,
    pub anchors: Anchors,
}

/// One node of the best-path tree kept per reached species. The seed entry
/// for the reference species itself has no predecessor and no anchors.
#[derive(Clone, Debug, PartialEq)]
pub struct PathStep {
    pub score: f64,
    pub prev_species: Option<String>,
    pub coords: Coords,
    pub anchors: Option<Anchors>,
}

/// Outcome of one projection request: the best-path tree over all reached
/// species, plus the direct single-hop result into the target species when
/// one exists (even if a multi-hop path beat it).
#[derive(Clone, Debug, Default)]
pub struct CoordProjection {
    pub direct: Option<GenomicProjectionResult>,
    pub paths: IndexMap<String, PathStep>,
}

impl CoordProjection {
    /// The best path found into `species`, if it was reached at all.
    pub fn best(&self, species: &str) -> Option<&PathStep> {
        self.paths.get(species)
    }
}

/// Max-heap entry; ties on the score are broken by species name and
/// coordinates so that pop order is deterministic across runs.
struct HeapEntry {
    score: f64,
    species: String,
    coords: Coords,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.species.cmp(&other.species))
            .then_with(|| self.coords.cmp(&other.coords))
    }
}

/// Distance-decay score for a location between two flanking bounds:
/// `exp(-min(loc - left, right - loc) / (genome_size * scaling))`. Equals
/// 1.0 exactly on a bound and decays toward the midpoint.
pub fn projection_score(
    loc: u32,
    left_bound: u32,
    right_bound: u32,
    genome_size: u64,
    scaling: f64,
) -> f64 {
    let d = (loc - left_bound).min(right_bound - loc);
    (-f64::from(d) / (genome_size as f64 * scaling)).exp()
}

fn ensure_internal(cond: bool, msg: &str) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(Error::Internal(msg.to_string()))
    }
}

/// The projection engine: an immutable [`PwalnStore`] plus the half-life
/// distance that parameterizes the score decay.
pub struct LiftGraph {
    store: PwalnStore,
    half_life: u32,
}

impl LiftGraph {
    pub fn new(store: PwalnStore, half_life_bp: u32) -> Self {
        LiftGraph {
            store,
            half_life: half_life_bp,
        }
    }

    /// Set the half-life distance: the reference-genome distance at which
    /// a single-hop score is 0.5. Must be called before any projection
    /// starts; it is not a live parameter.
    pub fn set_half_life(&mut self, bp: u32) {
        self.half_life = bp;
    }

    pub fn half_life(&self) -> u32 {
        self.half_life
    }

    pub fn store(&self) -> &PwalnStore {
        &self.store
    }

    pub fn chrom_id(&self, name: &str) -> Result<crate::coords::ChromId> {
        self.store.chrom_id(name)
    }

    pub fn chrom_name(&self, id: crate::coords::ChromId) -> Result<&str> {
        self.store.chrom_name(id)
    }

    /// Scaling factor yielding a score of 0.5 at the half-life distance in
    /// a genome of the given size. Computed once per request from the
    /// reference species and reused at every hop, where it is combined
    /// with that hop's own genome size inside [`projection_score`].
    pub fn scaling_factor(&self, genome_size: u64) -> f64 {
        f64::from(self.half_life) / (genome_size as f64 * std::f64::consts::LN_2)
    }

    fn genome_size_of(&self, species: &str) -> Result<u64> {
        self.store
            .genome_size(species)
            .ok_or_else(|| Error::UnknownName(format!("no genome size for species {}", species)))
    }

    /// Project a point into a directly aligned species by interpolating
    /// between its flanking anchors. `Ok(None)` when the pair has no
    /// alignments or no usable anchors exist around the location.
    pub fn project_single_hop(
        &self,
        ref_species: &str,
        qry_species: &str,
        ref_coords: Coords,
        scaling: f64,
    ) -> Result<Option<GenomicProjectionResult>> {
        let Some(pwaln) = self.store.pwaln(ref_species, qry_species) else {
            return Ok(None);
        };
        let Some(anchors) = find_anchors(pwaln, ref_coords) else {
            return Ok(None);
        };

        let loc = ref_coords.loc;
        let up = anchors.upstream;
        let down = anchors.downstream;

        // On the reverse strand the two anchors swap roles on the query
        // axis: the forward-strand bounds of the upstream anchor come from
        // the downstream anchor's query interval, and vice versa.
        let reversed = up.is_reversed();
        let (qry_up_start, qry_up_end) = if reversed {
            (down.qry_end, down.qry_start)
        } else {
            (up.qry_start, up.qry_end)
        };
        ensure_internal(
            qry_up_start < qry_up_end,
            "upstream query bounds not forward-ordered",
        )?;

        let ref_left: u32;
        let ref_right: u32;
        let qry_left: u32;
        let qry_right: u32;
        let score: f64;
        if up == down {
            // The location lies on an aligned block.
            ref_left = up.ref_start;
            ref_right = up.ref_end;
            qry_left = qry_up_start;
            qry_right = qry_up_end;
            score = 1.0;
        } else {
            // [ up.ref ]  x    [ down.ref ]
            let (qry_down_start, qry_down_end) = if reversed {
                (up.qry_end, up.qry_start)
            } else {
                (down.qry_start, down.qry_end)
            };
            ensure_internal(
                qry_up_end <= qry_down_start && qry_down_start < qry_down_end,
                "anchor query intervals out of order",
            )?;

            ref_left = up.ref_end;
            ref_right = down.ref_start;
            qry_left = qry_up_end;
            qry_right = qry_down_start;

            // The distance to the closer anchor is measured on the
            // reference only; on the query it is roughly the same, being a
            // projection of the reference.
            let genome_size = self.genome_size_of(ref_species)?;
            score = projection_score(loc, ref_left, ref_right, genome_size, scaling);
        }
        ensure_internal(
            ref_left <= loc && loc < ref_right,
            "location outside anchor bounds",
        )?;

        let frac = f64::from(loc - ref_left) / f64::from(ref_right - ref_left);
        let qry_loc = (f64::from(qry_left) + frac * f64::from(qry_right - qry_left)) as u32;

        Ok(Some(GenomicProjectionResult {
            score,
            coords: Coords::new(up.qry_chrom, qry_loc),
            anchors,
        }))
    }

    /// Project a point into `qry_species`, composing single hops along the
    /// best-scoring path through all known species pairs. The result maps
    /// every reached species to its best path entry; the entry for
    /// `qry_species` is the answer when present.
    pub fn project_coord(
        &self,
        ref_species: &str,
        qry_species: &str,
        ref_coords: Coords,
    ) -> Result<CoordProjection> {
        let scaling = self.scaling_factor(self.genome_size_of(ref_species)?);

        let mut projection = CoordProjection::default();
        projection.paths.insert(
            ref_species.to_owned(),
            PathStep {
                score: 1.0,
                prev_species: None,
                coords: ref_coords,
                anchors: None,
            },
        );

        let mut queue = BinaryHeap::new();
        queue.push(HeapEntry {
            score: 1.0,
            species: ref_species.to_owned(),
            coords: ref_coords,
        });

        while let Some(current) = queue.pop() {
            if let Some(best) = projection.paths.get(&current.species) {
                if best.score > current.score {
                    // A better path to this species was found after this
                    // entry was queued.
                    continue;
                }
            }
            trace!(
                "visiting {} at {}:{} with score {}",
                current.species,
                current.coords.chrom,
                current.coords.loc,
                current.score
            );
            if current.species == qry_species {
                break;
            }

            for nxt_species in self.store.neighbors(&current.species) {
                if let Some(existing) = projection.paths.get(nxt_species) {
                    if current.score <= existing.score {
                        // nxt_species cannot be reached faster through the
                        // current species.
                        continue;
                    }
                }

                let Some(proj) =
                    self.project_single_hop(&current.species, nxt_species, current.coords, scaling)?
                else {
                    continue;
                };

                if current.species == ref_species && nxt_species == qry_species {
                    projection.direct = Some(proj);
                }

                let next_score = current.score * proj.score;
                if let Some(existing) = projection.paths.get(nxt_species) {
                    if next_score <= existing.score {
                        continue;
                    }
                }

                projection.paths.insert(
                    nxt_species.to_owned(),
                    PathStep {
                        score: next_score,
                        prev_species: Some(current.species.clone()),
                        coords: proj.coords,
                        anchors: Some(proj.anchors),
                    },
                );
                queue.push(HeapEntry {
                    score: next_score,
                    species: nxt_species.to_owned(),
                    coords: proj.coords,
                });
            }
        }

        Ok(projection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::PwalnEntry;

    const HALF_LIFE: u32 = 10_000;
    const GENOME: u64 = 1_000_000;

    fn entry(
        ref_start: u32,
        ref_end: u32,
        qry_start: u32,
        qry_end: u32,
        qry_chrom: u16,
    ) -> PwalnEntry {
        PwalnEntry {
            ref_start,
            ref_end,
            qry_start,
            qry_end,
            ref_chrom: 0,
            qry_chrom,
        }
    }

    /// `count` forward identity blocks of width 50 every 100 bp.
    fn identity_run(count: u32) -> Vec<PwalnEntry> {
        (0..count)
            .map(|i| entry(i * 100, i * 100 + 50, i * 100, i * 100 + 50, 0))
            .collect()
    }

    fn graph_with(entries: Vec<PwalnEntry>) -> LiftGraph {
        let mut store = PwalnStore::new();
        store.add_chrom("chr1");
        store.add_chrom("chr2");
        store.insert_entries("human", "mouse", entries).unwrap();
        store.set_genome_size("human", GENOME);
        LiftGraph::new(store, HALF_LIFE)
    }

    #[test]
    fn test_score_range_and_bounds() {
        let graph = graph_with(identity_run(7));
        let s = graph.scaling_factor(GENOME);
        for loc in [1_001, 2_000, 5_000, 8_999] {
            let score = projection_score(loc, 1_000, 9_000, GENOME, s);
            assert!(score > 0.0 && score < 1.0);
        }
        assert_eq!(projection_score(1_000, 1_000, 9_000, GENOME, s), 1.0);
        assert_eq!(projection_score(9_000, 1_000, 9_000, GENOME, s), 1.0);
    }

    #[test]
    fn test_score_decays_toward_midpoint() {
        let graph = graph_with(identity_run(7));
        let s = graph.scaling_factor(GENOME);
        let mut last = 1.0;
        for loc in (1_000..=5_000).step_by(500) {
            let score = projection_score(loc, 1_000, 9_000, GENOME, s);
            assert!(score <= last);
            last = score;
        }
    }

    #[test]
    fn test_half_life_identity() {
        let graph = graph_with(identity_run(7));
        let s = graph.scaling_factor(GENOME);
        let score = projection_score(HALF_LIFE, 0, 2 * HALF_LIFE, GENOME, s);
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_single_hop_overlap() {
        let graph = graph_with(identity_run(7));
        let s = graph.scaling_factor(GENOME);
        let result = graph
            .project_single_hop("human", "mouse", Coords::new(0, 325), s)
            .unwrap()
            .unwrap();
        assert_eq!(result.score, 1.0);
        assert_eq!(result.coords, Coords::new(0, 325));
        assert_eq!(result.anchors.upstream, result.anchors.downstream);
    }

    #[test]
    fn test_single_hop_interpolates_between_flanks() {
        // Blocks around the gap [350, 400); the query side is stretched to
        // twice the reference width past 400.
        let mut entries = identity_run(4);
        for i in 4..8u32 {
            let qry = 400 + (i - 4) * 200;
            entries.push(entry(i * 100, i * 100 + 50, qry, qry + 50, 0));
        }
        let graph = graph_with(entries);
        let s = graph.scaling_factor(GENOME);
        let result = graph
            .project_single_hop("human", "mouse", Coords::new(0, 375), s)
            .unwrap()
            .unwrap();
        // Halfway into the gap; the query gap is [350, 400).
        assert_eq!(result.coords, Coords::new(0, 375));
        assert!(result.score < 1.0);
    }

    #[test]
    fn test_single_hop_missing_pair() {
        let graph = graph_with(identity_run(7));
        let s = graph.scaling_factor(GENOME);
        assert!(graph
            .project_single_hop("human", "zebrafish", Coords::new(0, 325), s)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_single_hop_missing_genome_size() {
        let mut store = PwalnStore::new();
        store.add_chrom("chr1");
        store
            .insert_entries("human", "mouse", identity_run(7))
            .unwrap();
        let graph = LiftGraph::new(store, HALF_LIFE);
        // Overlap case needs no genome size...
        assert!(graph
            .project_single_hop("human", "mouse", Coords::new(0, 325), 1.0)
            .unwrap()
            .is_some());
        // ...but the flank case does.
        assert!(matches!(
            graph.project_single_hop("human", "mouse", Coords::new(0, 375), 1.0),
            Err(Error::UnknownName(_))
        ));
    }

    #[test]
    fn test_project_coord_requires_ref_genome_size() {
        let mut store = PwalnStore::new();
        store.add_chrom("chr1");
        store
            .insert_entries("human", "mouse", identity_run(7))
            .unwrap();
        let graph = LiftGraph::new(store, HALF_LIFE);
        assert!(matches!(
            graph.project_coord("human", "mouse", Coords::new(0, 325)),
            Err(Error::UnknownName(_))
        ));
    }

    #[test]
    fn test_project_coord_direct_hop() {
        let graph = graph_with(identity_run(7));
        let projection = graph
            .project_coord("human", "mouse", Coords::new(0, 325))
            .unwrap();
        let step = projection.best("mouse").unwrap();
        assert_eq!(step.score, 1.0);
        assert_eq!(step.prev_species.as_deref(), Some("human"));
        assert_eq!(step.coords, Coords::new(0, 325));
        assert_eq!(projection.direct.unwrap().coords, Coords::new(0, 325));
        // The seed entry for the reference species is also recorded.
        let seed = projection.best("human").unwrap();
        assert_eq!(seed.score, 1.0);
        assert!(seed.prev_species.is_none());
        assert!(seed.anchors.is_none());
    }

    #[test]
    fn test_half_life_reconfiguration() {
        let mut graph = graph_with(identity_run(7));
        assert_eq!(graph.half_life(), HALF_LIFE);
        graph.set_half_life(2 * HALF_LIFE);
        let s = graph.scaling_factor(GENOME);
        let score = projection_score(2 * HALF_LIFE, 0, 4 * HALF_LIFE, GENOME, s);
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_chrom_lookup_delegation() {
        let graph = graph_with(identity_run(7));
        assert_eq!(graph.chrom_id("chr2").unwrap(), 1);
        assert_eq!(graph.chrom_name(0).unwrap(), "chr1");
        assert_eq!(graph.store().num_chroms(), 2);
        assert!(matches!(graph.chrom_id("chrM"), Err(Error::UnknownName(_))));
    }

    #[test]
    fn test_project_coord_unreachable_species() {
        let graph = graph_with(identity_run(7));
        let projection = graph
            .project_coord("human", "zebrafish", Coords::new(0, 325))
            .unwrap();
        assert!(projection.best("zebrafish").is_none());
        assert!(projection.direct.is_none());
    }
}

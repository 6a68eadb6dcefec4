//! In-memory store of pairwise whole-genome alignments.
//!
//! The store is populated once at startup and read-only afterwards: the
//! chromosome name table, the nested `ref_species -> qry_species ->
//! ref_chrom -> sorted entries` maps, and the per-species genome sizes.

use crate::coords::{ChromId, PwalnEntry};
use crate::error::{Error, Result};
use crate::pwaln::{self, Pwaln, PwalnMap};
use log::{debug, warn};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct PwalnStore {
    chroms: Vec<String>,
    pwalns: PwalnMap,
    genome_sizes: FxHashMap<String, u64>,
}

impl PwalnStore {
    pub fn new() -> Self {
        PwalnStore::default()
    }

    /// Read a store from a binary pwaln file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to open pwaln file '{}': {}", path.display(), e),
            ))
        })?;
        Self::from_reader(BufReader::new(file))
    }

    /// Read a store from any binary pwaln stream.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let (chroms, pwalns) = pwaln::read_pwalns(reader)?;
        let mut store = PwalnStore {
            chroms,
            pwalns,
            genome_sizes: FxHashMap::default(),
        };
        store.normalize_buckets();
        debug!(
            "loaded pwaln store: {} chromosomes, {} species pairs, {} entries",
            store.chroms.len(),
            store.species_pairs().count(),
            store.num_entries()
        );
        Ok(store)
    }

    /// Restore the sortedness invariant on every bucket. Buckets already
    /// sorted by `ref_start` are left untouched, so canonical files stay
    /// byte-identical under a round trip.
    fn normalize_buckets(&mut self) {
        let mut buckets: Vec<(&str, &str, ChromId, &mut Vec<PwalnEntry>)> = Vec::new();
        for (ref_species, per_ref) in self.pwalns.iter_mut() {
            for (qry_species, pwaln) in per_ref.iter_mut() {
                for (&chrom, bucket) in pwaln.iter_mut() {
                    buckets.push((ref_species.as_str(), qry_species.as_str(), chrom, bucket));
                }
            }
        }
        buckets
            .par_iter_mut()
            .for_each(|(ref_species, qry_species, chrom, bucket)| {
                let sorted = bucket.windows(2).all(|w| w[0].ref_start <= w[1].ref_start);
                if !sorted {
                    warn!(
                        "re-sorting unsorted bucket {} -> {} chrom {}",
                        ref_species, qry_species, chrom
                    );
                    bucket.sort_by_key(|e| e.ref_start);
                }
                bucket.dedup();
            });
    }

    /// Serialize the store back into the binary pwaln format.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        pwaln::write_pwalns(writer, &self.chroms, &self.pwalns)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes)?;
        Ok(bytes)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        self.write_to(BufWriter::new(file))
    }

    /// Snapshot the whole store (including genome sizes) into a bincode
    /// cache file. The cache is not byte-stable across crate versions; the
    /// binary pwaln format is the interchange format.
    pub fn save_cache<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .map_err(|e| Error::Internal(format!("failed to encode store cache: {}", e)))?;
        Ok(())
    }

    pub fn load_cache<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
            .map_err(|e| Error::MalformedInput(format!("failed to decode store cache: {}", e)))
    }

    /// Load genome sizes for every reference species in the store from
    /// `<dir>/<species>.sizes` files: one line per chromosome, the second
    /// tab-separated field is the chromosome length in bp.
    pub fn load_sizes<P: AsRef<Path>>(&mut self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        let species: Vec<String> = self.pwalns.keys().cloned().collect();
        for sp in species {
            let path = dir.join(format!("{}.sizes", sp));
            let file = File::open(&path).map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("failed to open sizes file '{}': {}", path.display(), e),
                ))
            })?;
            let mut total: u64 = 0;
            for line in BufReader::new(file).lines() {
                let line = line?;
                let Some((_, rest)) = line.split_once('\t') else {
                    return Err(Error::MalformedInput(format!(
                        "line without tab in '{}'",
                        path.display()
                    )));
                };
                // Fields past the second are ignored.
                let field = rest.split('\t').next().unwrap_or(rest);
                let size: u64 = field.trim().parse().map_err(|_| {
                    Error::MalformedInput(format!(
                        "invalid chromosome size {:?} in '{}'",
                        field,
                        path.display()
                    ))
                })?;
                total += size;
            }
            self.genome_sizes.insert(sp, total);
        }
        Ok(())
    }

    pub fn set_genome_size(&mut self, species: &str, bp: u64) {
        self.genome_sizes.insert(species.to_owned(), bp);
    }

    pub fn genome_size(&self, species: &str) -> Option<u64> {
        self.genome_sizes.get(species).copied()
    }

    /// Name-to-id lookup over the chromosome table. Linear; the table is
    /// small.
    pub fn chrom_id(&self, name: &str) -> Result<ChromId> {
        self.chroms
            .iter()
            .position(|c| c == name)
            .map(|i| i as ChromId)
            .ok_or_else(|| Error::UnknownName(format!("chromosome {}", name)))
    }

    pub fn chrom_name(&self, id: ChromId) -> Result<&str> {
        self.chroms
            .get(usize::from(id))
            .map(String::as_str)
            .ok_or_else(|| Error::UnknownName(format!("chromosome id {}", id)))
    }

    /// Get-or-insert a chromosome name, returning its id.
    pub fn add_chrom(&mut self, name: &str) -> ChromId {
        if let Some(i) = self.chroms.iter().position(|c| c == name) {
            return i as ChromId;
        }
        assert!(
            self.chroms.len() <= usize::from(ChromId::MAX),
            "chromosome table full"
        );
        self.chroms.push(name.to_owned());
        (self.chroms.len() - 1) as ChromId
    }

    /// Insert aligned blocks for a species pair, bucketing them by
    /// reference chromosome and keeping each bucket sorted by `ref_start`.
    pub fn insert_entries<I>(&mut self, ref_species: &str, qry_species: &str, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = PwalnEntry>,
    {
        let num_chroms = self.chroms.len();
        let pwaln = self
            .pwalns
            .entry(ref_species.to_owned())
            .or_default()
            .entry(qry_species.to_owned())
            .or_default();
        let mut touched: Vec<ChromId> = Vec::new();
        for entry in entries {
            if usize::from(entry.ref_chrom) >= num_chroms
                || usize::from(entry.qry_chrom) >= num_chroms
            {
                return Err(Error::MalformedInput(format!(
                    "chromosome id out of range in entry {:?}",
                    entry
                )));
            }
            if entry.ref_start >= entry.ref_end || entry.qry_start == entry.qry_end {
                return Err(Error::MalformedInput(format!(
                    "degenerate entry {:?}",
                    entry
                )));
            }
            let bucket = pwaln.entry(entry.ref_chrom).or_default();
            if bucket.last().is_some_and(|last| last.ref_start > entry.ref_start) {
                touched.push(entry.ref_chrom);
            }
            bucket.push(entry);
        }
        for chrom in touched {
            if let Some(bucket) = pwaln.get_mut(&chrom) {
                bucket.sort_by_key(|e| e.ref_start);
            }
        }
        Ok(())
    }

    /// The alignments for one species pair, if any.
    pub fn pwaln(&self, ref_species: &str, qry_species: &str) -> Option<&Pwaln> {
        self.pwalns.get(ref_species)?.get(qry_species)
    }

    /// Query species reachable from `species` in one hop, in file order.
    /// Empty if `species` is not a reference species of any pair.
    pub fn neighbors(&self, species: &str) -> impl Iterator<Item = &str> {
        self.pwalns
            .get(species)
            .into_iter()
            .flat_map(|per_ref| per_ref.keys().map(String::as_str))
    }

    pub fn ref_species(&self) -> impl Iterator<Item = &str> {
        self.pwalns.keys().map(String::as_str)
    }

    pub fn species_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pwalns.iter().flat_map(|(ref_species, per_ref)| {
            per_ref
                .keys()
                .map(move |qry_species| (ref_species.as_str(), qry_species.as_str()))
        })
    }

    pub fn num_chroms(&self) -> usize {
        self.chroms.len()
    }

    pub fn num_entries(&self) -> usize {
        self.pwalns
            .values()
            .flat_map(|per_ref| per_ref.values())
            .flat_map(|pwaln| pwaln.values())
            .map(Vec::len)
            .sum()
    }
}

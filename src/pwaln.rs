//! Binary pwaln wire format.
//!
//! Little-endian, tightly packed:
//!
//! ```text
//! u16            num_chromosomes
//!   {C-string}   x num_chromosomes
//! u8             num_ref_species
//!   C-string                            // ref species name
//!   u8           num_qry_species
//!     C-string                          // qry species name
//!     u32        num_ref_chrom_buckets
//!       u32      num_entries
//!       {20B}    x num_entries          // u32 u32 u32 u32 u16 u16
//! ```
//!
//! No trailing bytes are permitted. The `ref_chrom` of every entry in a
//! bucket equals the bucket key, which is stored implicitly via the first
//! entry.

use crate::coords::{ChromId, PwalnEntry};
use crate::error::{Error, Result};
use indexmap::IndexMap;
use std::io::{self, Read, Write};

/// Per species pair: `ref_chrom` bucket to entries sorted by `ref_start`.
pub type Pwaln = IndexMap<ChromId, Vec<PwalnEntry>>;

/// `ref_species -> qry_species -> Pwaln`, in file order.
pub type PwalnMap = IndexMap<String, IndexMap<String, Pwaln>>;

fn eof_as_malformed(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::MalformedInput("unexpected end of input".to_string())
    } else {
        Error::Io(e)
    }
}

fn read_u8<R: Read>(reader: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf).map_err(eof_as_malformed)?;
    Ok(buf[0])
}

fn read_u16<R: Read>(reader: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf).map_err(eof_as_malformed)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).map_err(eof_as_malformed)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_cstr<R: Read>(reader: &mut R) -> Result<String> {
    let mut bytes = Vec::new();
    loop {
        let b = read_u8(reader)?;
        if b == 0 {
            break;
        }
        bytes.push(b);
    }
    String::from_utf8(bytes)
        .map_err(|_| Error::MalformedInput("name string is not valid UTF-8".to_string()))
}

fn read_entry<R: Read>(reader: &mut R) -> Result<PwalnEntry> {
    let mut buf = [0u8; 20];
    reader.read_exact(&mut buf).map_err(eof_as_malformed)?;
    Ok(PwalnEntry {
        ref_start: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
        ref_end: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
        qry_start: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
        qry_end: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
        ref_chrom: u16::from_le_bytes(buf[16..18].try_into().unwrap()),
        qry_chrom: u16::from_le_bytes(buf[18..20].try_into().unwrap()),
    })
}

fn validate_entry(entry: &PwalnEntry, num_chroms: usize) -> Result<()> {
    if usize::from(entry.ref_chrom) >= num_chroms || usize::from(entry.qry_chrom) >= num_chroms {
        return Err(Error::MalformedInput(format!(
            "chromosome id out of range in entry {:?}",
            entry
        )));
    }
    if entry.ref_start >= entry.ref_end {
        return Err(Error::MalformedInput(format!(
            "empty reference interval in entry {:?}",
            entry
        )));
    }
    if entry.qry_start == entry.qry_end {
        return Err(Error::MalformedInput(format!(
            "empty query interval in entry {:?}",
            entry
        )));
    }
    Ok(())
}

/// Parse the whole binary pwaln stream into the chromosome name table and
/// the nested species maps.
pub fn read_pwalns<R: Read>(mut reader: R) -> Result<(Vec<String>, PwalnMap)> {
    let num_chroms = read_u16(&mut reader)?;
    let mut chroms = Vec::with_capacity(usize::from(num_chroms));
    for _ in 0..num_chroms {
        chroms.push(read_cstr(&mut reader)?);
    }

    let num_ref_species = read_u8(&mut reader)?;
    let mut pwalns = PwalnMap::new();
    for _ in 0..num_ref_species {
        let ref_species = read_cstr(&mut reader)?;
        let num_qry_species = read_u8(&mut reader)?;
        let mut per_ref: IndexMap<String, Pwaln> = IndexMap::new();
        for _ in 0..num_qry_species {
            let qry_species = read_cstr(&mut reader)?;
            let num_buckets = read_u32(&mut reader)?;
            let mut pwaln = Pwaln::new();
            for _ in 0..num_buckets {
                let num_entries = read_u32(&mut reader)?;
                if num_entries == 0 {
                    return Err(Error::MalformedInput(format!(
                        "empty alignment bucket for {} -> {}",
                        ref_species, qry_species
                    )));
                }
                // Capacity is capped so a corrupt count cannot trigger a
                // huge allocation before the truncation check fires.
                let mut entries = Vec::with_capacity(num_entries.min(1 << 20) as usize);
                for _ in 0..num_entries {
                    let entry = read_entry(&mut reader)?;
                    validate_entry(&entry, chroms.len())?;
                    entries.push(entry);
                }
                let bucket_chrom = entries[0].ref_chrom;
                if entries.iter().any(|e| e.ref_chrom != bucket_chrom) {
                    return Err(Error::MalformedInput(format!(
                        "mixed ref chromosomes in one bucket for {} -> {}",
                        ref_species, qry_species
                    )));
                }
                if pwaln.insert(bucket_chrom, entries).is_some() {
                    return Err(Error::MalformedInput(format!(
                        "duplicate bucket for chromosome {} in {} -> {}",
                        bucket_chrom, ref_species, qry_species
                    )));
                }
            }
            if per_ref.insert(qry_species.clone(), pwaln).is_some() {
                return Err(Error::MalformedInput(format!(
                    "duplicate query species {} under {}",
                    qry_species, ref_species
                )));
            }
        }
        if pwalns.insert(ref_species.clone(), per_ref).is_some() {
            return Err(Error::MalformedInput(format!(
                "duplicate reference species {}",
                ref_species
            )));
        }
    }

    let mut probe = [0u8; 1];
    match reader.read(&mut probe) {
        Ok(0) => Ok((chroms, pwalns)),
        Ok(_) => Err(Error::MalformedInput(
            "trailing bytes after pwaln data".to_string(),
        )),
        Err(e) => Err(Error::Io(e)),
    }
}

fn write_cstr<W: Write>(writer: &mut W, s: &str) -> Result<()> {
    if s.as_bytes().contains(&0) {
        return Err(Error::Internal(format!("name contains a NUL byte: {:?}", s)));
    }
    writer.write_all(s.as_bytes())?;
    writer.write_all(&[0])?;
    Ok(())
}

fn write_entry<W: Write>(writer: &mut W, entry: &PwalnEntry) -> Result<()> {
    let mut buf = [0u8; 20];
    buf[0..4].copy_from_slice(&entry.ref_start.to_le_bytes());
    buf[4..8].copy_from_slice(&entry.ref_end.to_le_bytes());
    buf[8..12].copy_from_slice(&entry.qry_start.to_le_bytes());
    buf[12..16].copy_from_slice(&entry.qry_end.to_le_bytes());
    buf[16..18].copy_from_slice(&entry.ref_chrom.to_le_bytes());
    buf[18..20].copy_from_slice(&entry.qry_chrom.to_le_bytes());
    writer.write_all(&buf)?;
    Ok(())
}

fn checked_count<T: TryFrom<usize>>(count: usize, what: &str) -> Result<T> {
    T::try_from(count).map_err(|_| Error::Internal(format!("{} count {} overflows the wire format", what, count)))
}

/// Write the chromosome table and species maps in the binary pwaln format.
/// Species and buckets are emitted in stored order, so re-serializing a
/// loaded canonical file reproduces it byte for byte.
pub fn write_pwalns<W: Write>(mut writer: W, chroms: &[String], pwalns: &PwalnMap) -> Result<()> {
    let num_chroms: u16 = checked_count(chroms.len(), "chromosome")?;
    writer.write_all(&num_chroms.to_le_bytes())?;
    for chrom in chroms {
        write_cstr(&mut writer, chrom)?;
    }

    let num_ref_species: u8 = checked_count(pwalns.len(), "reference species")?;
    writer.write_all(&[num_ref_species])?;
    for (ref_species, per_ref) in pwalns {
        write_cstr(&mut writer, ref_species)?;
        let num_qry_species: u8 = checked_count(per_ref.len(), "query species")?;
        writer.write_all(&[num_qry_species])?;
        for (qry_species, pwaln) in per_ref {
            write_cstr(&mut writer, qry_species)?;
            let num_buckets: u32 = checked_count(pwaln.len(), "bucket")?;
            writer.write_all(&num_buckets.to_le_bytes())?;
            for entries in pwaln.values() {
                let num_entries: u32 = checked_count(entries.len(), "entry")?;
                writer.write_all(&num_entries.to_le_bytes())?;
                for entry in entries {
                    write_entry(&mut writer, entry)?;
                }
            }
        }
    }
    Ok(())
}

//! TLE Database
//!
//! Parses, merges and persists NORAD two-line element sets across the
//! flyby search paths. Satellite identity is the catalog number; at most
//! one entry per satellite survives a merge. A whitelist in the user
//! config directory controls which entries are enabled for tracking.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use search_paths::Paths;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

mod update;
mod whitelist;

pub use update::{update, updatefile_writepath, UpdateStatus};
pub use whitelist::{
    load_whitelist, whitelist_from_search_paths, whitelist_to_file, whitelist_write_to_default,
};

/// Hard limit on the number of satellites in a database. Parsing beyond
/// this truncates with a diagnostic.
pub const MAX_SATS: usize = 250;

/// Significant length of the satellite name field.
pub const MAX_NAME_LENGTH: usize = 24;

/// Length of a NORAD TLE line.
pub const TLE_LINE_LENGTH: usize = 69;

#[derive(Error, Debug)]
pub enum TleDbError {
    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, TleDbError>;

/// One NORAD two-line element set plus provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TleEntry {
    pub satellite_number: u32,
    pub name: String,
    pub line1: String,
    pub line2: String,
    pub source_filename: PathBuf,
    pub enabled: bool,
}

impl TleEntry {
    /// Epoch sort key `year*1000 + day`, with the 1957-pivot two-digit
    /// year rule applied.
    pub fn epoch_key(&self) -> f64 {
        epoch_key(&self.line1)
    }

    /// True if this element set has a more recent epoch than `other`.
    pub fn is_newer_than(&self, other: &TleEntry) -> bool {
        self.epoch_key() > other.epoch_key()
    }
}

/// Conflict resolution used by [`TleDatabase::merge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Overwrite an existing entry only when the incoming epoch is newer.
    Newest,
    /// Never overwrite existing entries; only append unknown satellites.
    Keep,
}

/// Ordered collection of [`TleEntry`], at most one per catalog number.
#[derive(Debug, Clone, Default)]
pub struct TleDatabase {
    entries: Vec<TleEntry>,
    /// True when the database was assembled by the search-path walk, false
    /// when loaded from explicitly supplied files.
    pub read_from_xdg: bool,
}

/// Checksum substitution: digits map to their value, '-' to 1, everything
/// else to 0.
fn checksum_value(b: u8) -> u32 {
    if b.is_ascii_digit() {
        u32::from(b - b'0')
    } else if b == b'-' {
        1
    } else {
        0
    }
}

/// Mod-10 checksum over the first 68 columns of a TLE line.
pub fn line_checksum(line: &str) -> u32 {
    line.bytes().take(68).map(checksum_value).sum::<u32>() % 10
}

/// Structural and checksum validation of a two-line element set. This is
/// deliberately strict: fixed separators, decimal points and digit columns
/// are all checked so random text cannot slip through on checksum luck
/// alone.
pub fn validate_tle(line1: &str, line2: &str) -> bool {
    let l1 = line1.as_bytes();
    let l2 = line2.as_bytes();
    if l1.len() < TLE_LINE_LENGTH || l2.len() < TLE_LINE_LENGTH {
        return false;
    }

    checksum_value(l1[68]) == line_checksum(line1)
        && checksum_value(l2[68]) == line_checksum(line2)
        && l1[0] == b'1'
        && l1[1] == b' '
        && l1[7] == b'U'
        && l1[8] == b' '
        && l1[17] == b' '
        && l1[23] == b'.'
        && l1[32] == b' '
        && l1[34] == b'.'
        && l1[43] == b' '
        && l1[52] == b' '
        && l1[61] == b' '
        && l1[62] == b'0'
        && l1[63] == b' '
        && l2[0] == b'2'
        && l2[1] == b' '
        && l2[7] == b' '
        && l2[11] == b'.'
        && l2[16] == b' '
        && l2[20] == b'.'
        && l2[25] == b' '
        && l2[33] == b' '
        && l2[37] == b'.'
        && l2[42] == b' '
        && l2[46] == b'.'
        && l2[51] == b' '
        && l2[54] == b'.'
        && l1[2..7] == l2[2..7]
        && l1[68].is_ascii_digit()
        && l2[68].is_ascii_digit()
        && l1[18].is_ascii_digit()
        && l1[19].is_ascii_digit()
        && l2[31].is_ascii_digit()
        && l2[32].is_ascii_digit()
}

/// Catalog number from line 1 columns 3-7.
pub fn satellite_number(line1: &str) -> Option<u32> {
    line1.get(2..7)?.trim().parse().ok()
}

/// Epoch sort key `year*1000 + day` from line 1 columns 19-32. Two-digit
/// years below 57 are 20xx, the rest 19xx.
pub fn epoch_key(line1: &str) -> f64 {
    let year: u32 = line1
        .get(18..20)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0);
    let day: f64 = line1
        .get(20..32)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0.0);
    let full_year = if year < 57 { 2000 + year } else { 1900 + year };
    f64::from(full_year) * 1000.0 + day
}

impl TleDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TleEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&TleEntry> {
        self.entries.get(index)
    }

    /// Index of the entry with the given catalog number.
    pub fn find(&self, satellite_number: u32) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.satellite_number == satellite_number)
    }

    /// Append an entry, respecting the hard satellite limit.
    pub fn add(&mut self, entry: TleEntry) {
        if self.entries.len() >= MAX_SATS {
            warn!(
                "TLE database full ({} satellites), dropping {} ({})",
                MAX_SATS, entry.name, entry.satellite_number
            );
            return;
        }
        self.entries.push(entry);
    }

    /// Overwrite the element set at `index` with `new_entry`, keeping
    /// nothing from the old entry.
    pub fn overwrite(&mut self, index: usize, new_entry: &TleEntry) {
        if let Some(slot) = self.entries.get_mut(index) {
            *slot = new_entry.clone();
        }
    }

    pub fn set_enabled(&mut self, index: usize, enabled: bool) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.enabled = enabled;
        }
    }

    /// Indices of all enabled entries, in database order.
    pub fn enabled_indices(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.enabled)
            .map(|(i, _)| i)
            .collect()
    }

    /// Parse a TLE file of successive name/line1/line2 groups. Groups that
    /// fail validation are skipped; the rest load normally.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| TleDbError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut db = Self::new();
        let mut lines = contents.lines();
        while let Some(name_line) = lines.next() {
            let (Some(line1), Some(line2)) = (lines.next(), lines.next()) else {
                break;
            };
            let line1 = line1.trim_end_matches('\r');
            let line2 = line2.trim_end_matches('\r');

            if !validate_tle(line1, line2) {
                debug!("skipping invalid element set in {}", path.display());
                continue;
            }
            let Some(satellite_number) = satellite_number(line1) else {
                continue;
            };

            let name: String = name_line.trim_end().chars().take(MAX_NAME_LENGTH).collect();

            db.add(TleEntry {
                satellite_number,
                name,
                line1: line1.get(..TLE_LINE_LENGTH).unwrap_or(line1).to_string(),
                line2: line2.get(..TLE_LINE_LENGTH).unwrap_or(line2).to_string(),
                source_filename: path.to_path_buf(),
                enabled: false,
            });
        }
        Ok(db)
    }

    /// Parse every regular file in a directory (non-recursive) and merge
    /// the results, resolving multiply-defined satellites to the newest
    /// epoch. Missing directories yield an empty database.
    pub fn from_directory(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let mut db = Self::new();

        let Ok(dir) = fs::read_dir(path) else {
            return db;
        };

        let mut files: Vec<PathBuf> = dir
            .flatten()
            .map(|entry| entry.path())
            .filter(|p| p.is_file())
            .collect();
        files.sort();

        for file in files {
            match Self::from_file(&file) {
                Ok(file_db) => db.merge(file_db, MergePolicy::Newest),
                Err(e) => warn!("skipping {}: {}", file.display(), e),
            }
        }
        db
    }

    /// Merge `other` into `self`. Satellites unknown to `self` are
    /// appended; conflicts resolve per `policy`.
    pub fn merge(&mut self, other: TleDatabase, policy: MergePolicy) {
        for entry in other.entries {
            match self.find(entry.satellite_number) {
                Some(index) => {
                    if policy == MergePolicy::Newest && entry.is_newer_than(&self.entries[index]) {
                        self.overwrite(index, &entry);
                    }
                }
                None => self.add(entry),
            }
        }
    }

    /// Assemble the database from the search paths: the user TLE directory
    /// first, then each system data directory in declared order. The user
    /// scope wins regardless of epoch; within the system directories the
    /// first occurrence wins.
    pub fn from_search_paths(paths: &Paths) -> Self {
        let mut db = Self::from_directory(paths.user_tle_dir());

        for dir in paths.system_tle_dirs() {
            let system_db = Self::from_directory(&dir);
            db.merge(system_db, MergePolicy::Keep);
        }

        db.read_from_xdg = true;
        debug!("loaded {} TLEs from search paths", db.len());
        db
    }

    /// Write all entries to a TLE file (name/line1/line2 per record).
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.name);
            out.push('\n');
            out.push_str(&entry.line1);
            out.push('\n');
            out.push_str(&entry.line2);
            out.push('\n');
        }
        let mut file = fs::File::create(path).map_err(|source| TleDbError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        file.write_all(out.as_bytes())
            .map_err(|source| TleDbError::Write {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Rewrite `filename` with every database entry whose source matches
    /// it. Used to push updated element sets back to their original file.
    pub fn rewrite_source_file(&self, filename: &Path) -> Result<()> {
        let mut subset = TleDatabase::new();
        for entry in self
            .entries
            .iter()
            .filter(|e| e.source_filename == filename)
        {
            subset.add(entry.clone());
        }
        subset.to_file(filename)
    }

    /// Distinct source filenames, in first-seen order.
    pub fn source_filenames(&self) -> Vec<PathBuf> {
        let mut filenames: Vec<PathBuf> = Vec::new();
        for entry in &self.entries {
            if !filenames.contains(&entry.source_filename) {
                filenames.push(entry.source_filename.clone());
            }
        }
        filenames
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;
    use std::path::Path;

    /// Append the mod-10 checksum to a 68-column TLE line body.
    pub fn with_checksum(body: &str) -> String {
        assert_eq!(body.len(), 68, "TLE body must be 68 columns");
        format!("{}{}", body, line_checksum(body))
    }

    /// Build a structurally valid element set for the given catalog number
    /// and epoch (two-digit year + fractional day).
    pub fn tle_lines(satnum: u32, epoch_year: u32, epoch_day: f64) -> (String, String) {
        let line1 = with_checksum(&format!(
            "1 {:05}U 98067A   {:02}{:012.8}  .00016717  00000-0  30777-3 0  999",
            satnum, epoch_year, epoch_day
        ));
        let line2 = with_checksum(&format!(
            "2 {:05}  51.6416 247.4627 0006703 130.5360 325.0288 15.7212539156353",
            satnum
        ));
        (line1, line2)
    }

    pub fn entry(satnum: u32, epoch_year: u32, epoch_day: f64, source: &str) -> TleEntry {
        let (line1, line2) = tle_lines(satnum, epoch_year, epoch_day);
        TleEntry {
            satellite_number: satnum,
            name: format!("SAT-{}", satnum),
            line1,
            line2,
            source_filename: Path::new(source).to_path_buf(),
            enabled: false,
        }
    }

    pub fn db_with(entries: Vec<TleEntry>) -> TleDatabase {
        let mut db = TleDatabase::new();
        for entry in entries {
            db.add(entry);
        }
        db
    }
}

//! Transponder Database
//!
//! Per-satellite radio metadata (transponder pass-bands and attitude for
//! squint calculation), layered from system data directories and the user
//! data directory. The database mirrors the TLE database index for index:
//! entry `i` describes the satellite of TLE entry `i`.
//!
//! The on-disk format is the venerable predict satellite database, kept
//! for compatibility. Redundant fields (weekly/orbital schedules) are
//! parsed and ignored.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use search_paths::Paths;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use tle_db::TleDatabase;

/// Hard limit on transponders per satellite. Extra blocks are dropped
/// with a diagnostic.
pub const MAX_TRANSPONDERS: usize = 10;

#[derive(Error, Debug)]
pub enum TransponderDbError {
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
    #[error("database has {db_len} entries but TLE database has {tle_len}")]
    TleMismatch { db_len: usize, tle_len: usize },
}

pub type Result<T> = std::result::Result<T, TransponderDbError>;

/// Which on-disk scope(s) contributed an entry, plus whether it carries
/// unsaved edits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationFlags(u8);

impl LocationFlags {
    pub const NONE: LocationFlags = LocationFlags(0);
    pub const DATA_HOME: LocationFlags = LocationFlags(1);
    pub const DATA_DIRS: LocationFlags = LocationFlags(2);
    pub const TRANSIENT: LocationFlags = LocationFlags(4);

    pub fn contains(self, other: LocationFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: LocationFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: LocationFlags) {
        self.0 &= !other.0;
    }
}

/// One uplink/downlink pass-band pair. Frequencies are MHz. A transponder
/// is defined when either start frequency is non-zero; inverted pairs
/// (start > end) flip the tuning polarity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transponder {
    pub name: String,
    pub uplink_start: f64,
    pub uplink_end: f64,
    pub downlink_start: f64,
    pub downlink_end: f64,
}

impl Transponder {
    pub fn is_defined(&self) -> bool {
        self.uplink_start != 0.0 || self.downlink_start != 0.0
    }
}

/// Radio metadata for one satellite.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransponderEntry {
    pub squint_enabled: bool,
    /// Attitude latitude in radians, meaningful only when squint_enabled.
    pub attitude_latitude: f64,
    /// Attitude longitude in radians, meaningful only when squint_enabled.
    pub attitude_longitude: f64,
    pub transponders: Vec<Transponder>,
    pub location: LocationFlags,
}

impl TransponderEntry {
    /// An entry is empty when no transponder is defined and squint is off.
    pub fn is_empty(&self) -> bool {
        !self.squint_enabled && !self.transponders.iter().any(Transponder::is_defined)
    }

    /// Content equality, ignoring location provenance.
    pub fn eq_content(&self, other: &TransponderEntry) -> bool {
        self.squint_enabled == other.squint_enabled
            && self.attitude_latitude == other.attitude_latitude
            && self.attitude_longitude == other.attitude_longitude
            && self.transponders == other.transponders
    }
}

/// Transponder entries mirroring a TLE database, one per TLE entry.
#[derive(Debug, Clone, Default)]
pub struct TransponderDatabase {
    entries: Vec<TransponderEntry>,
    /// True once at least one file contributed an entry.
    pub loaded: bool,
}

/// Parse a "start, end" frequency pair. Surrounding parentheses are
/// tolerated.
fn parse_pair(line: &str) -> Option<(f64, f64)> {
    let cleaned = line.trim().trim_start_matches('(').trim_end_matches(')');
    let mut parts = cleaned.splitn(2, ',');
    let first = parts.next()?.trim().parse().ok()?;
    let second = parts.next()?.trim().parse().ok()?;
    Some((first, second))
}

impl TransponderDatabase {
    /// Empty database sized to the TLE database.
    pub fn new(tle_db: &TleDatabase) -> Self {
        Self {
            entries: vec![TransponderEntry::default(); tle_db.len()],
            loaded: false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TransponderEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&TransponderEntry> {
        self.entries.get(index)
    }

    /// Replace the entry at `index`, marking it as carrying unsaved edits.
    pub fn set_entry(&mut self, index: usize, mut entry: TransponderEntry) {
        if let Some(slot) = self.entries.get_mut(index) {
            entry.location = slot.location;
            entry.location.insert(LocationFlags::TRANSIENT);
            *slot = entry;
        }
    }

    /// Reload the system-scope version of one entry, discarding user edits.
    /// Write-back will then elide the entry, so the system definition wins
    /// again on the next load.
    pub fn restore_system_entry(&mut self, index: usize, tle_db: &TleDatabase, paths: &Paths) {
        let mut system_db = TransponderDatabase::new(tle_db);
        for db_file in paths.system_db_files().iter().rev() {
            if let Err(e) = system_db.read_file(db_file, tle_db, LocationFlags::DATA_DIRS) {
                debug!("no system database at {}: {}", db_file.display(), e);
            }
        }
        if let (Some(slot), Some(system)) =
            (self.entries.get_mut(index), system_db.entries.get(index))
        {
            *slot = system.clone();
        }
    }

    /// Read one database file on top of the current state. Records for
    /// satellites absent from the TLE database are skipped; matched
    /// entries are overwritten and OR the given location flag in.
    pub fn read_file(
        &mut self,
        path: impl AsRef<Path>,
        tle_db: &TleDatabase,
        location: LocationFlags,
    ) -> Result<()> {
        let path = path.as_ref();
        if self.entries.len() != tle_db.len() {
            return Err(TransponderDbError::TleMismatch {
                db_len: self.entries.len(),
                tle_len: tle_db.len(),
            });
        }
        let contents = fs::read_to_string(path).map_err(|source| TransponderDbError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut lines = contents.lines();
        loop {
            // satellite name line, present for readability only
            let Some(name_line) = lines.next() else {
                break;
            };
            if name_line.starts_with("end") {
                break;
            }

            let satellite_number: Option<u32> = lines.next().and_then(|l| l.trim().parse().ok());

            let mut entry = TransponderEntry::default();
            if let Some(attitude_line) = lines.next() {
                if !attitude_line.trim_start().starts_with("No") {
                    if let Some((alat, alon)) = parse_pair(attitude_line) {
                        entry.attitude_latitude = alat;
                        entry.attitude_longitude = alon;
                        entry.squint_enabled = true;
                    }
                }
            }

            // transponder blocks until the record terminator
            let mut dropped = 0;
            loop {
                let Some(transponder_name) = lines.next() else {
                    break;
                };
                if transponder_name.starts_with("end") {
                    break;
                }
                let uplink = lines.next().and_then(parse_pair);
                let downlink = lines.next().and_then(parse_pair);
                // unused legacy fields: weekly and orbital schedules
                lines.next();
                lines.next();

                let (uplink_start, uplink_end) = uplink.unwrap_or_default();
                let (downlink_start, downlink_end) = downlink.unwrap_or_default();
                let transponder = Transponder {
                    name: transponder_name.trim_end().to_string(),
                    uplink_start,
                    uplink_end,
                    downlink_start,
                    downlink_end,
                };
                if transponder.is_defined() {
                    if entry.transponders.len() < MAX_TRANSPONDERS {
                        entry.transponders.push(transponder);
                    } else {
                        dropped += 1;
                    }
                }
            }
            if dropped > 0 {
                warn!(
                    "satellite {:?} has more than {} transponders, dropped {}",
                    satellite_number, MAX_TRANSPONDERS, dropped
                );
            }

            let Some(index) = satellite_number.and_then(|n| tle_db.find(n)) else {
                continue;
            };
            let location_union = {
                let mut flags = self.entries[index].location;
                flags.insert(location);
                flags
            };
            entry.location = location_union;
            self.entries[index] = entry;
            self.loaded = true;
        }
        Ok(())
    }

    /// Assemble the database from the search paths: system data
    /// directories in reverse declared order (so earlier directories win),
    /// then the user data directory on top.
    pub fn from_search_paths(tle_db: &TleDatabase, paths: &Paths) -> Self {
        let mut db = Self::new(tle_db);

        for db_file in paths.system_db_files().iter().rev() {
            if let Err(e) = db.read_file(db_file, tle_db, LocationFlags::DATA_DIRS) {
                debug!("no transponder database at {}: {}", db_file.display(), e);
            }
        }
        let user_file = paths.user_db_file();
        if let Err(e) = db.read_file(&user_file, tle_db, LocationFlags::DATA_HOME) {
            debug!("no transponder database at {}: {}", user_file.display(), e);
        }
        db
    }

    /// Write the entries selected by `should_write` to a database file.
    pub fn to_file(
        &self,
        path: impl AsRef<Path>,
        tle_db: &TleDatabase,
        should_write: &[bool],
    ) -> Result<()> {
        let path = path.as_ref();
        let mut out = String::new();
        for (index, entry) in self.entries.iter().enumerate() {
            if !should_write.get(index).copied().unwrap_or(false) {
                continue;
            }
            let Some(tle) = tle_db.entry(index) else {
                continue;
            };
            out.push_str(&format!("{}\n{}\n", tle.name, tle.satellite_number));
            if entry.squint_enabled {
                out.push_str(&format!(
                    "{:.6}, {:.6}\n",
                    entry.attitude_latitude, entry.attitude_longitude
                ));
            } else {
                out.push_str("No alat, alon\n");
            }
            for transponder in entry.transponders.iter().filter(|t| t.is_defined()) {
                out.push_str(&format!(
                    "{}\n{:.6}, {:.6}\n{:.6}, {:.6}\nNo weekly schedule\nNo orbital schedule\n",
                    transponder.name,
                    transponder.uplink_start,
                    transponder.uplink_end,
                    transponder.downlink_start,
                    transponder.downlink_end
                ));
            }
            out.push_str("end\n");
        }

        let mut file = fs::File::create(path).map_err(|source| TransponderDbError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        file.write_all(out.as_bytes())
            .map_err(|source| TransponderDbError::Write {
                path: path.to_path_buf(),
                source,
            })
    }

    /// True when write-back should include the entry: it belongs to the
    /// user scope or carries edits, except that an empty entry with no
    /// system counterpart would only pollute the user file.
    pub fn should_write(&self, index: usize) -> bool {
        let Some(entry) = self.entries.get(index) else {
            return false;
        };
        let mut write = entry.location.contains(LocationFlags::DATA_HOME)
            || entry.location.contains(LocationFlags::TRANSIENT);

        if !entry.location.contains(LocationFlags::DATA_DIRS) && entry.is_empty() {
            write = false;
        }
        write
    }

    /// Write the user-scope entries to `data_home/flyby/flyby.db`. Empty
    /// entries are written only when they override a system definition.
    pub fn write_to_default(&self, tle_db: &TleDatabase, paths: &Paths) -> Result<()> {
        if let Err(e) = paths.create_user_dirs() {
            debug!("could not create user dirs: {}", e);
        }
        let should_write: Vec<bool> = (0..self.entries.len())
            .map(|index| self.should_write(index))
            .collect();
        self.to_file(paths.user_db_file(), tle_db, &should_write)
    }
}

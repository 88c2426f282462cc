//! Satellite whitelist
//!
//! A plain text file of catalog numbers, one per line, in the user config
//! directory. Loading enables exactly the listed satellites and disables
//! the rest; saving writes the currently enabled set back.

use std::fs;
use std::io::Write;
use std::path::Path;

use search_paths::Paths;
use tracing::debug;

use crate::{Result, TleDatabase, TleDbError};

/// Enable exactly the satellites listed in `path`. Blank lines and lines
/// that do not parse as a decimal number are skipped. A missing file
/// counts as an empty whitelist, disabling everything.
pub fn load_whitelist(path: impl AsRef<Path>, db: &mut TleDatabase) {
    for index in 0..db.len() {
        db.set_enabled(index, false);
    }

    let Ok(contents) = fs::read_to_string(path.as_ref()) else {
        return;
    };

    for line in contents.lines() {
        if let Ok(satellite_number) = line.trim().parse::<u32>() {
            if let Some(index) = db.find(satellite_number) {
                db.set_enabled(index, true);
            }
        }
    }
}

/// Load the whitelist from its user config location.
pub fn whitelist_from_search_paths(paths: &Paths, db: &mut TleDatabase) {
    load_whitelist(paths.user_whitelist_file(), db);
}

/// Write the enabled catalog numbers to `path`, one per line.
pub fn whitelist_to_file(path: impl AsRef<Path>, db: &TleDatabase) -> Result<()> {
    let path = path.as_ref();
    let mut out = String::new();
    for entry in db.entries().iter().filter(|e| e.enabled) {
        out.push_str(&entry.satellite_number.to_string());
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

/// Write the whitelist to its user config location, creating the flyby
/// directories when missing.
pub fn whitelist_write_to_default(paths: &Paths, db: &TleDatabase) -> Result<()> {
    if let Err(e) = paths.create_user_dirs() {
        debug!("could not create user dirs: {}", e);
    }
    whitelist_to_file(paths.user_whitelist_file(), db)
}

//! TLE database updates
//!
//! Applies newer element sets from an update file to an existing
//! database, pushing the refreshed sets back to their original files when
//! those are writable. Updates belonging to read-only files are collected
//! into a fresh update file in the user TLE directory instead.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use search_paths::Paths;
use tracing::{debug, info};

use crate::{Result, TleDatabase};

/// What happened to a database entry during [`update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateStatus {
    /// The in-memory entry was replaced by a newer element set.
    pub db_updated: bool,
    /// The entry's source file was rewritten with the new element set.
    pub file_updated: bool,
    /// The entry was re-homed to a newly created update file.
    pub in_new_file: bool,
}

/// Path for a new update file in the user TLE directory:
/// `tle-updatefile-<date>-<time>-<N>.tle`, where N is the first index that
/// does not collide with an existing file.
pub fn updatefile_writepath(paths: &Paths, now: DateTime<Utc>) -> search_paths::Result<PathBuf> {
    paths.create_user_dirs()?;
    let stem = now.format("tle-updatefile-%Y-%m-%d-%H%M%S-").to_string();
    let dir = paths.user_tle_dir();

    let mut index = 0;
    loop {
        let candidate = dir.join(format!("{}{}.tle", stem, index));
        if !candidate.exists() {
            return Ok(candidate);
        }
        index += 1;
    }
}

fn file_is_writable(path: &Path) -> bool {
    fs::OpenOptions::new().write(true).open(path).is_ok()
}

/// Update `db` from the element sets in `update_file`. Only satellites
/// already present in the database are considered, and only when the
/// incoming epoch is newer. The updated entry keeps its database name and
/// source filename.
///
/// Returns one status per database entry, aligned with the entry order.
pub fn update(
    update_file: impl AsRef<Path>,
    db: &mut TleDatabase,
    paths: &Paths,
    now: DateTime<Utc>,
) -> Result<Vec<UpdateStatus>> {
    let update_file = update_file.as_ref();
    let new_db = TleDatabase::from_file(update_file)?;
    let mut statuses = vec![UpdateStatus::default(); db.len()];

    // indices into (new_db, db) for element sets with a newer epoch
    let mut pending: Vec<(usize, usize)> = Vec::new();
    for (new_index, new_entry) in new_db.entries().iter().enumerate() {
        if let Some(db_index) = db.find(new_entry.satellite_number) {
            if new_entry.is_newer_than(&db.entries()[db_index]) {
                pending.push((new_index, db_index));
            }
        }
    }

    if pending.is_empty() {
        debug!("no newer element sets in {}", update_file.display());
        return Ok(statuses);
    }

    // apply updates file by file so each writable source is rewritten once
    let mut unwritable: Vec<usize> = Vec::new();
    let mut done = vec![false; pending.len()];
    for i in 0..pending.len() {
        if done[i] {
            continue;
        }
        let filename = db.entries()[pending[i].1].source_filename.clone();
        let writable = file_is_writable(&filename);

        for (j, &(new_index, db_index)) in pending.iter().enumerate().skip(i) {
            if done[j] || db.entries()[db_index].source_filename != filename {
                continue;
            }
            let keep_name = db.entries()[db_index].name.clone();
            db.overwrite(db_index, &new_db.entries()[new_index]);
            if let Some(entry) = db.entries.get_mut(db_index) {
                entry.name = keep_name;
                entry.source_filename = filename.clone();
            }
            done[j] = true;

            statuses[db_index].db_updated = true;
            if writable {
                statuses[db_index].file_updated = true;
            } else {
                unwritable.push(db_index);
            }
        }

        if writable {
            db.rewrite_source_file(&filename)?;
            info!("updated {}", filename.display());
        }
    }

    // updates that could not be written back land in a fresh user file,
    // but only when the database actually came from the search paths
    if !unwritable.is_empty() && db.read_from_xdg {
        if let Ok(new_file) = updatefile_writepath(paths, now) {
            let mut new_file_db = TleDatabase::new();
            for &db_index in &unwritable {
                new_file_db.add(db.entries()[db_index].clone());
                if let Some(entry) = db.entries.get_mut(db_index) {
                    entry.source_filename = new_file.clone();
                }
            }
            if new_file_db.to_file(&new_file).is_ok() {
                for &db_index in &unwritable {
                    statuses[db_index].in_new_file = true;
                }
                info!(
                    "wrote {} read-only updates to {}",
                    unwritable.len(),
                    new_file.display()
                );
            }
        }
    }

    Ok(statuses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::*;
    use chrono::TimeZone;
    use std::io::Write;
    use tempfile::TempDir;

    fn test_paths(root: &Path) -> Paths {
        Paths {
            config_home: root.join("config"),
            config_dirs: vec![],
            data_home: root.join("data"),
            data_dirs: vec![],
        }
    }

    fn write_db(path: &Path, db: &TleDatabase) {
        db.to_file(path).unwrap();
    }

    #[test]
    fn test_update_keeps_name_and_source() {
        let tmp = TempDir::new().unwrap();
        let paths = test_paths(tmp.path());

        // database A loaded from a writable file
        let source = tmp.path().join("old.tle");
        let mut old = entry(25544, 23, 1.0, "placeholder");
        old.name = "ISS (ZARYA)".to_string();
        old.source_filename = source.clone();
        let mut db = db_with(vec![old]);
        write_db(&source, &db);

        // update file B with a newer epoch and a different name
        let update_path = tmp.path().join("update.tle");
        let mut newer = entry(25544, 23, 50.0, "update");
        newer.name = "ISS UPDATED".to_string();
        db_with(vec![newer.clone()]).to_file(&update_path).unwrap();

        let now = Utc.with_ymd_and_hms(2023, 2, 1, 12, 0, 0).unwrap();
        let statuses = update(&update_path, &mut db, &paths, now).unwrap();

        let updated = db.entry(0).unwrap();
        assert_eq!(updated.line1, newer.line1);
        assert_eq!(updated.name, "ISS (ZARYA)");
        assert_eq!(updated.source_filename, source);
        assert!(statuses[0].db_updated);
        assert!(statuses[0].file_updated);
        assert!(!statuses[0].in_new_file);

        // the source file was rewritten with the new element set
        let reread = TleDatabase::from_file(&source).unwrap();
        assert_eq!(reread.entry(0).unwrap().line1, newer.line1);
    }

    #[test]
    fn test_update_ignores_older_and_unknown() {
        let tmp = TempDir::new().unwrap();
        let paths = test_paths(tmp.path());

        let source = tmp.path().join("db.tle");
        let mut db = db_with(vec![entry(1, 23, 100.0, "x")]);
        db.entries.get_mut(0).unwrap().source_filename = source.clone();
        write_db(&source, &db);

        // older epoch for sat 1, plus an unknown satellite
        let update_path = tmp.path().join("update.tle");
        db_with(vec![entry(1, 23, 1.0, "u"), entry(99, 23, 200.0, "u")])
            .to_file(&update_path)
            .unwrap();

        let now = Utc.with_ymd_and_hms(2023, 2, 1, 12, 0, 0).unwrap();
        let statuses = update(&update_path, &mut db, &paths, now).unwrap();

        assert_eq!(db.len(), 1);
        assert_eq!(statuses[0], UpdateStatus::default());
        assert!((db.entry(0).unwrap().epoch_key() - 2023100.0).abs() < 1.0);
    }

    #[test]
    fn test_update_unwritable_goes_to_new_file() {
        let tmp = TempDir::new().unwrap();
        let paths = test_paths(tmp.path());

        // entry whose source file does not exist (not writable)
        let mut db = db_with(vec![entry(1, 23, 1.0, "/nonexistent/system.tle")]);
        db.read_from_xdg = true;

        let update_path = tmp.path().join("update.tle");
        db_with(vec![entry(1, 23, 50.0, "u")])
            .to_file(&update_path)
            .unwrap();

        let now = Utc.with_ymd_and_hms(2023, 2, 1, 12, 0, 0).unwrap();
        let statuses = update(&update_path, &mut db, &paths, now).unwrap();

        assert!(statuses[0].db_updated);
        assert!(!statuses[0].file_updated);
        assert!(statuses[0].in_new_file);

        let new_source = db.entry(0).unwrap().source_filename.clone();
        assert!(new_source.starts_with(paths.user_tle_dir()));
        assert!(new_source.exists());

        let reread = TleDatabase::from_file(&new_source).unwrap();
        assert_eq!(reread.len(), 1);
    }

    #[test]
    fn test_updatefile_writepath_avoids_collisions() {
        let tmp = TempDir::new().unwrap();
        let paths = test_paths(tmp.path());
        let now = Utc.with_ymd_and_hms(2023, 2, 1, 12, 0, 0).unwrap();

        let first = updatefile_writepath(&paths, now).unwrap();
        fs::File::create(&first).unwrap();
        let second = updatefile_writepath(&paths, now).unwrap();

        assert_ne!(first, second);
        assert!(first.to_string_lossy().ends_with("-0.tle"));
        assert!(second.to_string_lossy().ends_with("-1.tle"));
    }
}

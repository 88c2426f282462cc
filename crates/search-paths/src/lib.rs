//! Search Path Resolution
//!
//! Computes the XDG-style config/data directories that hold flyby's files:
//! TLE directories, the transponder database, the QTH config and the
//! satellite whitelist. User-writable directories are created on demand;
//! system-wide directories are only ever read.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Subdirectory under every base directory that holds flyby's files.
pub const FLYBY_ROOT: &str = "flyby";
/// TLE directory relative to a data directory.
pub const TLE_DIR: &str = "flyby/tles";
/// Transponder database file relative to a data directory.
pub const DB_FILE: &str = "flyby/flyby.db";
/// QTH config file relative to a config directory.
pub const QTH_FILE: &str = "flyby/flyby.qth";
/// Whitelist file relative to a config directory.
pub const WHITELIST_FILE: &str = "flyby/flyby.whitelist";

#[derive(Error, Debug)]
pub enum PathError {
    #[error("HOME is not set and no XDG override supplied")]
    NoHome,
    #[error("could not create {}: {source}", path.display())]
    CreateFailed { path: PathBuf, source: io::Error },
}

pub type Result<T> = std::result::Result<T, PathError>;

/// Resolved set of base directories. Constructed once from the environment
/// (or explicitly in tests) and passed to every consumer, so nothing else
/// in the workspace reads environment variables.
#[derive(Debug, Clone)]
pub struct Paths {
    pub config_home: PathBuf,
    pub config_dirs: Vec<PathBuf>,
    pub data_home: PathBuf,
    pub data_dirs: Vec<PathBuf>,
}

/// Read an XDG `*_HOME` variable, falling back to `$HOME/<default>`.
/// Empty values count as unset per the basedir spec.
fn xdg_home(varname: &str, default_rel: &str) -> Result<PathBuf> {
    match env::var(varname) {
        Ok(val) if !val.is_empty() => Ok(PathBuf::from(val)),
        _ => {
            let home = env::var("HOME").map_err(|_| PathError::NoHome)?;
            if home.is_empty() {
                return Err(PathError::NoHome);
            }
            Ok(Path::new(&home).join(default_rel))
        }
    }
}

/// Read an XDG `*_DIRS` variable, falling back to `default_val`, split on ':'.
fn xdg_dirs(varname: &str, default_val: &str) -> Vec<PathBuf> {
    let joined = match env::var(varname) {
        Ok(val) if !val.is_empty() => val,
        _ => default_val.to_string(),
    };
    joined
        .split(':')
        .filter(|part| !part.is_empty())
        .map(PathBuf::from)
        .collect()
}

impl Paths {
    /// Resolve all base directories from the process environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            config_home: xdg_home("XDG_CONFIG_HOME", ".config")?,
            config_dirs: xdg_dirs("XDG_CONFIG_DIRS", "/etc/xdg"),
            data_home: xdg_home("XDG_DATA_HOME", ".local/share")?,
            data_dirs: xdg_dirs("XDG_DATA_DIRS", "/usr/local/share:/usr/share"),
        })
    }

    /// User-writable TLE directory.
    pub fn user_tle_dir(&self) -> PathBuf {
        self.data_home.join(TLE_DIR)
    }

    /// System TLE directories, in declared order of precedence.
    pub fn system_tle_dirs(&self) -> Vec<PathBuf> {
        self.data_dirs.iter().map(|d| d.join(TLE_DIR)).collect()
    }

    /// User-writable transponder database file.
    pub fn user_db_file(&self) -> PathBuf {
        self.data_home.join(DB_FILE)
    }

    /// System transponder database files, in declared order of precedence.
    pub fn system_db_files(&self) -> Vec<PathBuf> {
        self.data_dirs.iter().map(|d| d.join(DB_FILE)).collect()
    }

    /// User-writable QTH config file.
    pub fn user_qth_file(&self) -> PathBuf {
        self.config_home.join(QTH_FILE)
    }

    /// System QTH config files, in declared order of precedence.
    pub fn system_qth_files(&self) -> Vec<PathBuf> {
        self.config_dirs.iter().map(|d| d.join(QTH_FILE)).collect()
    }

    /// User-writable whitelist file.
    pub fn user_whitelist_file(&self) -> PathBuf {
        self.config_home.join(WHITELIST_FILE)
    }

    /// Create the user-writable flyby directories if they do not exist yet:
    /// `config_home/flyby`, `data_home/flyby` and `data_home/flyby/tles`.
    pub fn create_user_dirs(&self) -> Result<()> {
        for dir in [
            self.config_home.join(FLYBY_ROOT),
            self.data_home.join(FLYBY_ROOT),
            self.user_tle_dir(),
        ] {
            if !dir.exists() {
                debug!("creating {}", dir.display());
                fs::create_dir_all(&dir).map_err(|source| PathError::CreateFailed {
                    path: dir.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }
}

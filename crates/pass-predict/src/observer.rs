//! Ground station observer and QTH config persistence
//!
//! The QTH file is four lines: station name, latitude in decimal degrees
//! (north positive), longitude in decimal degrees (west positive, flipped
//! to east-positive radians on load), and altitude in whole metres.

use std::fs;
use std::io::Write;
use std::path::Path;

use search_paths::Paths;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{PredictError, Result};

/// Geodetic ground station location. Angles are radians, longitude east
/// positive, altitude metres above the ellipsoid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observer {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl Observer {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
            altitude,
        }
    }
}

/// Which scope supplied the QTH file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QthScope {
    UserHome,
    SystemWide,
}

/// Read a QTH file. Negative altitudes are stored unchanged; the
/// propagator is responsible for domain checks.
pub fn qth_from_file(path: impl AsRef<Path>) -> Result<Observer> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| PredictError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut lines = contents.lines();
    let malformed = || PredictError::MalformedQth {
        path: path.to_path_buf(),
    };

    let name = lines.next().ok_or_else(malformed)?.trim().to_string();
    let latitude_deg: f64 = lines
        .next()
        .and_then(|l| l.trim().parse().ok())
        .ok_or_else(malformed)?;
    let longitude_west_deg: f64 = lines
        .next()
        .and_then(|l| l.trim().parse().ok())
        .ok_or_else(malformed)?;
    let altitude: f64 = lines
        .next()
        .and_then(|l| l.trim().parse().ok())
        .ok_or_else(malformed)?;

    Ok(Observer {
        name,
        latitude: latitude_deg.to_radians(),
        longitude: -longitude_west_deg.to_radians(),
        altitude,
    })
}

/// Write a QTH file, flipping longitude back to west-positive degrees.
pub fn qth_to_file(path: impl AsRef<Path>, observer: &Observer) -> Result<()> {
    let path = path.as_ref();
    let contents = format!(
        "{}\n {}\n {}\n {}\n",
        observer.name,
        observer.latitude.to_degrees(),
        -observer.longitude.to_degrees(),
        observer.altitude.floor() as i64
    );
    let mut file = fs::File::create(path).map_err(|source| PredictError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    file.write_all(contents.as_bytes())
        .map_err(|source| PredictError::Write {
            path: path.to_path_buf(),
            source,
        })
}

/// Write the QTH file to its user config location, creating the flyby
/// directories when missing.
pub fn qth_write_to_default(paths: &Paths, observer: &Observer) -> Result<()> {
    if let Err(e) = paths.create_user_dirs() {
        debug!("could not create user dirs: {}", e);
    }
    qth_to_file(paths.user_qth_file(), observer)
}

/// Locate the QTH file: user config first, then each system config
/// directory in declared order. Returns the observer and which scope won.
pub fn observer_from_search_paths(paths: &Paths) -> Option<(Observer, QthScope)> {
    if let Ok(observer) = qth_from_file(paths.user_qth_file()) {
        return Some((observer, QthScope::UserHome));
    }
    for candidate in paths.system_qth_files() {
        if let Ok(observer) = qth_from_file(&candidate) {
            return Some((observer, QthScope::SystemWide));
        }
    }
    None
}

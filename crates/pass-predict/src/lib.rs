//! Pass Prediction
//!
//! Wraps the SGP4 propagator behind an observation API and builds the
//! prediction machinery on top of it: AOS/LOS/max-elevation search,
//! pass schedules with visibility classification, solar illumination
//! scans and sun/moon rise passes.
//!
//! All angles are radians and all times are Julian dates (UTC) unless a
//! name says otherwise. Distances are kilometres, velocities km/s.

use thiserror::Error;

mod doppler;
mod elements;
mod julian;
mod moon;
mod observe;
mod observer;
mod passes;
mod schedule;
mod squint;
mod sun;

pub use doppler::{doppler_shift, inverse_doppler_shift, LinkDirection, SPEED_OF_LIGHT};
pub use elements::OrbitalElements;
pub use julian::{datetime_from_julian, floor_to_midnight, julian_from_datetime, JulianDate};
pub use moon::observe_moon;
pub use observe::{observe, Observation};
pub use observer::{
    observer_from_search_paths, qth_from_file, qth_to_file, qth_write_to_default, Observer,
    QthScope,
};
pub use passes::{max_elevation, next_aos, next_los, PassEvent, PassEventKind};
pub use schedule::{
    pass_schedule, solar_illumination, sun_moon_schedule, visible_passes, AstronomicalBody,
    BodyPass, BodyRow, CancelFlag, IlluminationDay, PassSchedule, PredictionImpossible,
    ScheduleRow, VisibilityMark,
};
pub use squint::squint_angle;
pub use sun::{observe_sun, BodyObservation};

/// WGS84 equatorial radius in km.
pub const EARTH_RADIUS_KM: f64 = 6378.137;
/// WGS84 flattening.
pub const EARTH_FLATTENING: f64 = 1.0 / 298.257223563;
/// Earth rotation rate in rad/s.
pub const EARTH_ROTATION_RAD_S: f64 = 7.2921159e-5;

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("invalid TLE: {0}")]
    InvalidTle(String),
    #[error("propagation failed: {0}")]
    PropagationFailed(String),
    #[error("could not read {}: {source}", path.display())]
    Read {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("could not write {}: {source}", path.display())]
    Write {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("malformed QTH file {}", path.display())]
    MalformedQth { path: std::path::PathBuf },
}

pub type Result<T> = std::result::Result<T, PredictError>;

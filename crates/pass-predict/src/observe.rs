//! Observation of a propagated orbit
//!
//! Turns SGP4 state vectors into the full per-satellite observation
//! record: topocentric look angles and range rate, sub-satellite point,
//! illumination status and the bookkeeping fields (phase, revolutions,
//! decay flag).

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::elements::OrbitalElements;
use crate::julian::{gmst, JulianDate};
use crate::observer::Observer;
use crate::sun::{observe_sun, sun_position_eci};
use crate::{EARTH_FLATTENING, EARTH_RADIUS_KM, EARTH_ROTATION_RAD_S};

/// Sun elevation below which the sky is dark enough for a sunlit
/// satellite to be optically visible (nautical twilight).
const VISIBILITY_SUN_ELEVATION: f64 = -0.20944; // -12 degrees

/// Mean solar radius in km, for the eclipse cone test.
const SOLAR_RADIUS_KM: f64 = 696_000.0;

/// Instantaneous observation of one satellite from one ground station.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Observation {
    /// Observation time as a Julian date.
    pub time: JulianDate,
    /// Azimuth in radians, 0 = north, clockwise.
    pub azimuth: f64,
    /// Elevation above the horizon in radians.
    pub elevation: f64,
    /// Slant range in km.
    pub range: f64,
    /// Range rate in km/s; negative while approaching.
    pub range_rate: f64,
    /// Sub-satellite latitude in radians.
    pub latitude: f64,
    /// Sub-satellite longitude in radians, east positive.
    pub longitude: f64,
    /// Height above the ellipsoid in km.
    pub altitude: f64,
    /// Diameter of the coverage footprint in km.
    pub footprint: f64,
    /// Orbital velocity magnitude in km/s.
    pub velocity: f64,
    /// Orbital phase (mean anomaly) in radians.
    pub phase: f64,
    /// Revolution count since launch.
    pub revolutions: u64,
    /// Satellite is in the Earth's shadow.
    pub eclipsed: bool,
    /// Depth of the eclipse cone test in radians; positive when eclipsed.
    pub eclipse_depth: f64,
    /// Satellite is sunlit while the observer sky is dark and the
    /// satellite is above the horizon.
    pub visible: bool,
    /// Drag heuristic says the orbit has re-entered.
    pub decayed: bool,
}

/// Topocentric look angles of an ECI target from an observer.
pub(crate) struct LookAngles {
    pub azimuth: f64,
    pub elevation: f64,
    pub range: f64,
    pub range_rate: f64,
}

/// Observer position and velocity in ECI at `jd`, in km and km/s.
pub(crate) fn observer_position_eci(observer: &Observer, jd: JulianDate) -> (Vector3<f64>, Vector3<f64>) {
    let lat = observer.latitude;
    let lon = observer.longitude;
    let alt_km = observer.altitude / 1000.0;

    // geodetic -> ECEF on the WGS84 ellipsoid
    let e2 = 2.0 * EARTH_FLATTENING - EARTH_FLATTENING * EARTH_FLATTENING;
    let n = EARTH_RADIUS_KM / (1.0 - e2 * lat.sin().powi(2)).sqrt();
    let ecef = Vector3::new(
        (n + alt_km) * lat.cos() * lon.cos(),
        (n + alt_km) * lat.cos() * lon.sin(),
        (n * (1.0 - e2) + alt_km) * lat.sin(),
    );

    // ECEF -> ECI by the GMST rotation
    let theta = gmst(jd);
    let (sin_t, cos_t) = theta.sin_cos();
    let position = Vector3::new(
        cos_t * ecef.x - sin_t * ecef.y,
        sin_t * ecef.x + cos_t * ecef.y,
        ecef.z,
    );

    // station velocity from Earth rotation: omega x r
    let omega = Vector3::new(0.0, 0.0, EARTH_ROTATION_RAD_S);
    let velocity = omega.cross(&position);
    (position, velocity)
}

/// Look angles and range rate of an ECI target.
pub(crate) fn look_angles(
    observer: &Observer,
    jd: JulianDate,
    target_position: &Vector3<f64>,
    target_velocity: &Vector3<f64>,
) -> LookAngles {
    let (obs_position, obs_velocity) = observer_position_eci(observer, jd);
    let range_vec = *target_position - obs_position;
    let range = range_vec.norm();
    let range_rate = range_vec.dot(&(*target_velocity - obs_velocity)) / range;

    // rotate the range vector into the topocentric SEZ frame: the local
    // sidereal time is the observer's inertial longitude
    let lst = gmst(jd) + observer.longitude;
    let (sin_lat, cos_lat) = observer.latitude.sin_cos();
    let (sin_lst, cos_lst) = lst.sin_cos();

    let south = sin_lat * cos_lst * range_vec.x + sin_lat * sin_lst * range_vec.y
        - cos_lat * range_vec.z;
    let east = -sin_lst * range_vec.x + cos_lst * range_vec.y;
    let zenith = cos_lat * cos_lst * range_vec.x + cos_lat * sin_lst * range_vec.y
        + sin_lat * range_vec.z;

    let azimuth = east.atan2(-south).rem_euclid(2.0 * std::f64::consts::PI);
    let elevation = (zenith / range).asin();

    LookAngles {
        azimuth,
        elevation,
        range,
        range_rate,
    }
}

/// Sub-satellite geodetic coordinates and altitude from an ECI position.
fn subsatellite_point(position: &Vector3<f64>, jd: JulianDate) -> (f64, f64, f64) {
    let theta = gmst(jd);
    let r = (position.x * position.x + position.y * position.y).sqrt();
    let longitude = (position.y.atan2(position.x) - theta + std::f64::consts::PI)
        .rem_euclid(2.0 * std::f64::consts::PI)
        - std::f64::consts::PI;

    // iterate the geodetic latitude on the ellipsoid
    let e2 = 2.0 * EARTH_FLATTENING - EARTH_FLATTENING * EARTH_FLATTENING;
    let mut latitude = position.z.atan2(r);
    let mut c = 1.0;
    for _ in 0..4 {
        let sin_lat = latitude.sin();
        c = 1.0 / (1.0 - e2 * sin_lat * sin_lat).sqrt();
        latitude = (position.z + EARTH_RADIUS_KM * c * e2 * sin_lat).atan2(r);
    }
    let altitude = r / latitude.cos() - EARTH_RADIUS_KM * c;
    (latitude, longitude, altitude)
}

/// Eclipse cone test: compares the apparent radii of Earth and Sun as
/// seen from the satellite. Returns (eclipsed, depth).
fn eclipse_status(position: &Vector3<f64>, jd: JulianDate) -> (bool, f64) {
    let sun = sun_position_eci(jd);
    let sd_earth = (EARTH_RADIUS_KM / position.norm()).asin();
    let rho = sun - *position;
    let sd_sun = (SOLAR_RADIUS_KM / rho.norm()).asin();
    let earthward = -(*position);
    let delta = (sun.dot(&earthward) / (sun.norm() * earthward.norm()))
        .clamp(-1.0, 1.0)
        .acos();
    let depth = sd_earth - sd_sun - delta;
    if sd_earth < sd_sun {
        (false, depth)
    } else {
        (depth >= 0.0, depth)
    }
}

/// Eclipse status alone, without the full observation pipeline. `None`
/// when propagation fails (re-entered orbit).
pub(crate) fn satellite_eclipsed(elements: &OrbitalElements, jd: JulianDate) -> Option<bool> {
    let (position, _) = elements.propagate(jd).ok()?;
    Some(eclipse_status(&Vector3::from(position), jd).0)
}

/// Observe one satellite at `jd`. A propagation failure (typically a
/// re-entered orbit) yields a zeroed observation flagged as decayed
/// rather than an error, so callers can treat decay as a classification.
pub fn observe(elements: &OrbitalElements, observer: &Observer, jd: JulianDate) -> Observation {
    let (position, velocity) = match elements.propagate(jd) {
        Ok(state) => state,
        Err(_) => {
            return Observation {
                time: jd,
                azimuth: 0.0,
                elevation: -1.0,
                range: 0.0,
                range_rate: 0.0,
                latitude: 0.0,
                longitude: 0.0,
                altitude: 0.0,
                footprint: 0.0,
                velocity: 0.0,
                phase: 0.0,
                revolutions: 0,
                eclipsed: false,
                eclipse_depth: 0.0,
                visible: false,
                decayed: true,
            }
        }
    };
    let position = Vector3::from(position);
    let velocity_vec = Vector3::from(velocity);

    let angles = look_angles(observer, jd, &position, &velocity_vec);
    let (latitude, longitude, altitude) = subsatellite_point(&position, jd);
    let footprint = 2.0 * EARTH_RADIUS_KM * (EARTH_RADIUS_KM / (EARTH_RADIUS_KM + altitude)).acos();
    let (eclipsed, eclipse_depth) = eclipse_status(&position, jd);

    let sun = observe_sun(observer, jd);
    let visible = angles.elevation >= 0.0 && !eclipsed && sun.elevation < VISIBILITY_SUN_ELEVATION;

    Observation {
        time: jd,
        azimuth: angles.azimuth,
        elevation: angles.elevation,
        range: angles.range,
        range_rate: angles.range_rate,
        latitude,
        longitude,
        altitude,
        footprint,
        velocity: velocity_vec.norm(),
        phase: elements.mean_anomaly(jd),
        revolutions: elements.revolutions(jd),
        eclipsed,
        eclipse_depth,
        visible,
        decayed: elements.is_decayed(jd),
    }
}

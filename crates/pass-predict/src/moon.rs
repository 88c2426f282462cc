//! Low-precision lunar ephemeris
//!
//! Truncated ELP-style series, good to a few tenths of a degree. Used for
//! moon pass schedules only, so that accuracy is ample.

use nalgebra::Vector3;

use crate::julian::JulianDate;
use crate::observe::look_angles;
use crate::observer::Observer;
use crate::sun::BodyObservation;

/// Geocentric equatorial position of the Moon in km.
fn moon_position_eci(jd: JulianDate) -> Vector3<f64> {
    let n = jd - 2451545.0;

    // mean elements in degrees
    let mean_longitude = (218.316 + 13.176396 * n).rem_euclid(360.0);
    let mean_anomaly = (134.963 + 13.064993 * n).rem_euclid(360.0).to_radians();
    let argument_of_latitude = (93.272 + 13.229350 * n).rem_euclid(360.0).to_radians();

    let ecliptic_longitude = (mean_longitude + 6.289 * mean_anomaly.sin()).to_radians();
    let ecliptic_latitude = (5.128 * argument_of_latitude.sin()).to_radians();
    let distance = 385_001.0 - 20_905.0 * mean_anomaly.cos();

    let obliquity = (23.439 - 4.0e-7 * n).to_radians();
    let (sin_lat, cos_lat) = ecliptic_latitude.sin_cos();
    let (sin_lon, cos_lon) = ecliptic_longitude.sin_cos();
    let (sin_obl, cos_obl) = obliquity.sin_cos();

    Vector3::new(
        distance * cos_lat * cos_lon,
        distance * (cos_obl * cos_lat * sin_lon - sin_obl * sin_lat),
        distance * (sin_obl * cos_lat * sin_lon + cos_obl * sin_lat),
    )
}

/// Observe the Moon from the ground station.
pub fn observe_moon(observer: &Observer, jd: JulianDate) -> BodyObservation {
    let position = moon_position_eci(jd);
    let one_second = 1.0 / 86400.0;
    let velocity = moon_position_eci(jd + one_second) - position;

    let angles = look_angles(observer, jd, &position, &velocity);
    BodyObservation {
        time: jd,
        azimuth: angles.azimuth,
        elevation: angles.elevation,
        range: angles.range,
        range_rate: angles.range_rate,
    }
}

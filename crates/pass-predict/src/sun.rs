//! Low-precision solar ephemeris
//!
//! Good to a few hundredths of a degree over decades, which is plenty for
//! eclipse determination, visibility classification and sun pass
//! schedules.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::julian::JulianDate;
use crate::observe::look_angles;
use crate::observer::Observer;

const AU_KM: f64 = 149_597_870.7;

/// Observation of an astronomical body (sun or moon) from the ground
/// station. Same conventions as a satellite observation: radians, km,
/// km/s.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BodyObservation {
    pub time: JulianDate,
    pub azimuth: f64,
    pub elevation: f64,
    pub range: f64,
    pub range_rate: f64,
}

/// Geocentric equatorial position of the Sun in km.
pub(crate) fn sun_position_eci(jd: JulianDate) -> Vector3<f64> {
    let n = jd - 2451545.0;
    let mean_longitude = (280.460 + 0.9856474 * n).rem_euclid(360.0);
    let mean_anomaly = (357.528 + 0.9856003 * n).rem_euclid(360.0).to_radians();
    let ecliptic_longitude = (mean_longitude
        + 1.915 * mean_anomaly.sin()
        + 0.020 * (2.0 * mean_anomaly).sin())
    .to_radians();
    let obliquity = (23.439 - 4.0e-7 * n).to_radians();
    let distance =
        (1.00014 - 0.01671 * mean_anomaly.cos() - 0.00014 * (2.0 * mean_anomaly).cos()) * AU_KM;

    Vector3::new(
        distance * ecliptic_longitude.cos(),
        distance * obliquity.cos() * ecliptic_longitude.sin(),
        distance * obliquity.sin() * ecliptic_longitude.sin(),
    )
}

/// Observe the Sun from the ground station.
pub fn observe_sun(observer: &Observer, jd: JulianDate) -> BodyObservation {
    let position = sun_position_eci(jd);
    // apparent velocity in km/s by finite difference over one second
    let one_second = 1.0 / 86400.0;
    let velocity = sun_position_eci(jd + one_second) - position;

    let angles = look_angles(observer, jd, &position, &velocity);
    BodyObservation {
        time: jd,
        azimuth: angles.azimuth,
        elevation: angles.elevation,
        range: angles.range,
        range_rate: angles.range_rate,
    }
}

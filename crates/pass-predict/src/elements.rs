//! Orbital elements
//!
//! Parsed TLE plus the raw fields the prediction layer classifies on.
//! Propagation itself is delegated to the sgp4 crate.

use crate::julian::{julian_from_naive, JulianDate};
use crate::{PredictError, Result, EARTH_RADIUS_KM};
use tle_db::TleEntry;

/// Mean motion of a geostationary orbit in revolutions per day.
const GEOSTATIONARY_MEAN_MOTION: f64 = 1.0027;

/// One satellite's orbital elements, ready for propagation.
pub struct OrbitalElements {
    pub name: String,
    pub satellite_number: u32,
    pub(crate) elements: sgp4::Elements,
    /// Epoch as a Julian date.
    pub epoch: JulianDate,
    /// Mean motion in revolutions per day.
    pub mean_motion: f64,
    pub eccentricity: f64,
    /// Inclination in degrees, as carried in the TLE.
    pub inclination_deg: f64,
    /// Right ascension of the ascending node in degrees.
    pub right_ascension_deg: f64,
    /// Argument of perigee in degrees.
    pub argument_of_perigee_deg: f64,
    /// First derivative of mean motion from line 1 (rev/day^2 over two).
    pub derivative_mean_motion: f64,
    /// Revolution number at epoch from line 2.
    pub revolution_number: u64,
}

impl std::fmt::Debug for OrbitalElements {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrbitalElements")
            .field("name", &self.name)
            .field("satellite_number", &self.satellite_number)
            .field("epoch", &self.epoch)
            .field("mean_motion", &self.mean_motion)
            .field("eccentricity", &self.eccentricity)
            .field("inclination_deg", &self.inclination_deg)
            .field("right_ascension_deg", &self.right_ascension_deg)
            .field("argument_of_perigee_deg", &self.argument_of_perigee_deg)
            .field("derivative_mean_motion", &self.derivative_mean_motion)
            .field("revolution_number", &self.revolution_number)
            .finish()
    }
}

impl OrbitalElements {
    /// Parse a NORAD element set. The lines are expected to have passed
    /// the database validator already; parse failures still surface as
    /// errors rather than panics.
    pub fn from_lines(name: &str, line1: &str, line2: &str) -> Result<Self> {
        let elements = sgp4::Elements::from_tle(
            Some(name.to_string()),
            line1.as_bytes(),
            line2.as_bytes(),
        )
        .map_err(|e| PredictError::InvalidTle(format!("{:?}", e)))?;

        let derivative_mean_motion: f64 = line1
            .get(33..43)
            .map(|s| s.trim().parse().unwrap_or(0.0))
            .unwrap_or(0.0);
        let revolution_number: u64 = line2
            .get(63..68)
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);

        Ok(Self {
            name: name.to_string(),
            satellite_number: elements.norad_id as u32,
            epoch: julian_from_naive(elements.datetime),
            mean_motion: elements.mean_motion,
            eccentricity: elements.eccentricity,
            inclination_deg: elements.inclination,
            right_ascension_deg: elements.right_ascension,
            argument_of_perigee_deg: elements.argument_of_perigee,
            derivative_mean_motion,
            revolution_number,
            elements,
        })
    }

    pub fn from_entry(entry: &TleEntry) -> Result<Self> {
        Self::from_lines(&entry.name, &entry.line1, &entry.line2)
    }

    /// Propagate to `at`, returning TEME position and velocity in km and
    /// km/s.
    pub(crate) fn propagate(&self, at: JulianDate) -> Result<([f64; 3], [f64; 3])> {
        let constants = sgp4::Constants::from_elements(&self.elements)
            .map_err(|e| PredictError::PropagationFailed(format!("{:?}", e)))?;
        let minutes_since_epoch = (at - self.epoch) * 24.0 * 60.0;
        let prediction = constants
            .propagate(minutes_since_epoch)
            .map_err(|e| PredictError::PropagationFailed(format!("{:?}", e)))?;
        Ok((prediction.position, prediction.velocity))
    }

    /// True for orbits parked at the geostationary mean motion.
    pub fn is_geostationary(&self) -> bool {
        (self.mean_motion - GEOSTATIONARY_MEAN_MOTION).abs() < 0.0002
    }

    /// Whether the satellite can ever rise above the horizon of an
    /// observer at `observer_latitude` (radians). Compares the coverage
    /// circle at apogee against the observer's latitude.
    pub fn aos_happens(&self, observer_latitude: f64) -> bool {
        if self.mean_motion == 0.0 {
            return false;
        }
        let mut lin = self.inclination_deg;
        if lin >= 90.0 {
            lin = 180.0 - lin;
        }
        let sma = 331.25 * ((1440.0 / self.mean_motion).ln() * (2.0 / 3.0)).exp();
        let apogee = sma * (1.0 + self.eccentricity) - EARTH_RADIUS_KM;
        (EARTH_RADIUS_KM / (apogee + EARTH_RADIUS_KM)).acos() + lin.to_radians()
            > observer_latitude.abs()
    }

    /// Drag-based re-entry heuristic: projects the epoch forward by the
    /// mean-motion margin over the drag term and reports whether the
    /// satellite is past its expected lifetime at `at`.
    pub fn is_decayed(&self, at: JulianDate) -> bool {
        if self.derivative_mean_motion == 0.0 {
            return false;
        }
        let lifetime_days =
            (16.666666 - self.mean_motion) / (10.0 * self.derivative_mean_motion.abs());
        self.epoch + lifetime_days < at
    }

    /// Mean anomaly at `at` in radians, normalized to [0, 2π).
    pub fn mean_anomaly(&self, at: JulianDate) -> f64 {
        let two_pi = 2.0 * std::f64::consts::PI;
        let m0 = self.elements.mean_anomaly.to_radians();
        (m0 + two_pi * self.mean_motion * (at - self.epoch)).rem_euclid(two_pi)
    }

    /// Revolution count at `at`.
    pub fn revolutions(&self, at: JulianDate) -> u64 {
        let elapsed = (self.mean_motion * (at - self.epoch)).max(0.0);
        self.revolution_number + elapsed.floor() as u64
    }
}

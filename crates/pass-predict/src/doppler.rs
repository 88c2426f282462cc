//! Doppler shift helpers
//!
//! Sign convention: an approaching satellite (negative range rate) raises
//! the observed downlink frequency; the uplink correction is inverted so
//! the satellite receives on center.

use serde::{Deserialize, Serialize};

/// Speed of light in m/s.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Which leg of the link a frequency belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkDirection {
    Uplink,
    Downlink,
}

/// Doppler shift of `frequency` for a satellite with the given range rate
/// in km/s. Units of the result follow the input frequency. Assumes the
/// range rate is far below the speed of light.
pub fn doppler_shift(range_rate_km_s: f64, frequency: f64) -> f64 {
    let range_rate_m_s = range_rate_km_s * 1000.0;
    -frequency * range_rate_m_s / SPEED_OF_LIGHT
}

/// Recover the emitted center frequency from an observed doppler-shifted
/// frequency, e.g. when reading the dial back from the rig.
pub fn inverse_doppler_shift(
    direction: LinkDirection,
    range_rate_km_s: f64,
    shifted_frequency: f64,
) -> f64 {
    let sign = match direction {
        LinkDirection::Downlink => 1.0,
        LinkDirection::Uplink => -1.0,
    };
    shifted_frequency / (1.0 + sign * doppler_shift(range_rate_km_s, 1.0))
}

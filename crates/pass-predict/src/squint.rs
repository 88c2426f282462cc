//! Squint angle
//!
//! Angle between a satellite's antenna boresight and the line of sight to
//! the ground station. The boresight is given by the Bahn attitude
//! (alat, alon) in the orbit plane frame, rotated into inertial
//! coordinates with the TLE mean orientation elements.

use nalgebra::Vector3;

use crate::elements::OrbitalElements;
use crate::julian::JulianDate;
use crate::observe::observer_position_eci;
use crate::observer::Observer;

/// Squint angle in radians at `at`, or `None` when propagation fails.
/// `alat`/`alon` are the attitude latitude/longitude in radians.
pub fn squint_angle(
    elements: &OrbitalElements,
    observer: &Observer,
    at: JulianDate,
    alat: f64,
    alon: f64,
) -> Option<f64> {
    let (sat_position, _) = elements.propagate(at).ok()?;
    let sat_position = Vector3::from(sat_position);

    // boresight in the perifocal frame from the Bahn attitude
    let argument_of_perigee = elements.argument_of_perigee_deg.to_radians();
    let inclination = elements.inclination_deg.to_radians();
    let right_ascension = elements.right_ascension_deg.to_radians();

    let bx = alat.cos() * (alon + argument_of_perigee).cos();
    let by = alat.cos() * (alon + argument_of_perigee).sin();
    let bz = alat.sin();

    // rotate through inclination, then the ascending node, into ECI
    let cx = bx;
    let cy = by * inclination.cos() - bz * inclination.sin();
    let cz = by * inclination.sin() + bz * inclination.cos();
    let antenna = Vector3::new(
        cx * right_ascension.cos() - cy * right_ascension.sin(),
        cx * right_ascension.sin() + cy * right_ascension.cos(),
        cz,
    );

    let (observer_position, _) = observer_position_eci(observer, at);
    let range_vec = sat_position - observer_position;
    let range = range_vec.norm();
    if range == 0.0 {
        return None;
    }

    let cos_squint = (-antenna.dot(&range_vec) / range).clamp(-1.0, 1.0);
    Some(cos_squint.acos())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISS_LINE1: &str =
        "1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927";
    const ISS_LINE2: &str =
        "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537";

    #[test]
    fn test_squint_is_an_angle() {
        let elements = OrbitalElements::from_lines("ISS (ZARYA)", ISS_LINE1, ISS_LINE2).unwrap();
        let observer = Observer::new("MID", 45.0_f64.to_radians(), 10.0_f64.to_radians(), 100.0);

        let squint = squint_angle(&elements, &observer, elements.epoch + 0.1, 0.2, -0.5).unwrap();
        assert!((0.0..=std::f64::consts::PI).contains(&squint));

        // flipping the boresight mirrors the squint angle
        let flipped = squint_angle(
            &elements,
            &observer,
            elements.epoch + 0.1,
            -0.2,
            -0.5 + std::f64::consts::PI,
        )
        .unwrap();
        assert!((squint + flipped - std::f64::consts::PI).abs() < 1e-6);
    }
}

//! AOS/LOS/max-elevation search
//!
//! Iterative horizon-crossing search: a coarse sweep proportional to the
//! elevation error brings the time close to the crossing, then a damped
//! refinement converges on |elevation| < 0.03 degrees. Step factors are
//! tuned for LEO and scale with sqrt(altitude), so high orbits take
//! proportionally longer strides.

use serde::{Deserialize, Serialize};

use crate::elements::OrbitalElements;
use crate::julian::JulianDate;
use crate::observe::{observe, Observation};
use crate::observer::Observer;

/// Convergence threshold on elevation, in degrees.
const HORIZON_THRESHOLD_DEG: f64 = 0.03;

/// Bail-out for the iterative searches.
const MAX_ITERATIONS: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassEventKind {
    Aos,
    Los,
    MaxElevation,
}

/// One point of a predicted pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PassEvent {
    pub kind: PassEventKind,
    pub time: JulianDate,
    /// Azimuth in radians at the event.
    pub azimuth: f64,
    /// Elevation in radians at the event.
    pub elevation: f64,
}

impl PassEvent {
    fn at(kind: PassEventKind, observation: &Observation) -> Self {
        Self {
            kind,
            time: observation.time,
            azimuth: observation.azimuth,
            elevation: observation.elevation,
        }
    }
}

fn can_predict(elements: &OrbitalElements, observer: &Observer, at: JulianDate) -> bool {
    elements.aos_happens(observer.latitude)
        && !elements.is_geostationary()
        && !elements.is_decayed(at)
}

/// Time of the next acquisition of signal at or after `start`. `None` for
/// geostationary, decayed or never-rising satellites.
pub fn next_aos(
    observer: &Observer,
    elements: &OrbitalElements,
    start: JulianDate,
) -> Option<JulianDate> {
    if !can_predict(elements, observer, start) {
        return None;
    }

    let mut time = start;
    let mut obs = observe(elements, observer, time);

    // mid-pass: skip past the current pass before searching
    if obs.elevation >= 0.0 {
        time = next_los(observer, elements, time)? + 0.014;
        obs = observe(elements, observer, time);
    }

    // coarse sweep until the satellite is within a degree of the horizon
    let mut iterations = 0;
    while obs.elevation.to_degrees() < -1.0 {
        time -= 0.00035 * (obs.elevation.to_degrees() * ((obs.altitude / 8400.0) + 0.46) - 2.0);
        obs = observe(elements, observer, time);
        iterations += 1;
        if iterations > MAX_ITERATIONS || obs.decayed {
            return None;
        }
    }

    // refine onto the horizon crossing
    while obs.elevation.to_degrees().abs() > HORIZON_THRESHOLD_DEG {
        time -= obs.elevation.to_degrees() * obs.altitude.sqrt() / 530_000.0;
        obs = observe(elements, observer, time);
        iterations += 1;
        if iterations > MAX_ITERATIONS || obs.decayed {
            return None;
        }
    }

    Some(time)
}

/// Time of the next loss of signal after `start`. When the satellite is
/// below the horizon at `start` this is the LOS of the next pass.
pub fn next_los(
    observer: &Observer,
    elements: &OrbitalElements,
    start: JulianDate,
) -> Option<JulianDate> {
    if !can_predict(elements, observer, start) {
        return None;
    }

    let mut time = start;
    let mut obs = observe(elements, observer, time);

    if obs.elevation < 0.0 {
        time = next_aos(observer, elements, time)? + 0.001;
        obs = observe(elements, observer, time);
    }

    // coarse sweep past the descending horizon crossing
    let mut iterations = 0;
    while obs.elevation >= 0.0 {
        time += ((obs.elevation.to_degrees() - 1.0).to_radians()).cos() * obs.altitude.sqrt()
            / 25_000.0;
        obs = observe(elements, observer, time);
        iterations += 1;
        if iterations > MAX_ITERATIONS || obs.decayed {
            return None;
        }
    }

    // refine onto the crossing
    while obs.elevation.to_degrees().abs() > HORIZON_THRESHOLD_DEG {
        time += obs.elevation.to_degrees() * obs.altitude.sqrt() / 502_500.0;
        obs = observe(elements, observer, time);
        iterations += 1;
        if iterations > MAX_ITERATIONS || obs.decayed {
            return None;
        }
    }

    Some(time)
}

/// AOS, max-elevation and LOS events of the current or next pass at
/// `start`. The three times are coherent: aos <= tca <= los.
pub fn max_elevation(
    observer: &Observer,
    elements: &OrbitalElements,
    start: JulianDate,
) -> Option<(PassEvent, PassEvent, PassEvent)> {
    if !can_predict(elements, observer, start) {
        return None;
    }

    let initial = observe(elements, observer, start);
    let aos_time = if initial.elevation >= 0.0 {
        // already mid-pass; treat the request time as the lower bound
        start
    } else {
        next_aos(observer, elements, start)?
    };
    let los_time = next_los(observer, elements, aos_time + 0.001)?;

    // golden-section maximization of elevation over the pass
    let phi = (5.0_f64.sqrt() - 1.0) / 2.0;
    let mut lo = aos_time;
    let mut hi = los_time;
    let mut a = hi - phi * (hi - lo);
    let mut b = lo + phi * (hi - lo);
    let mut el_a = observe(elements, observer, a).elevation;
    let mut el_b = observe(elements, observer, b).elevation;
    for _ in 0..60 {
        if el_a > el_b {
            hi = b;
            b = a;
            el_b = el_a;
            a = hi - phi * (hi - lo);
            el_a = observe(elements, observer, a).elevation;
        } else {
            lo = a;
            a = b;
            el_a = el_b;
            b = lo + phi * (hi - lo);
            el_b = observe(elements, observer, b).elevation;
        }
    }
    let tca_time = (lo + hi) / 2.0;

    let aos = observe(elements, observer, aos_time);
    let tca = observe(elements, observer, tca_time);
    let los = observe(elements, observer, los_time);
    Some((
        PassEvent::at(PassEventKind::Aos, &aos),
        PassEvent::at(PassEventKind::MaxElevation, &tca),
        PassEvent::at(PassEventKind::Los, &los),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISS_LINE1: &str =
        "1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927";
    const ISS_LINE2: &str =
        "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537";

    fn iss() -> OrbitalElements {
        OrbitalElements::from_lines("ISS (ZARYA)", ISS_LINE1, ISS_LINE2).unwrap()
    }

    /// ISS element set epoched 2023-01-04, assembled from representative
    /// mean elements of that week with recomputed checksums.
    fn iss_2023() -> OrbitalElements {
        let line1 = "1 25544U 98067A   23004.87600000  .00016717  00000-0  30777-3 0  999";
        let line2 = "2 25544  51.6423  57.6371 0004724 323.1979 145.8234 15.4981406137674";
        let line1 = format!("{}{}", line1, tle_db::line_checksum(line1));
        let line2 = format!("{}{}", line2, tle_db::line_checksum(line2));
        OrbitalElements::from_lines("ISS (ZARYA)", &line1, &line2).unwrap()
    }

    fn trondheim() -> Observer {
        Observer::new(
            "LA1K",
            63.422_f64.to_radians(),
            10.39_f64.to_radians(),
            100.0,
        )
    }

    fn mid_lat() -> Observer {
        Observer::new("MID", 45.0_f64.to_radians(), 10.0_f64.to_radians(), 100.0)
    }

    #[test]
    fn test_aos_prediction_smoke() {
        let elements = iss_2023();
        let observer = trondheim();
        let start = elements.epoch + 0.5;

        let aos = next_aos(&observer, &elements, start).expect("AOS must be predictable");
        assert!(aos >= start - 0.001);
        // a pass must show up within the next day
        assert!(aos - start < 1.0, "AOS {:.3} days away", aos - start);

        let obs = observe(&elements, &observer, aos);
        assert!(obs.elevation.to_degrees().abs() < 0.5);

        // the pass around that AOS is coherent and minutes long, not hours
        let (aos_event, tca, los) = max_elevation(&observer, &elements, aos).unwrap();
        assert!(aos_event.time <= tca.time && tca.time <= los.time);
        let duration_min = (los.time - aos_event.time) * 24.0 * 60.0;
        assert!(
            duration_min > 0.1 && duration_min < 25.0,
            "duration {} min",
            duration_min
        );
    }

    #[test]
    fn test_pass_monotonicity() {
        let elements = iss();
        let observer = mid_lat();
        let start = elements.epoch + 0.5;

        let (aos, tca, los) = max_elevation(&observer, &elements, start).unwrap();
        assert!(aos.time <= tca.time && tca.time <= los.time);
        assert!(tca.elevation >= aos.elevation);
        assert!(tca.elevation >= los.elevation);

        // pass length is minutes, not hours
        let duration_min = (los.time - aos.time) * 24.0 * 60.0;
        assert!(
            duration_min > 1.0 && duration_min < 20.0,
            "duration {} min",
            duration_min
        );
    }

    #[test]
    fn test_a_good_pass_exists_within_a_day() {
        let elements = iss();
        let observer = mid_lat();

        let mut time = elements.epoch + 0.1;
        let mut best = f64::MIN;
        for _ in 0..20 {
            let Some((aos, tca, _los)) = max_elevation(&observer, &elements, time) else {
                break;
            };
            best = best.max(tca.elevation.to_degrees());
            time = aos.time.max(time) + 0.05;
            if time > elements.epoch + 1.2 {
                break;
            }
        }
        assert!(best >= 10.0, "best elevation over a day: {:.1} deg", best);
    }

    #[test]
    fn test_los_follows_aos() {
        let elements = iss();
        let observer = mid_lat();
        let start = elements.epoch + 0.5;

        let aos = next_aos(&observer, &elements, start).unwrap();
        let los = next_los(&observer, &elements, aos + 0.001).unwrap();
        assert!(los > aos);

        // mid-pass the satellite is above the horizon
        let mid = observe(&elements, &observer, (aos + los) / 2.0);
        assert!(mid.elevation > 0.0);
    }

    #[test]
    fn test_geostationary_has_no_events() {
        // same structure as the ISS set but a geostationary mean motion
        let line1 = "1 26038U 00011A   23004.50000000  .00000100  00000-0  00000-0 0  999";
        let line2 = "2 26038   0.0100  95.0000 0001000 130.0000 325.0000  1.0027000012345";
        let line1 = format!("{}{}", line1, tle_db::line_checksum(line1));
        let line2 = format!("{}{}", line2, tle_db::line_checksum(line2));
        let elements = OrbitalElements::from_lines("GEO", &line1, &line2).unwrap();
        assert!(elements.is_geostationary());

        let observer = mid_lat();
        assert!(next_aos(&observer, &elements, elements.epoch).is_none());
        assert!(next_los(&observer, &elements, elements.epoch).is_none());
        assert!(max_elevation(&observer, &elements, elements.epoch).is_none());
    }
}

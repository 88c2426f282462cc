//! Pass schedules and long-running scans
//!
//! Row-by-row sampling of predicted passes for listings, the visible-pass
//! filter, day-by-day solar illumination scans and sun/moon rise passes.
//! Everything here can run for a long time, so the loops poll a shared
//! cancel flag between passes and days.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::elements::OrbitalElements;
use crate::julian::{floor_to_midnight, JulianDate};
use crate::moon::observe_moon;
use crate::observe::{observe, satellite_eclipsed};
use crate::observer::Observer;
use crate::passes::{next_aos, next_los};
use crate::sun::{observe_sun, BodyObservation};

/// Bail-out for the body rise/set refinement loops.
const MAX_ITERATIONS: usize = 100_000;

/// Cooperative cancellation latch, polled between pass iterations.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Why a pass listing could not be produced at all.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionImpossible {
    #[error("satellite never reaches AOS from this ground station")]
    NeverRises,
    #[error("orbit is geostationary")]
    Geostationary,
    #[error("orbit has decayed")]
    Decayed,
}

/// Illumination state of a schedule row. The symbols match the classic
/// pass listing notation: '+' optically visible, '*' in sunlight, ' ' in
/// eclipse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisibilityMark {
    Visible,
    InSunlight,
    InEclipse,
}

impl VisibilityMark {
    pub fn symbol(self) -> char {
        match self {
            VisibilityMark::Visible => '+',
            VisibilityMark::InSunlight => '*',
            VisibilityMark::InEclipse => ' ',
        }
    }
}

/// One sampled point of a pass listing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScheduleRow {
    pub time: JulianDate,
    /// Azimuth in radians.
    pub azimuth: f64,
    /// Elevation in radians.
    pub elevation: f64,
    /// Orbital phase in radians.
    pub phase: f64,
    /// Sub-satellite latitude in radians.
    pub latitude: f64,
    /// Sub-satellite longitude in radians.
    pub longitude: f64,
    /// Slant range in km.
    pub range: f64,
    pub revolutions: u64,
    pub mark: VisibilityMark,
}

/// One predicted pass, AOS to LOS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassSchedule {
    pub aos: JulianDate,
    pub los: JulianDate,
    pub rows: Vec<ScheduleRow>,
}

impl PassSchedule {
    /// A pass is worth flagging as visual when enough of it is sunlit
    /// against a dark sky: at least three visible samples, or two visible
    /// samples backed by two sunlit ones.
    pub fn is_visible(&self) -> bool {
        let plus = self
            .rows
            .iter()
            .filter(|r| r.mark == VisibilityMark::Visible)
            .count();
        let asterisk = self
            .rows
            .iter()
            .filter(|r| r.mark == VisibilityMark::InSunlight)
            .count();
        plus >= 3 || (plus >= 2 && asterisk >= 2)
    }
}

fn classify(observation: &crate::Observation) -> VisibilityMark {
    if observation.visible {
        VisibilityMark::Visible
    } else if !observation.eclipsed {
        VisibilityMark::InSunlight
    } else {
        VisibilityMark::InEclipse
    }
}

fn row_from(observation: &crate::Observation) -> ScheduleRow {
    ScheduleRow {
        time: observation.time,
        azimuth: observation.azimuth,
        elevation: observation.elevation,
        phase: observation.phase,
        latitude: observation.latitude,
        longitude: observation.longitude,
        range: observation.range,
        revolutions: observation.revolutions,
        mark: classify(observation),
    }
}

/// Sample successive passes starting at `start`. The step adapts to the
/// geometry, sampling densely near the horizon and coarsely overhead, and
/// the last row of each pass is pinned to the exact LOS time so listings
/// end on the horizon.
pub fn pass_schedule(
    observer: &Observer,
    elements: &OrbitalElements,
    start: JulianDate,
    max_passes: usize,
    cancel: &CancelFlag,
) -> std::result::Result<Vec<PassSchedule>, PredictionImpossible> {
    if elements.is_geostationary() {
        return Err(PredictionImpossible::Geostationary);
    }
    if elements.is_decayed(start) {
        return Err(PredictionImpossible::Decayed);
    }
    if !elements.aos_happens(observer.latitude) {
        return Err(PredictionImpossible::NeverRises);
    }

    let mut passes = Vec::new();
    let mut current = start;

    while passes.len() < max_passes && !cancel.is_cancelled() {
        let Some(aos) = next_aos(observer, elements, current) else {
            break;
        };
        let Some(los) = next_los(observer, elements, aos) else {
            break;
        };
        current = aos;

        let mut obs = observe(elements, observer, current);
        let mut rows = Vec::new();
        let mut pinned_endpoint = false;
        let mut last_elevation_deg: i32;

        loop {
            rows.push(row_from(&obs));
            last_elevation_deg = obs.elevation.to_degrees() as i32;

            // adaptive step: dense near the horizon, coarse overhead
            current +=
                ((obs.elevation.to_degrees() - 1.0).to_radians()).cos() * obs.altitude.sqrt()
                    / 25_000.0;
            obs = observe(elements, observer, current);

            // pin the final sample to the exact LOS time
            if last_elevation_deg != 0 && obs.elevation < 0.0 && !pinned_endpoint {
                pinned_endpoint = true;
                current = los;
                obs = observe(elements, observer, current);
            }

            if !(obs.elevation >= 0.0 || current <= los) {
                break;
            }
        }

        passes.push(PassSchedule { aos, los, rows });
        if obs.decayed {
            break;
        }
    }

    debug!("sampled {} passes for {}", passes.len(), elements.name);
    Ok(passes)
}

/// Like [`pass_schedule`], keeping only passes that could be seen by eye.
pub fn visible_passes(
    observer: &Observer,
    elements: &OrbitalElements,
    start: JulianDate,
    max_passes: usize,
    cancel: &CancelFlag,
) -> std::result::Result<Vec<PassSchedule>, PredictionImpossible> {
    let passes = pass_schedule(observer, elements, start, max_passes, cancel)?;
    Ok(passes.into_iter().filter(PassSchedule::is_visible).collect())
}

/// One day of a solar illumination scan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IlluminationDay {
    /// Midnight starting the scanned day.
    pub day: JulianDate,
    pub sunlit_minutes: u32,
    pub sunlit_percent: f64,
}

/// Count sunlit minutes per day, one sample per minute for 1440 samples
/// starting at the midnight preceding `start`.
pub fn solar_illumination(
    elements: &OrbitalElements,
    start: JulianDate,
    num_days: usize,
    cancel: &CancelFlag,
) -> Vec<IlluminationDay> {
    let first_day = floor_to_midnight(start);
    let one_minute = 1.0 / 1440.0;
    let mut days = Vec::new();

    for day_index in 0..num_days {
        if cancel.is_cancelled() {
            break;
        }
        let day_start = first_day + day_index as f64;
        if elements.is_decayed(day_start) {
            break;
        }

        let mut eclipsed_minutes = 0u32;
        for minute in 0..1440 {
            let jd = day_start + f64::from(minute) * one_minute;
            if satellite_eclipsed(elements, jd).unwrap_or(false) {
                eclipsed_minutes += 1;
            }
        }
        let sunlit_minutes = 1440 - eclipsed_minutes;
        days.push(IlluminationDay {
            day: day_start,
            sunlit_minutes,
            sunlit_percent: 100.0 * f64::from(sunlit_minutes) / 1440.0,
        });
    }
    days
}

/// Astronomical bodies with rise/set schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AstronomicalBody {
    Sun,
    Moon,
}

fn observe_body(body: AstronomicalBody, observer: &Observer, jd: JulianDate) -> BodyObservation {
    match body {
        AstronomicalBody::Sun => observe_sun(observer, jd),
        AstronomicalBody::Moon => observe_moon(observer, jd),
    }
}

/// One sampled point of a sun/moon pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BodyRow {
    pub time: JulianDate,
    pub azimuth: f64,
    pub elevation: f64,
    pub range: f64,
    pub range_rate: f64,
}

/// One sun/moon pass from rise to set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyPass {
    pub rise: JulianDate,
    pub rows: Vec<BodyRow>,
}

fn body_row(obs: &BodyObservation) -> BodyRow {
    BodyRow {
        time: obs.time,
        azimuth: obs.azimuth,
        elevation: obs.elevation,
        range: obs.range,
        range_rate: obs.range_rate,
    }
}

/// Sample sun or moon passes. Rise detection refines onto the horizon
/// with a damped Newton step; the pass is then sampled until the body
/// approaches the horizon again, and the set point is pinned near zero
/// elevation.
pub fn sun_moon_schedule(
    body: AstronomicalBody,
    observer: &Observer,
    start: JulianDate,
    max_passes: usize,
    cancel: &CancelFlag,
) -> Vec<BodyPass> {
    let mut passes = Vec::new();
    let mut time = start;

    'outer: while passes.len() < max_passes && !cancel.is_cancelled() {
        // find the rise: Newton-like step towards the horizon crossing
        let mut obs = observe_body(body, observer, time);
        let mut iterations = 0;
        while obs.elevation.to_degrees().abs() >= 0.03 {
            time -= 0.004 * obs.elevation.to_degrees();
            obs = observe_body(body, observer, time);
            iterations += 1;
            if iterations > MAX_ITERATIONS {
                break 'outer;
            }
        }
        let rise = time;

        // sample the pass until the body comes back down near the horizon
        let mut rows = Vec::new();
        let mut last_elevation_deg;
        loop {
            rows.push(body_row(&obs));
            last_elevation_deg = obs.elevation.to_degrees().round() as i32;

            time += 0.04 * ((obs.elevation.to_degrees() + 0.5).to_radians()).cos();
            obs = observe_body(body, observer, time);

            if obs.elevation.to_degrees().round() as i32 <= 3 {
                break;
            }
            iterations += 1;
            if iterations > MAX_ITERATIONS {
                break 'outer;
            }
        }

        // pin the set point
        if last_elevation_deg != 0 {
            loop {
                time += 0.004 * ((obs.elevation.to_degrees() + 0.5).to_radians()).sin();
                obs = observe_body(body, observer, time);
                if obs.elevation.to_degrees().round() as i32 <= 0 {
                    break;
                }
                iterations += 1;
                if iterations > MAX_ITERATIONS {
                    break 'outer;
                }
            }
            rows.push(body_row(&obs));
        }

        passes.push(BodyPass { rise, rows });
        time += 0.4;
    }
    passes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::julian::julian_from_datetime;
    use chrono::{TimeZone, Utc};

    const ISS_LINE1: &str =
        "1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927";
    const ISS_LINE2: &str =
        "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537";

    fn iss() -> OrbitalElements {
        OrbitalElements::from_lines("ISS (ZARYA)", ISS_LINE1, ISS_LINE2).unwrap()
    }

    fn mid_lat() -> Observer {
        Observer::new("MID", 45.0_f64.to_radians(), 10.0_f64.to_radians(), 100.0)
    }

    fn fixture_pass(marks: &[VisibilityMark]) -> PassSchedule {
        PassSchedule {
            aos: 0.0,
            los: 1.0,
            rows: marks
                .iter()
                .map(|&mark| ScheduleRow {
                    time: 0.0,
                    azimuth: 0.0,
                    elevation: 0.0,
                    phase: 0.0,
                    latitude: 0.0,
                    longitude: 0.0,
                    range: 0.0,
                    revolutions: 0,
                    mark,
                })
                .collect(),
        }
    }

    #[test]
    fn test_pass_rows_are_coherent() {
        let elements = iss();
        let observer = mid_lat();
        let cancel = CancelFlag::new();

        let passes =
            pass_schedule(&observer, &elements, elements.epoch + 0.5, 2, &cancel).unwrap();
        assert!(!passes.is_empty());

        for pass in &passes {
            assert!(pass.rows.len() >= 2, "pass with {} rows", pass.rows.len());
            assert!(pass.aos < pass.los);

            // rows progress monotonically in time
            for pair in pass.rows.windows(2) {
                assert!(pair[1].time > pair[0].time);
            }

            // first row sits on the horizon, last row is pinned to LOS
            assert!(pass.rows[0].elevation.to_degrees().abs() < 1.0);
            let last = pass.rows.last().unwrap();
            assert!((last.time - pass.los).abs() < 1e-6);

            // peak elevation is above the endpoints
            let peak = pass
                .rows
                .iter()
                .map(|r| r.elevation)
                .fold(f64::MIN, f64::max);
            assert!(peak >= pass.rows[0].elevation);
        }
    }

    #[test]
    fn test_visibility_counting_rule() {
        use VisibilityMark::{InEclipse, InSunlight, Visible};

        // three visible rows: visual
        assert!(fixture_pass(&[Visible, Visible, Visible]).is_visible());
        // two visible plus two sunlit: visual
        assert!(fixture_pass(&[Visible, InSunlight, Visible, InSunlight]).is_visible());
        // two visible with only one sunlit: not visual
        assert!(!fixture_pass(&[Visible, Visible, InSunlight]).is_visible());
        // sunlit only: not visual
        assert!(!fixture_pass(&[InSunlight, InSunlight, InSunlight, InSunlight]).is_visible());
        // eclipsed pass: not visual
        assert!(!fixture_pass(&[InEclipse, InEclipse, InEclipse]).is_visible());
    }

    #[test]
    fn test_cancel_stops_between_passes() {
        let elements = iss();
        let observer = mid_lat();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let passes =
            pass_schedule(&observer, &elements, elements.epoch + 0.5, 10, &cancel).unwrap();
        assert!(passes.is_empty());
    }

    #[test]
    fn test_solar_illumination_is_leo_like() {
        let elements = iss();
        let cancel = CancelFlag::new();
        let days = solar_illumination(&elements, elements.epoch + 0.2, 2, &cancel);

        assert_eq!(days.len(), 2);
        for day in &days {
            // a LEO orbit is sunlit for roughly 55-75% of the day
            assert!(
                (600..=1300).contains(&day.sunlit_minutes),
                "sunlit {} minutes",
                day.sunlit_minutes
            );
            let expected = 100.0 * f64::from(day.sunlit_minutes) / 1440.0;
            assert!((day.sunlit_percent - expected).abs() < 1e-9);
        }
        // day boundaries are one day apart, floored to midnight
        assert!((days[1].day - days[0].day - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sun_pass_starts_at_horizon() {
        let observer = mid_lat();
        let start = julian_from_datetime(Utc.with_ymd_and_hms(2023, 6, 1, 1, 0, 0).unwrap());
        let cancel = CancelFlag::new();

        let passes = sun_moon_schedule(AstronomicalBody::Sun, &observer, start, 1, &cancel);
        assert_eq!(passes.len(), 1);

        let pass = &passes[0];
        assert!(!pass.rows.is_empty());
        assert!(pass.rows[0].elevation.to_degrees().abs() < 0.1);

        // the sun climbs after rising at the equator
        let peak = pass
            .rows
            .iter()
            .map(|r| r.elevation)
            .fold(f64::MIN, f64::max);
        assert!(peak > 30.0_f64.to_radians());
    }

    #[test]
    fn test_moon_pass_found() {
        let observer = mid_lat();
        let start = julian_from_datetime(Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap());
        let cancel = CancelFlag::new();

        let passes = sun_moon_schedule(AstronomicalBody::Moon, &observer, start, 1, &cancel);
        assert_eq!(passes.len(), 1);
        assert!(passes[0].rows[0].elevation.to_degrees().abs() < 0.1);
    }

    #[test]
    fn test_geostationary_reports_reason() {
        let line1 = "1 26038U 00011A   23004.50000000  .00000100  00000-0  00000-0 0  999";
        let line2 = "2 26038   0.0100  95.0000 0001000 130.0000 325.0000  1.0027000012345";
        let line1 = format!("{}{}", line1, tle_db::line_checksum(line1));
        let line2 = format!("{}{}", line2, tle_db::line_checksum(line2));
        let elements = OrbitalElements::from_lines("GEO", &line1, &line2).unwrap();

        let result = pass_schedule(
            &mid_lat(),
            &elements,
            elements.epoch,
            1,
            &CancelFlag::new(),
        );
        assert_eq!(result.unwrap_err(), PredictionImpossible::Geostationary);
    }
}

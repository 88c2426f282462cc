//! Julian date conversions

use chrono::{DateTime, NaiveDateTime, Utc};

/// Julian date in days (UTC).
pub type JulianDate = f64;

const UNIX_EPOCH_JD: f64 = 2440587.5;
const MS_PER_DAY: f64 = 86_400_000.0;

pub fn julian_from_datetime(dt: DateTime<Utc>) -> JulianDate {
    dt.timestamp_millis() as f64 / MS_PER_DAY + UNIX_EPOCH_JD
}

pub fn julian_from_naive(dt: NaiveDateTime) -> JulianDate {
    julian_from_datetime(dt.and_utc())
}

pub fn datetime_from_julian(jd: JulianDate) -> DateTime<Utc> {
    let millis = ((jd - UNIX_EPOCH_JD) * MS_PER_DAY).round() as i64;
    DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Floor a Julian date to the preceding UTC midnight. Julian days roll
/// over at noon, hence the half-day shift.
pub fn floor_to_midnight(jd: JulianDate) -> JulianDate {
    (jd - 0.5).floor() + 0.5
}

/// Greenwich mean sidereal time in radians for a Julian date.
pub fn gmst(jd: JulianDate) -> f64 {
    let t = (jd - 2451545.0) / 36525.0;
    let gmst_sec = 67310.54841
        + (876600.0 * 3600.0 + 8640184.812866) * t
        + 0.093104 * t * t
        - 6.2e-6 * t * t * t;
    ((gmst_sec / 240.0).to_radians()).rem_euclid(2.0 * std::f64::consts::PI)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_round_trip() {
        let dt = Utc.with_ymd_and_hms(2023, 1, 1, 12, 0, 0).unwrap();
        let jd = julian_from_datetime(dt);
        // 2023-01-01 12:00 UTC is JD 2459946.0
        assert!((jd - 2459946.0).abs() < 1e-9);
        assert_eq!(datetime_from_julian(jd), dt);
    }

    #[test]
    fn test_floor_to_midnight() {
        let dt = Utc.with_ymd_and_hms(2023, 1, 1, 18, 30, 0).unwrap();
        let midnight = datetime_from_julian(floor_to_midnight(julian_from_datetime(dt)));
        assert_eq!(midnight, Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_gmst_in_range() {
        let jd = julian_from_datetime(Utc.with_ymd_and_hms(2024, 2, 13, 16, 0, 0).unwrap());
        let theta = gmst(jd);
        assert!((0.0..2.0 * std::f64::consts::PI).contains(&theta));
    }
}

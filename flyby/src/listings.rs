//! Pass and illumination listings for the CLI.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

use pass_predict::{
    datetime_from_julian, julian_from_datetime, pass_schedule, solar_illumination,
    sun_moon_schedule, AstronomicalBody, CancelFlag, Observer, OrbitalElements, PassSchedule,
};
use tle_db::TleDatabase;

fn elements_for(tle_db: &TleDatabase, satnum: u32) -> Result<OrbitalElements> {
    let Some(index) = tle_db.find(satnum) else {
        bail!("satellite {} is not in the TLE database", satnum);
    };
    Ok(OrbitalElements::from_entry(&tle_db.entries()[index])?)
}

fn format_time(jd: f64) -> String {
    let time: DateTime<Utc> = datetime_from_julian(jd);
    time.format("%a %d%b%y %H:%M:%S").to_string()
}

fn print_pass(pass: &PassSchedule) {
    for row in &pass.rows {
        println!(
            "{} {:4.0} {:4.0} {:4.0} {:4.0} {:4.0} {:6.0} {:6} {}",
            format_time(row.time),
            row.elevation.to_degrees(),
            row.azimuth.to_degrees(),
            256.0 * row.phase / (2.0 * std::f64::consts::PI),
            row.latitude.to_degrees(),
            row.longitude.to_degrees(),
            row.range,
            row.revolutions,
            row.mark.symbol()
        );
    }
    println!();
}

/// Print upcoming passes for one satellite.
pub fn print_passes(
    tle_db: &TleDatabase,
    observer: &Observer,
    satnum: u32,
    max_passes: usize,
    visible_only: bool,
    json: bool,
) -> Result<()> {
    let elements = elements_for(tle_db, satnum)?;
    let start = julian_from_datetime(Utc::now());
    let cancel = CancelFlag::new();

    let passes = match pass_schedule(observer, &elements, start, max_passes, &cancel) {
        Ok(passes) => passes,
        Err(reason) => bail!("cannot predict passes for {}: {}", elements.name, reason),
    };
    let passes: Vec<&PassSchedule> = passes
        .iter()
        .filter(|pass| !visible_only || pass.is_visible())
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&passes)?);
        return Ok(());
    }

    println!(
        "Upcoming passes for {} ({})\n{:>17}  El   Az  Phase  LatN  LonE   Range  Orbit",
        elements.name, satnum, "Date/Time"
    );
    for pass in &passes {
        print_pass(pass);
    }
    if passes.is_empty() {
        println!("no matching passes predicted");
    }
    Ok(())
}

/// Print upcoming sun or moon passes for the ground station.
pub fn print_body_passes(
    body: AstronomicalBody,
    observer: &Observer,
    max_passes: usize,
    json: bool,
) -> Result<()> {
    let start = julian_from_datetime(Utc::now());
    let cancel = CancelFlag::new();
    let passes = sun_moon_schedule(body, observer, start, max_passes, &cancel);

    if json {
        println!("{}", serde_json::to_string_pretty(&passes)?);
        return Ok(());
    }

    println!(
        "{:?} passes for {}\n{:>17}  El   Az    Range      Vel",
        body, observer.name, "Date/Time"
    );
    for pass in &passes {
        for row in &pass.rows {
            println!(
                "{} {:4.0} {:4.0} {:9.0} {:8.3}",
                format_time(row.time),
                row.elevation.to_degrees(),
                row.azimuth.to_degrees(),
                row.range,
                row.range_rate
            );
        }
        println!();
    }
    Ok(())
}

/// Print a day-by-day solar illumination scan.
pub fn print_solar_illumination(
    tle_db: &TleDatabase,
    satnum: u32,
    num_days: usize,
    json: bool,
) -> Result<()> {
    let elements = elements_for(tle_db, satnum)?;
    let start = julian_from_datetime(Utc::now());
    let cancel = CancelFlag::new();

    let days = solar_illumination(&elements, start, num_days, &cancel);
    if json {
        println!("{}", serde_json::to_string_pretty(&days)?);
        return Ok(());
    }
    println!(
        "Solar illumination for {} ({})\n{:>11}  Mins/Day     Sun",
        elements.name, satnum, "Date"
    );
    for day in &days {
        let date: DateTime<Utc> = datetime_from_julian(day.day);
        println!(
            "{}      {:4}  {:6.2}%",
            date.format("%a %d%b%y"),
            day.sunlit_minutes,
            day.sunlit_percent
        );
    }
    Ok(())
}

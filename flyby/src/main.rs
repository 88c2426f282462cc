//! flyby — interactive satellite tracking for amateur radio ground
//! stations.
//!
//! Loads the TLE and transponder databases from the XDG search paths,
//! predicts passes, and (when rotctld/rigctld endpoints are configured)
//! drives an antenna rotator and doppler-corrected radio frequencies for
//! a chosen satellite.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use search_paths::Paths;
use tle_db::{MergePolicy, TleDatabase};

mod engine;
mod listings;

#[derive(Parser, Debug)]
#[command(name = "flyby", version, about)]
pub struct Args {
    /// Use FILE as TLE database file, overriding the user and system
    /// databases. May be given multiple times.
    #[arg(long = "tle-file", value_name = "FILE")]
    tle_files: Vec<PathBuf>,

    /// Copy a TLE file into flyby's user TLE directory under its base
    /// filename, then continue.
    #[arg(long = "add-tle-file", value_name = "FILE")]
    add_tle_files: Vec<PathBuf>,

    /// Update the TLE database from FILE and exit. May be given multiple
    /// times; new satellites in the file are ignored.
    #[arg(long = "update-tle-db", value_name = "FILE")]
    update_files: Vec<PathBuf>,

    /// Use FILE as the QTH config file instead of the search paths.
    #[arg(long = "qth-file", value_name = "FILE")]
    qth_file: Option<PathBuf>,

    /// Connect to rotctld and enable antenna tracking.
    #[arg(long = "rotctld-tracking", value_name = "HOST[:PORT]")]
    rotctld: Option<String>,

    /// Elevation threshold in degrees before tracking engages.
    #[arg(long = "tracking-horizon", value_name = "HORIZON", default_value_t = 0.0)]
    tracking_horizon: f64,

    /// Connect to rigctld for uplink frequency control.
    #[arg(long = "rigctld-uplink", value_name = "HOST[:PORT]")]
    rigctld_uplink: Option<String>,

    /// VFO name for the uplink rig.
    #[arg(long = "uplink-vfo", value_name = "NAME")]
    uplink_vfo: Option<String>,

    /// Connect to rigctld for downlink frequency control.
    #[arg(long = "rigctld-downlink", value_name = "HOST[:PORT]")]
    rigctld_downlink: Option<String>,

    /// VFO name for the downlink rig.
    #[arg(long = "downlink-vfo", value_name = "NAME")]
    downlink_vfo: Option<String>,

    /// Single-track this satellite (catalog number) with the configured
    /// rotator/rig endpoints.
    #[arg(long = "track", value_name = "SATNUM")]
    track: Option<u32>,

    /// Print upcoming passes for a satellite and exit.
    #[arg(long = "list-passes", value_name = "SATNUM")]
    list_passes: Option<u32>,

    /// With --list-passes: keep only optically visible passes.
    #[arg(long = "visible-only")]
    visible_only: bool,

    /// Emit listing output as JSON instead of tables.
    #[arg(long = "json")]
    json: bool,

    /// Print a day-by-day solar illumination scan for a satellite and
    /// exit.
    #[arg(long = "solar-illumination", value_name = "SATNUM")]
    solar_illumination: Option<u32>,

    /// Print upcoming sun passes for the ground station and exit.
    #[arg(long = "sun-passes")]
    sun_passes: bool,

    /// Print upcoming moon passes for the ground station and exit.
    #[arg(long = "moon-passes")]
    moon_passes: bool,

    /// Number of passes (or days) to predict for the listing modes.
    #[arg(long = "passes", value_name = "COUNT", default_value_t = 6)]
    passes: usize,
}

/// Split a HOST[:PORT] argument, applying the daemon's default port.
pub fn parse_host_port(argument: &str, default_port: u16) -> Result<(String, u16)> {
    let mut parts = argument.split(':');
    let host = parts.next().unwrap_or_default();
    if host.is_empty() {
        bail!("expected HOST or HOST:PORT, got {:?}", argument);
    }
    let port = match parts.next() {
        Some(port) => port
            .parse()
            .with_context(|| format!("bad port in {:?}", argument))?,
        None => default_port,
    };
    if parts.next().is_some() {
        bail!("expected HOST or HOST:PORT, got {:?}", argument);
    }
    Ok((host.to_string(), port))
}

/// Assemble the TLE database: explicit files override the search paths.
fn load_tle_db(args: &Args, paths: &Paths) -> Result<TleDatabase> {
    if args.tle_files.is_empty() {
        return Ok(TleDatabase::from_search_paths(paths));
    }
    let mut db = TleDatabase::new();
    for file in &args.tle_files {
        let file_db = TleDatabase::from_file(file)
            .with_context(|| format!("could not read TLE file {}", file.display()))?;
        db.merge(file_db, MergePolicy::Newest);
    }
    Ok(db)
}

/// Copy TLE files into the user TLE directory under their base names.
fn add_tle_files(args: &Args, paths: &Paths) -> Result<()> {
    if args.add_tle_files.is_empty() {
        return Ok(());
    }
    paths.create_user_dirs()?;
    for file in &args.add_tle_files {
        let Some(basename) = file.file_name() else {
            bail!("{} has no filename", file.display());
        };
        let destination = paths.user_tle_dir().join(basename);
        std::fs::copy(file, &destination)
            .with_context(|| format!("could not copy {} into the TLE directory", file.display()))?;
        tracing::info!("added {} as {}", file.display(), destination.display());
    }
    Ok(())
}

/// Apply --update-tle-db files and report what happened per satellite.
fn run_updates(args: &Args, paths: &Paths, db: &mut TleDatabase) -> Result<()> {
    for file in &args.update_files {
        let statuses = tle_db::update(file, db, paths, chrono::Utc::now())
            .with_context(|| format!("could not apply {}", file.display()))?;

        let mut any = false;
        for (index, status) in statuses.iter().enumerate() {
            if !status.db_updated {
                continue;
            }
            any = true;
            let entry = &db.entries()[index];
            let disposition = if status.file_updated {
                "file updated"
            } else if status.in_new_file {
                "saved to new update file"
            } else {
                "database only"
            };
            println!(
                "{:24} ({}): updated ({})",
                entry.name, entry.satellite_number, disposition
            );
        }
        if !any {
            println!("{}: no newer TLEs", file.display());
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "flyby=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let paths = Paths::from_env().context("could not resolve search paths")?;

    add_tle_files(&args, &paths)?;

    let mut tle_db = load_tle_db(&args, &paths)?;
    if tle_db.is_empty() {
        tracing::warn!("TLE database is empty; add TLE files with --add-tle-file");
    }

    if !args.update_files.is_empty() {
        return run_updates(&args, &paths, &mut tle_db);
    }

    // whitelist: enabled set from the user config; with no whitelist at
    // all, every satellite is enabled
    if paths.user_whitelist_file().exists() {
        tle_db::whitelist_from_search_paths(&paths, &mut tle_db);
    } else {
        for index in 0..tle_db.len() {
            tle_db.set_enabled(index, true);
        }
    }

    let observer = match &args.qth_file {
        Some(path) => pass_predict::qth_from_file(path)
            .with_context(|| format!("could not read QTH file {}", path.display()))?,
        None => match pass_predict::observer_from_search_paths(&paths) {
            Some((observer, scope)) => {
                tracing::debug!("QTH loaded from {:?}", scope);
                observer
            }
            None => {
                tracing::warn!("no QTH config found; using 0N 0E at sea level");
                pass_predict::Observer::new("UNCONFIGURED", 0.0, 0.0, 0.0)
            }
        },
    };

    if let Some(satnum) = args.list_passes {
        return listings::print_passes(
            &tle_db,
            &observer,
            satnum,
            args.passes,
            args.visible_only,
            args.json,
        );
    }
    if let Some(satnum) = args.solar_illumination {
        return listings::print_solar_illumination(&tle_db, satnum, args.passes, args.json);
    }
    if args.sun_passes {
        return listings::print_body_passes(
            pass_predict::AstronomicalBody::Sun,
            &observer,
            args.passes,
            args.json,
        );
    }
    if args.moon_passes {
        return listings::print_body_passes(
            pass_predict::AstronomicalBody::Moon,
            &observer,
            args.passes,
            args.json,
        );
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(engine::run(args, paths, tle_db, observer))
}

//! Engine wiring and the real-time control loop.
//!
//! Owns the databases, the observer, the multitrack scheduler and the
//! rotator/rig endpoints. The loop ticks at a fixed cadence: every tick
//! observes all enabled satellites, and when a satellite is being
//! single-tracked the controller drives the configured daemons with
//! doppler-corrected frequencies. Unconfigured endpoints are permanently
//! disconnected clients whose commands are silently dropped, and
//! endpoint failures never stop the loop.

use std::time::Duration;

use anyhow::{bail, Result};
use tracing::info;

use hamlib_client::{RigClient, RotatorClient, RIGCTLD_DEFAULT_PORT, ROTCTLD_DEFAULT_PORT};
use multitrack::{Classification, Clock, MultitrackScheduler, SystemClock};
use pass_predict::{datetime_from_julian, Observer, OrbitalElements};
use search_paths::Paths;
use singletrack::SingleTrackController;
use tle_db::TleDatabase;
use transponder_db::TransponderDatabase;

use crate::{parse_host_port, Args};

/// Multitrack cadence.
const TICK_PERIOD: Duration = Duration::from_millis(500);

/// Snapshot print period, in ticks.
const PRINT_EVERY: u32 = 4;

struct SingleTrack {
    controller: SingleTrackController,
    elements: OrbitalElements,
    name: String,
}

struct Engine {
    observer: Observer,
    scheduler: MultitrackScheduler,
    rotator: RotatorClient,
    downlink: RigClient,
    uplink: RigClient,
    single: Option<SingleTrack>,
}

async fn connect_rotator(args: &Args) -> Result<RotatorClient> {
    match &args.rotctld {
        Some(argument) => {
            let (host, port) = parse_host_port(argument, ROTCTLD_DEFAULT_PORT)?;
            let mut client = RotatorClient::connect(&host, port).await?;
            client.set_tracking_horizon(args.tracking_horizon);
            Ok(client)
        }
        None => Ok(RotatorClient::disconnected()),
    }
}

async fn connect_rig(argument: Option<&String>, vfo: Option<&String>) -> Result<RigClient> {
    match argument {
        Some(argument) => {
            let (host, port) = parse_host_port(argument, RIGCTLD_DEFAULT_PORT)?;
            let mut client = RigClient::connect(&host, port).await?;
            if let Some(vfo) = vfo {
                client.set_vfo(vfo.clone());
            }
            Ok(client)
        }
        None => Ok(RigClient::disconnected()),
    }
}

impl Engine {
    async fn tick(&mut self, time: f64) {
        self.scheduler.tick(time);

        if let Some(single) = &mut self.single {
            let observation = pass_predict::observe(&single.elements, &self.observer, time);
            single
                .controller
                .tick(
                    &observation,
                    &mut self.rotator,
                    &mut self.downlink,
                    &mut self.uplink,
                )
                .await;
        }
    }

    fn print_snapshot(&self) {
        let snapshot = self.scheduler.snapshot();
        println!(
            "\n Satellite                Azim   Elev   Lat  Long    Alt   Range  Next event"
        );
        for row in &snapshot {
            let event = match row.classification {
                Classification::Above => row
                    .next_los
                    .map(|los| format!("LOS {}", datetime_from_julian(los).format("%H:%M:%SZ")))
                    .unwrap_or_else(|| "in view".to_string()),
                Classification::WillRiseSoon | Classification::WillRiseLater => row
                    .next_aos
                    .map(|aos| format!("AOS {}", datetime_from_julian(aos).format("%H:%M:%SZ")))
                    .unwrap_or_else(|| "rises".to_string()),
                Classification::NeverRises => "never rises".to_string(),
                Classification::Decayed => "decayed".to_string(),
            };
            println!(
                " {:24} {:6.1} {:6.1} {:5.0} {:5.0} {:6.0} {:7.0}  {}",
                row.name,
                row.observation.azimuth.to_degrees(),
                row.observation.elevation.to_degrees(),
                row.observation.latitude.to_degrees(),
                row.observation.longitude.to_degrees(),
                row.observation.altitude,
                row.observation.range,
                event
            );
        }
    }
}

/// Build the engine and run the control loop until interrupted.
pub async fn run(args: Args, paths: Paths, tle_db: TleDatabase, observer: Observer) -> Result<()> {
    let transponder_db = TransponderDatabase::from_search_paths(&tle_db, &paths);
    let scheduler = MultitrackScheduler::new(observer.clone(), &tle_db);
    info!(
        "observer {} at {:.3}N {:.3}E, {} satellites enabled",
        observer.name,
        observer.latitude.to_degrees(),
        observer.longitude.to_degrees(),
        scheduler.len()
    );

    let rotator = connect_rotator(&args).await?;
    let downlink = connect_rig(args.rigctld_downlink.as_ref(), args.downlink_vfo.as_ref()).await?;
    let uplink = connect_rig(args.rigctld_uplink.as_ref(), args.uplink_vfo.as_ref()).await?;

    let single = match args.track {
        Some(satnum) => {
            let Some(index) = tle_db.find(satnum) else {
                bail!("satellite {} is not in the TLE database", satnum);
            };
            let entry = &tle_db.entries()[index];
            let elements = OrbitalElements::from_entry(entry)?;
            let transponders = transponder_db.entry(index).cloned().unwrap_or_default();
            info!("single-tracking {} ({})", entry.name, satnum);
            Some(SingleTrack {
                controller: SingleTrackController::new(transponders, args.tracking_horizon),
                elements,
                name: entry.name.clone(),
            })
        }
        None => None,
    };

    let mut engine = Engine {
        observer,
        scheduler,
        rotator,
        downlink,
        uplink,
        single,
    };

    let clock = SystemClock;
    let mut interval = tokio::time::interval(TICK_PERIOD);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut ticks = 0u32;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                engine.tick(clock.now()).await;
                if ticks % PRINT_EVERY == 0 {
                    engine.print_snapshot();
                    if let Some(single) = &engine.single {
                        if let Some(transponder) = single.controller.transponder() {
                            info!(
                                "{}: transponder {:?}, downlink {:.5} MHz, uplink {:.5} MHz",
                                single.name,
                                transponder.name,
                                single.controller.downlink(),
                                single.controller.uplink()
                            );
                        }
                        if let Some((alat, alon)) = single.controller.squint_attitude() {
                            let squint = pass_predict::squint_angle(
                                &single.elements,
                                &engine.observer,
                                clock.now(),
                                alat,
                                alon,
                            );
                            if let Some(squint) = squint {
                                info!("{}: squint {:+.2} deg", single.name, squint.to_degrees());
                            }
                        }
                    }
                }
                ticks = ticks.wrapping_add(1);
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
        }
    }

    engine.rotator.disconnect();
    engine.downlink.disconnect();
    engine.uplink.disconnect();
    info!("shutting down");
    Ok(())
}

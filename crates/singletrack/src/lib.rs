//! Single-track Controller
//!
//! Real-time tracking of one chosen satellite: picks a transponder,
//! applies doppler correction to the uplink/downlink centers, and drives
//! the rotator and both rig endpoints. Endpoint I/O failures never
//! propagate out of a tick; the clients mark themselves disconnected and
//! the controller carries on.

use serde::{Deserialize, Serialize};
use tracing::warn;

use hamlib_client::{RigClient, RotatorClient};
use pass_predict::{doppler_shift, inverse_doppler_shift, LinkDirection, Observation, PassEvent};
use transponder_db::{Transponder, TransponderEntry};

/// Coarse tuning step: 1 kHz in MHz.
pub const TUNING_STEP_COARSE: f64 = 0.001;
/// Fine tuning step: 100 Hz in MHz.
pub const TUNING_STEP_FINE: f64 = 0.0001;

/// Range-rate band treated as time of closest approach, km/s.
const TCA_RANGE_RATE: f64 = 0.1;

/// Whether the satellite is moving towards or away from the station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SatelliteStatus {
    Approaching,
    Tca,
    Receding,
}

/// Link figures computed each tick for display and rig control.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LinkStats {
    /// Doppler-shifted downlink in MHz; 0.0 when no downlink is defined.
    pub downlink_doppler: f64,
    /// Doppler-shifted uplink in MHz; 0.0 when no uplink is defined.
    pub uplink_doppler: f64,
    /// One-way propagation delay in milliseconds.
    pub delay_ms: f64,
    /// Round-trip echo in milliseconds.
    pub echo_ms: f64,
    /// Downlink path loss in dB.
    pub downlink_loss_db: f64,
    /// Uplink path loss in dB.
    pub uplink_loss_db: f64,
    pub status: SatelliteStatus,
    /// Satellite is above the horizon.
    pub in_range: bool,
}

/// Controller session for one satellite.
pub struct SingleTrackController {
    entry: TransponderEntry,
    transponder_index: usize,
    /// Downlink center in MHz; 0.0 when undefined.
    downlink: f64,
    /// Uplink center in MHz; 0.0 when undefined.
    uplink: f64,
    downlink_update: bool,
    uplink_update: bool,
    readfreq: bool,
    /// Elevation threshold in degrees for rig and rotator updates.
    tracking_horizon: f64,
}

fn path_loss_db(frequency_mhz: f64, range_km: f64) -> f64 {
    32.4 + 20.0 * frequency_mhz.log10() + 20.0 * range_km.log10()
}

impl SingleTrackController {
    pub fn new(entry: TransponderEntry, tracking_horizon: f64) -> Self {
        let mut controller = Self {
            entry,
            transponder_index: 0,
            downlink: 0.0,
            uplink: 0.0,
            downlink_update: true,
            uplink_update: true,
            readfreq: false,
            tracking_horizon,
        };
        controller.select_transponder(0);
        controller
    }

    /// Satellite carries at least one transponder.
    pub fn is_comsat(&self) -> bool {
        !self.entry.transponders.is_empty()
    }

    /// Bahn attitude (alat, alon) in radians when squint calculation is
    /// enabled for this satellite.
    pub fn squint_attitude(&self) -> Option<(f64, f64)> {
        self.entry
            .squint_enabled
            .then_some((self.entry.attitude_latitude, self.entry.attitude_longitude))
    }

    pub fn transponder(&self) -> Option<&Transponder> {
        self.entry.transponders.get(self.transponder_index)
    }

    pub fn transponder_index(&self) -> usize {
        self.transponder_index
    }

    pub fn downlink(&self) -> f64 {
        self.downlink
    }

    pub fn uplink(&self) -> f64 {
        self.uplink
    }

    pub fn downlink_update(&self) -> bool {
        self.downlink_update
    }

    pub fn uplink_update(&self) -> bool {
        self.uplink_update
    }

    pub fn readfreq(&self) -> bool {
        self.readfreq
    }

    fn select_transponder(&mut self, index: usize) {
        self.transponder_index = index;
        match self.entry.transponders.get(index) {
            Some(transponder) => {
                self.downlink = 0.5 * (transponder.downlink_start + transponder.downlink_end);
                self.uplink = 0.5 * (transponder.uplink_start + transponder.uplink_end);
            }
            None => {
                self.downlink = 0.0;
                self.uplink = 0.0;
            }
        }
    }

    /// Cycle to the next transponder (wraps around).
    pub fn next_transponder(&mut self) {
        if self.entry.transponders.len() > 1 {
            let next = (self.transponder_index + 1) % self.entry.transponders.len();
            self.select_transponder(next);
        }
    }

    /// Tuning polarity: the sign of (downlink_end - downlink_start).
    /// Inverting transponders flip the downlink as the uplink climbs.
    pub fn polarity(&self) -> i32 {
        match self.transponder() {
            Some(t) if t.downlink_start > t.downlink_end => -1,
            Some(t) if t.downlink_start < t.downlink_end => 1,
            _ => 0,
        }
    }

    /// Nudge the tuning by `shift` MHz. The uplink moves by |polarity|
    /// steps, the downlink follows the polarity; running off the band
    /// edge wraps both to the opposite edge.
    pub fn adjust_frequency(&mut self, shift: f64) {
        let Some(transponder) = self.transponder().cloned() else {
            return;
        };
        let polarity = self.polarity();

        self.uplink += shift * f64::from(polarity.abs());
        self.downlink += shift * f64::from(polarity);

        if self.uplink < transponder.uplink_start {
            self.uplink = transponder.uplink_end;
            self.downlink = transponder.downlink_end;
        }
        if self.uplink > transponder.uplink_end {
            self.uplink = transponder.uplink_start;
            self.downlink = transponder.downlink_start;
        }
    }

    pub fn set_downlink_update(&mut self, enabled: bool) {
        self.downlink_update = enabled;
    }

    pub fn set_uplink_update(&mut self, enabled: bool) {
        self.uplink_update = enabled;
    }

    /// Continuously read the rig and reverse-doppler the centers.
    pub fn set_readfreq(&mut self, enabled: bool) {
        self.readfreq = enabled;
    }

    /// Exchange the uplink and downlink VFO names, for rigs where the
    /// roles are wired the other way around. Only meaningful when both
    /// endpoints are connected.
    pub fn swap_vfos(&self, downlink: &mut RigClient, uplink: &mut RigClient) {
        if downlink.is_connected() && uplink.is_connected() {
            let downlink_vfo = downlink.vfo_name().to_string();
            downlink.set_vfo(uplink.vfo_name().to_string());
            uplink.set_vfo(downlink_vfo);
        }
    }

    /// Pure link computation for the current observation.
    pub fn link_stats(&self, observation: &Observation) -> LinkStats {
        let status = if observation.range_rate.abs() < TCA_RANGE_RATE {
            SatelliteStatus::Tca
        } else if observation.range_rate < 0.0 {
            SatelliteStatus::Approaching
        } else {
            SatelliteStatus::Receding
        };

        let delay_ms = observation.range / 299.792458;
        LinkStats {
            downlink_doppler: if self.downlink != 0.0 {
                self.downlink + doppler_shift(observation.range_rate, self.downlink)
            } else {
                0.0
            },
            uplink_doppler: if self.uplink != 0.0 {
                self.uplink - doppler_shift(observation.range_rate, self.uplink)
            } else {
                0.0
            },
            delay_ms,
            echo_ms: 2.0 * delay_ms,
            downlink_loss_db: if self.downlink != 0.0 {
                path_loss_db(self.downlink, observation.range)
            } else {
                0.0
            },
            uplink_loss_db: if self.uplink != 0.0 {
                path_loss_db(self.uplink, observation.range)
            } else {
                0.0
            },
            status,
            in_range: observation.elevation >= 0.0,
        }
    }

    /// One-shot read of both rigs: overwrite the centers with the rigs'
    /// current dials, reverse-doppler corrected.
    pub async fn read_frequencies_once(
        &mut self,
        observation: &Observation,
        downlink: &mut RigClient,
        uplink: &mut RigClient,
    ) {
        if downlink.is_connected() {
            match downlink.read_frequency().await {
                Ok(frequency) => {
                    self.downlink = inverse_doppler_shift(
                        LinkDirection::Downlink,
                        observation.range_rate,
                        frequency,
                    );
                }
                Err(e) => warn!("downlink rig read failed: {}", e),
            }
        }
        if uplink.is_connected() {
            match uplink.read_frequency().await {
                Ok(frequency) => {
                    self.uplink = inverse_doppler_shift(
                        LinkDirection::Uplink,
                        observation.range_rate,
                        frequency,
                    );
                }
                Err(e) => warn!("uplink rig read failed: {}", e),
            }
        }
    }

    /// One controller iteration: doppler bookkeeping, rig frequency
    /// updates and rotator tracking for the given observation.
    pub async fn tick(
        &mut self,
        observation: &Observation,
        rotator: &mut RotatorClient,
        downlink: &mut RigClient,
        uplink: &mut RigClient,
    ) -> LinkStats {
        if self.readfreq {
            self.read_frequencies_once(observation, downlink, uplink).await;
        }

        let stats = self.link_stats(observation);
        let elevation_deg = observation.elevation.to_degrees();
        let above_horizon = elevation_deg >= self.tracking_horizon;

        if above_horizon {
            if downlink.is_connected() && self.downlink_update && self.downlink != 0.0 {
                if let Err(e) = downlink.set_frequency(stats.downlink_doppler).await {
                    warn!("downlink rig update failed: {}", e);
                }
            }
            if uplink.is_connected() && self.uplink_update && self.uplink != 0.0 {
                if let Err(e) = uplink.set_frequency(stats.uplink_doppler).await {
                    warn!("uplink rig update failed: {}", e);
                }
            }

            if let Err(e) = rotator.track(observation.azimuth.to_degrees(), elevation_deg) {
                warn!("rotator update failed: {}", e);
            }
        }

        stats
    }

    /// Park the rotator at the azimuth of the coming AOS, elevation zero.
    /// Only meaningful while the satellite is below the tracking horizon.
    pub fn slew_to_aos(&self, rotator: &mut RotatorClient, next_aos: &PassEvent, elevation_deg: f64) {
        if elevation_deg < self.tracking_horizon {
            if let Err(e) = rotator.slew_to(next_aos.azimuth.to_degrees(), 0.0) {
                warn!("AOS slew failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(elevation_deg: f64, range_km: f64, range_rate: f64) -> Observation {
        Observation {
            time: 2_459_946.0,
            azimuth: 1.0,
            elevation: elevation_deg.to_radians(),
            range: range_km,
            range_rate,
            latitude: 0.0,
            longitude: 0.0,
            altitude: 420.0,
            footprint: 4000.0,
            velocity: 7.7,
            phase: 0.0,
            revolutions: 0,
            eclipsed: false,
            eclipse_depth: 0.0,
            visible: false,
            decayed: false,
        }
    }

    fn inverting_entry() -> TransponderEntry {
        TransponderEntry {
            squint_enabled: false,
            attitude_latitude: 0.0,
            attitude_longitude: 0.0,
            transponders: vec![
                Transponder {
                    name: "Mode U/V (inverting)".into(),
                    uplink_start: 435.030,
                    uplink_end: 435.070,
                    downlink_start: 145.990,
                    downlink_end: 145.950,
                },
                Transponder {
                    name: "Beacon".into(),
                    uplink_start: 0.0,
                    uplink_end: 0.0,
                    downlink_start: 437.800,
                    downlink_end: 437.800,
                },
            ],
            location: Default::default(),
        }
    }

    #[test]
    fn test_centers_start_mid_band() {
        let controller = SingleTrackController::new(inverting_entry(), 0.0);
        assert!((controller.uplink() - 435.050).abs() < 1e-9);
        assert!((controller.downlink() - 145.970).abs() < 1e-9);
    }

    #[test]
    fn test_transponder_cycling_wraps() {
        let mut controller = SingleTrackController::new(inverting_entry(), 0.0);
        controller.next_transponder();
        assert_eq!(controller.transponder_index(), 1);
        assert!((controller.downlink() - 437.800).abs() < 1e-9);
        assert_eq!(controller.uplink(), 0.0);

        controller.next_transponder();
        assert_eq!(controller.transponder_index(), 0);
    }

    #[test]
    fn test_inverting_polarity_moves_downlink_down() {
        let mut controller = SingleTrackController::new(inverting_entry(), 0.0);
        assert_eq!(controller.polarity(), -1);

        controller.adjust_frequency(TUNING_STEP_COARSE);
        assert!((controller.uplink() - 435.051).abs() < 1e-9);
        assert!((controller.downlink() - 145.969).abs() < 1e-9);

        controller.adjust_frequency(-TUNING_STEP_FINE);
        assert!((controller.uplink() - 435.0509).abs() < 1e-9);
        assert!((controller.downlink() - 145.9691).abs() < 1e-9);
    }

    #[test]
    fn test_band_edge_wraps_to_other_edge() {
        let mut controller = SingleTrackController::new(inverting_entry(), 0.0);
        // run the uplink past the top edge; it must wrap to the bottom
        let mut wrapped = false;
        for _ in 0..60 {
            controller.adjust_frequency(TUNING_STEP_COARSE);
            if (controller.uplink() - 435.030).abs() < 1e-9 {
                wrapped = true;
                break;
            }
        }
        assert!(wrapped);
        assert!((controller.downlink() - 145.990).abs() < 1e-9);
    }

    #[test]
    fn test_doppler_signs_in_link_stats() {
        let controller = SingleTrackController::new(inverting_entry(), 0.0);
        let approaching = controller.link_stats(&observation(45.0, 900.0, -7.0));
        assert!(approaching.downlink_doppler > controller.downlink());
        assert!(approaching.uplink_doppler < controller.uplink());
        assert_eq!(approaching.status, SatelliteStatus::Approaching);

        let receding = controller.link_stats(&observation(45.0, 900.0, 7.0));
        assert!(receding.downlink_doppler < controller.downlink());
        assert!(receding.uplink_doppler > controller.uplink());
        assert_eq!(receding.status, SatelliteStatus::Receding);

        let tca = controller.link_stats(&observation(45.0, 900.0, 0.05));
        assert_eq!(tca.status, SatelliteStatus::Tca);
    }

    mod wire {
        use super::*;
        use std::sync::{Arc, Mutex};
        use std::time::Duration;
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
        use tokio::net::TcpListener;

        /// Minimal hamlib daemon: logs every line, answers plausibly.
        async fn spawn_daemon() -> (u16, Arc<Mutex<Vec<String>>>) {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let port = listener.local_addr().unwrap().port();
            let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

            let accept_log = log.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        return;
                    };
                    let log = accept_log.clone();
                    tokio::spawn(async move {
                        let (read_half, mut write_half) = stream.into_split();
                        let mut lines = BufReader::new(read_half).lines();
                        while let Ok(Some(line)) = lines.next_line().await {
                            log.lock().unwrap().push(line.clone());
                            let reply = if line == "f" {
                                "437810000\n".to_string()
                            } else if line == "p" {
                                "0.00\n0.00\n".to_string()
                            } else if line.starts_with(";p") {
                                "get_pos:;RPRT 0\n".to_string()
                            } else if line == "q" {
                                return;
                            } else {
                                "RPRT 0\n".to_string()
                            };
                            if write_half.write_all(reply.as_bytes()).await.is_err() {
                                return;
                            }
                        }
                    });
                }
            });
            (port, log)
        }

        async fn settle() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        #[tokio::test]
        async fn test_doppler_round_trip_to_rig() {
            let (rig_port, rig_log) = spawn_daemon().await;
            let (rotator_port, _rotator_log) = spawn_daemon().await;

            let mut downlink = RigClient::connect("127.0.0.1", rig_port).await.unwrap();
            let mut uplink = RigClient::connect("127.0.0.1", rig_port).await.unwrap();
            let mut rotator = RotatorClient::connect("127.0.0.1", rotator_port)
                .await
                .unwrap();
            settle().await;

            // beacon transponder: 437.800 MHz downlink only
            let mut controller = SingleTrackController::new(inverting_entry(), 0.0);
            controller.next_transponder();
            assert!((controller.downlink() - 437.800).abs() < 1e-9);

            let obs = observation(45.0, 900.0, -7.0);
            controller
                .tick(&obs, &mut rotator, &mut downlink, &mut uplink)
                .await;
            settle().await;

            let expected_hz =
                (437.800 * (1.0 + 7000.0 / pass_predict::SPEED_OF_LIGHT) * 1.0e6).round();
            let expected = format!("F {:.0}", expected_hz);
            // 437.8 MHz at -7 km/s lands on 437.810222 MHz, to the hertz
            assert_eq!(expected, "F 437810222");

            let lines = rig_log.lock().unwrap().clone();
            assert!(lines.contains(&expected), "rig wire: {:?}", lines);
        }

        #[tokio::test]
        async fn test_below_horizon_sends_nothing() {
            let (rig_port, rig_log) = spawn_daemon().await;
            let (rotator_port, rotator_log) = spawn_daemon().await;

            let mut downlink = RigClient::connect("127.0.0.1", rig_port).await.unwrap();
            let mut uplink = RigClient::connect("127.0.0.1", rig_port).await.unwrap();
            let mut rotator = RotatorClient::connect("127.0.0.1", rotator_port)
                .await
                .unwrap();
            settle().await;

            let mut controller = SingleTrackController::new(inverting_entry(), 10.0);
            let obs = observation(2.0, 2500.0, -5.0);
            controller
                .tick(&obs, &mut rotator, &mut downlink, &mut uplink)
                .await;
            settle().await;

            let rig_lines = rig_log.lock().unwrap().clone();
            assert!(!rig_lines.iter().any(|l| l.starts_with("F ")));
            let rotator_lines = rotator_log.lock().unwrap().clone();
            assert!(!rotator_lines.iter().any(|l| l.starts_with("P ")));
        }

        #[tokio::test]
        async fn test_vfo_swap() {
            let (rig_port, _log) = spawn_daemon().await;
            let mut downlink = RigClient::connect("127.0.0.1", rig_port).await.unwrap();
            let mut uplink = RigClient::connect("127.0.0.1", rig_port).await.unwrap();
            downlink.set_vfo("VFOA");
            uplink.set_vfo("VFOB");

            let controller = SingleTrackController::new(inverting_entry(), 0.0);
            controller.swap_vfos(&mut downlink, &mut uplink);

            assert_eq!(downlink.vfo_name(), "VFOB");
            assert_eq!(uplink.vfo_name(), "VFOA");
        }
    }

    #[test]
    fn test_link_budget_figures() {
        let controller = SingleTrackController::new(inverting_entry(), 0.0);
        let stats = controller.link_stats(&observation(45.0, 1000.0, -1.0));

        // path loss at 145.97 MHz over 1000 km: 32.4 + 43.3 + 60 = ~135.7
        assert!((stats.downlink_loss_db - 135.7).abs() < 0.1);
        // 1000 km of light travel is ~3.336 ms one way, double for echo
        assert!((stats.delay_ms - 3.336).abs() < 0.01);
        assert!((stats.echo_ms - 2.0 * stats.delay_ms).abs() < 1e-12);
        assert!(stats.in_range);
    }
}

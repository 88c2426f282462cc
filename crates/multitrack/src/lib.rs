//! Multitrack Scheduler
//!
//! Observes every enabled satellite at a fixed cadence, maintains cached
//! pass events, classifies each satellite and publishes a sorted
//! snapshot: satellites above the horizon first, then the rise-pending
//! ones ordered by AOS, then the never-risers, with decayed orbits last.
//!
//! The scheduler itself is synchronous and driven by an external loop;
//! time comes in through a [`Clock`] so tests can drive ticks
//! deterministically.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use pass_predict::{
    julian_from_datetime, max_elevation, next_aos, next_los, observe, JulianDate, Observation,
    Observer, OrbitalElements,
};
use tle_db::TleDatabase;

/// Threshold between "rises soon" and "rises later": ten minutes in days.
pub const RISE_SOON_THRESHOLD: f64 = 0.00694;

/// Wall-clock source for the scheduler loop.
pub trait Clock {
    fn now(&self) -> JulianDate;
}

/// Real UTC wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> JulianDate {
        julian_from_datetime(Utc::now())
    }
}

/// Where a satellite stands relative to the observer's horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    Above,
    WillRiseSoon,
    WillRiseLater,
    NeverRises,
    Decayed,
}

struct TrackedSatellite {
    tle_index: usize,
    name: String,
    elements: OrbitalElements,
    observation: Option<Observation>,
    next_aos: Option<JulianDate>,
    next_los: Option<JulianDate>,
    /// Peak elevation of the current or next pass, radians.
    max_elevation: Option<f64>,
    classification: Classification,
}

/// Per-satellite row of a published snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedSatelliteSnapshot {
    /// Index into the TLE database.
    pub tle_index: usize,
    pub name: String,
    pub classification: Classification,
    pub observation: Observation,
    /// `None` is the "never" sentinel for geostationary, decayed and
    /// never-rising satellites.
    pub next_aos: Option<JulianDate>,
    pub next_los: Option<JulianDate>,
    pub max_elevation: Option<f64>,
}

/// Cooperative multi-satellite scheduler.
pub struct MultitrackScheduler {
    observer: Observer,
    entries: Vec<TrackedSatellite>,
    sorted_index: Vec<usize>,
    sort_frozen: bool,
}

impl MultitrackScheduler {
    /// Build one entry per enabled TLE. Element sets that fail to parse
    /// are dropped with a diagnostic.
    pub fn new(observer: Observer, tle_db: &TleDatabase) -> Self {
        let mut scheduler = Self {
            observer,
            entries: Vec::new(),
            sorted_index: Vec::new(),
            sort_frozen: false,
        };
        scheduler.refresh(tle_db);
        scheduler
    }

    /// Rebuild the entry list after whitelist or database edits.
    pub fn refresh(&mut self, tle_db: &TleDatabase) {
        self.entries.clear();
        for tle_index in tle_db.enabled_indices() {
            let entry = &tle_db.entries()[tle_index];
            match OrbitalElements::from_entry(entry) {
                Ok(elements) => self.entries.push(TrackedSatellite {
                    tle_index,
                    name: entry.name.clone(),
                    elements,
                    observation: None,
                    next_aos: None,
                    next_los: None,
                    max_elevation: None,
                    classification: Classification::NeverRises,
                }),
                Err(e) => warn!("dropping {}: {}", entry.name, e),
            }
        }
        self.sorted_index = (0..self.entries.len()).collect();
        debug!("tracking {} enabled satellites", self.entries.len());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keep the published ordering fixed across ticks, so rows stay put
    /// under a cursor while an overlay is open.
    pub fn freeze_sort(&mut self) {
        self.sort_frozen = true;
    }

    pub fn unfreeze_sort(&mut self) {
        self.sort_frozen = false;
    }

    /// One scheduler iteration at `time`: observe every satellite at the
    /// same instant, refresh cached pass events, classify, and re-sort
    /// unless the ordering is frozen.
    pub fn tick(&mut self, time: JulianDate) {
        let observer = self.observer.clone();
        for entry in &mut self.entries {
            update_entry(entry, &observer, time);
        }
        if !self.sort_frozen {
            self.sort(time);
        }
    }

    /// Drive a tick from a clock.
    pub fn tick_with_clock(&mut self, clock: &impl Clock) {
        self.tick(clock.now());
    }

    /// Published rows in display order.
    pub fn snapshot(&self) -> Vec<TrackedSatelliteSnapshot> {
        self.sorted_index
            .iter()
            .filter_map(|&index| {
                let entry = &self.entries[index];
                let observation = entry.observation?;
                Some(TrackedSatelliteSnapshot {
                    tle_index: entry.tle_index,
                    name: entry.name.clone(),
                    classification: entry.classification,
                    observation,
                    next_aos: entry.next_aos,
                    next_los: entry.next_los,
                    max_elevation: entry.max_elevation,
                })
            })
            .collect()
    }

    /// Group sort: above-horizon satellites first, then the rise-pending
    /// group ordered by next AOS, then never-risers, decayed orbits last.
    /// Within groups the TLE order is preserved.
    fn sort(&mut self, _time: JulianDate) {
        let mut above = Vec::new();
        let mut rising = Vec::new();
        let mut never = Vec::new();
        let mut decayed = Vec::new();

        for (index, entry) in self.entries.iter().enumerate() {
            match entry.classification {
                Classification::Above => above.push(index),
                Classification::WillRiseSoon | Classification::WillRiseLater => {
                    rising.push(index)
                }
                Classification::NeverRises => never.push(index),
                Classification::Decayed => decayed.push(index),
            }
        }

        // stable bubble sort of the rise-pending group by AOS time
        let key = |index: usize| self.entries[index].next_aos.unwrap_or(f64::MAX);
        for i in 0..rising.len() {
            for j in 0..rising.len().saturating_sub(i + 1) {
                if key(rising[j]) > key(rising[j + 1]) {
                    rising.swap(j, j + 1);
                }
            }
        }

        self.sorted_index.clear();
        self.sorted_index.extend(above);
        self.sorted_index.extend(rising);
        self.sorted_index.extend(never);
        self.sorted_index.extend(decayed);
    }
}

fn update_entry(entry: &mut TrackedSatellite, observer: &Observer, time: JulianDate) {
    let observation = observe(&entry.elements, observer, time);

    let can_predict = !entry.elements.is_geostationary()
        && entry.elements.aos_happens(observer.latitude)
        && !observation.decayed;

    if can_predict {
        // past the cached LOS while above the horizon: a new pass has
        // begun, refresh LOS and the pass peak
        let los_stale = entry.next_los.map_or(true, |los| time > los);
        if los_stale && observation.elevation > 0.0 {
            entry.next_los = next_los(observer, &entry.elements, time);
            entry.max_elevation = max_elevation(observer, &entry.elements, time)
                .map(|(_, tca, _)| tca.elevation);
        }

        // past the cached AOS while below the horizon: predict the next
        let aos_stale = entry.next_aos.map_or(true, |aos| time > aos);
        if aos_stale && observation.elevation < 0.0 {
            entry.next_aos = next_aos(observer, &entry.elements, time);
        }
    } else {
        entry.next_aos = None;
        entry.next_los = None;
        entry.max_elevation = None;
    }

    entry.classification = classify(entry, observer, &observation, time);
    entry.observation = Some(observation);
}

fn classify(
    entry: &TrackedSatellite,
    observer: &Observer,
    observation: &Observation,
    time: JulianDate,
) -> Classification {
    if observation.decayed {
        return Classification::Decayed;
    }

    let geostationary = entry.elements.is_geostationary();
    let never_rises = !entry.elements.aos_happens(observer.latitude)
        || (geostationary && observation.elevation < 0.0);
    if never_rises {
        return Classification::NeverRises;
    }
    if observation.elevation >= 0.0 {
        return Classification::Above;
    }
    match entry.next_aos {
        Some(aos) if aos - time < RISE_SOON_THRESHOLD => Classification::WillRiseSoon,
        Some(_) => Classification::WillRiseLater,
        // AOS search failed even though the geometry allows passes;
        // treat as never rising rather than leaving it unclassified
        None => Classification::NeverRises,
    }
}

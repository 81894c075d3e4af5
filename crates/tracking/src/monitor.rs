use std::collections::HashMap;

use model::event::TrackingEvent;
use model::fix::LocationFix;
use model::sector::Sector;
use model::tracking::{SectorHistoryEntry, TrackingSnapshot, TrackingState};
use utility::id::Id;

use crate::catalog::SectorCatalog;
use crate::settings::TrackingSettings;

/// Detection threshold while outside a sector.
pub const ENTRY_THRESHOLD_M: f64 = 80.0;
/// Looser re-check threshold while inside, so boundary noise does not
/// flicker the membership.
pub const EXIT_THRESHOLD_M: f64 = 120.0;

/// Minimum interval between processed fixes. Everything arriving earlier is
/// dropped, which also swallows backdated fixes (negative difference).
const MIN_CHECK_INTERVAL_MS: i64 = 500;

const ENTRY_CONFIRMATION_FIXES: u32 = 2;
const EXIT_CONFIRMATION_FIXES: u32 = 3;

/// Readings feeding the short-window recent average.
const RECENT_WINDOW: usize = 10;
const PREDICTION_SESSION_WEIGHT: f64 = 0.7;
const PREDICTION_RECENT_WEIGHT: f64 = 0.3;

/// Below this remaining distance a recommendation is pointless.
const MIN_RECOMMENDATION_REMAINING_M: f64 = 50.0;
/// A recommendation further than this below the limit counts as infeasible.
const RECOMMENDATION_UNDERSHOOT_KMH: f64 = 20.0;

const PROGRESS_THRESHOLDS: [f64; 2] = [0.33, 0.66];

const HISTORY_CAP: usize = 50;

const SPEED_VIOLATION_INTERVAL_MS: i64 = 30_000;
const AVERAGE_VIOLATION_INTERVAL_MS: i64 = 60_000;

/// The sector tracking state machine: a sequential reducer over
/// `(state, fix) -> state'` plus emitted events. Two states only, `IDLE`
/// (no current sector) and `IN_SECTOR`, cycling indefinitely.
///
/// Not internally concurrent; callers own the single stream of fixes and
/// read state through cloned snapshots.
pub struct SectorMonitor {
    state: TrackingState,
    /// Completed sessions, newest first, capped at `HISTORY_CAP`.
    history: Vec<SectorHistoryEntry>,
    entry_candidate: Option<Id<Sector>>,
    speed_violation_log: HashMap<Id<Sector>, i64>,
    average_violation_log: HashMap<Id<Sector>, i64>,
}

impl Default for SectorMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SectorMonitor {
    pub fn new() -> Self {
        Self {
            state: TrackingState::default(),
            history: Vec::new(),
            entry_candidate: None,
            speed_violation_log: HashMap::new(),
            average_violation_log: HashMap::new(),
        }
    }

    /// Cloned snapshot of the current state. Readers never see references
    /// into the mutable state.
    pub fn state(&self) -> TrackingState {
        self.state.clone()
    }

    pub fn history(&self) -> &[SectorHistoryEntry] {
        &self.history
    }

    /// Advances the state machine by one fix. The fix timestamp is the
    /// reducer's clock.
    pub fn process_fix(
        &mut self,
        catalog: &SectorCatalog,
        settings: &TrackingSettings,
        fix: &LocationFix,
    ) -> Vec<TrackingEvent> {
        let mut events = Vec::new();
        let now = fix.timestamp_ms;

        // debounce gate
        if now - self.state.last_check_time_ms < MIN_CHECK_INTERVAL_MS {
            return events;
        }
        if !fix.is_valid() {
            log::warn!(
                "dropping malformed fix at {} ({}, {})",
                fix.timestamp_ms,
                fix.latitude,
                fix.longitude
            );
            return events;
        }
        self.state.last_check_time_ms = now;

        match self.state.current_sector_id.clone() {
            None => self.process_idle(catalog, settings, fix, now, &mut events),
            Some(id) => self.process_in_sector(catalog, settings, &id, fix, now, &mut events),
        }

        events
    }

    fn process_idle(
        &mut self,
        catalog: &SectorCatalog,
        settings: &TrackingSettings,
        fix: &LocationFix,
        now: i64,
        events: &mut Vec<TrackingEvent>,
    ) {
        let candidate = catalog.find_containing(fix.latitude, fix.longitude, ENTRY_THRESHOLD_M);
        match candidate {
            Some(sector) => {
                if self.entry_candidate.as_ref() == Some(&sector.id) {
                    self.state.entry_confirmation_count += 1;
                } else {
                    self.entry_candidate = Some(sector.id.clone());
                    self.state.entry_confirmation_count = 1;
                }

                if self.state.entry_confirmation_count >= ENTRY_CONFIRMATION_FIXES {
                    self.commit_entry(sector, fix, now, events);
                    self.update_metrics(sector, settings, fix, now, events);
                }
            }
            None => {
                self.entry_candidate = None;
                self.state.entry_confirmation_count = 0;
            }
        }
    }

    fn commit_entry(
        &mut self,
        sector: &Sector,
        fix: &LocationFix,
        now: i64,
        events: &mut Vec<TrackingEvent>,
    ) {
        log::info!(
            "entered sector '{}' (limit {} km/h)",
            sector.id,
            sector.speed_limit_kmh
        );

        self.state.current_sector_id = Some(sector.id.clone());
        self.state.entry_time_ms = Some(now);
        self.state.speed_readings = Vec::new();
        self.state.current_average_speed = 0.0;
        self.state.predicted_average_speed = 0.0;
        self.state.will_exceed_limit = false;
        self.state.progress = 0.0;
        self.state.total_distance_m = sector.total_route_distance_m();
        self.state.distance_traveled_m = 0.0;
        self.state.recommended_speed_kmh = None;
        self.state.entry_confirmation_count = 0;
        self.state.exit_confirmation_count = 0;
        self.state.last_progress_threshold_notified = 0.0;
        self.entry_candidate = None;

        events.push(TrackingEvent::SectorEntered {
            sector_id: sector.id.clone(),
            sector_name: sector.name.clone(),
            speed_limit_kmh: sector.speed_limit_kmh,
            current_speed_kmh: fix.speed_kmh,
        });
    }

    fn process_in_sector(
        &mut self,
        catalog: &SectorCatalog,
        settings: &TrackingSettings,
        sector_id: &Id<Sector>,
        fix: &LocationFix,
        now: i64,
        events: &mut Vec<TrackingEvent>,
    ) {
        let sector = match catalog.get(sector_id) {
            Some(sector) => sector,
            None => {
                // catalog no longer knows the sector, nothing to track against
                log::error!("current sector '{}' missing from catalog, resetting", sector_id);
                self.state.reset_to_idle();
                return;
            }
        };

        if sector.is_near(fix.latitude, fix.longitude, EXIT_THRESHOLD_M) {
            self.state.exit_confirmation_count = 0;
        } else {
            self.state.exit_confirmation_count += 1;
            if self.state.exit_confirmation_count >= EXIT_CONFIRMATION_FIXES {
                self.commit_exit(sector, now, events);
                return;
            }
        }

        self.update_metrics(sector, settings, fix, now, events);
    }

    fn commit_exit(&mut self, sector: &Sector, now: i64, events: &mut Vec<TrackingEvent>) {
        let average = self.state.current_average_speed;
        let exceeded = average > sector.speed_limit_kmh;
        let entry_time = self.state.entry_time_ms.unwrap_or(now);

        log::info!(
            "exited sector '{}' with average {:.1} km/h (limit {})",
            sector.id,
            average,
            sector.speed_limit_kmh
        );

        let entry = SectorHistoryEntry {
            sector_id: sector.id.clone(),
            sector_name: sector.name.clone(),
            timestamp_ms: now,
            average_speed_kmh: average,
            speed_limit_kmh: sector.speed_limit_kmh,
            exceeded,
            duration_ms: now - entry_time,
        };
        self.history.insert(0, entry);
        self.history.truncate(HISTORY_CAP);

        events.push(TrackingEvent::SectorExited {
            sector_id: sector.id.clone(),
            sector_name: sector.name.clone(),
            average_speed_kmh: average,
            exceeded,
        });

        self.state.reset_to_idle();
        self.entry_candidate = None;
    }

    /// Speed, prediction, recommendation, progress and violation checks.
    /// Runs on every accepted fix while inside a sector.
    fn update_metrics(
        &mut self,
        sector: &Sector,
        settings: &TrackingSettings,
        fix: &LocationFix,
        now: i64,
        events: &mut Vec<TrackingEvent>,
    ) {
        if !self.state.is_in_sector() {
            // guard: never meaningful while idle
            return;
        }

        let limit = sector.speed_limit_kmh;

        // running and predicted average
        self.state.speed_readings.push(fix.speed_kmh);
        let readings = &self.state.speed_readings;
        let current_average = readings.iter().sum::<f64>() / readings.len() as f64;
        let recent_count = readings.len().min(RECENT_WINDOW);
        let recent_average = readings[readings.len() - recent_count..]
            .iter()
            .sum::<f64>()
            / recent_count as f64;
        self.state.current_average_speed = current_average;
        self.state.predicted_average_speed = PREDICTION_SESSION_WEIGHT * current_average
            + PREDICTION_RECENT_WEIGHT * recent_average;
        self.state.will_exceed_limit = self.state.predicted_average_speed > limit;

        // recommended speed, only while the session average is over the limit
        self.state.recommended_speed_kmh = if current_average > limit {
            recommended_speed(
                limit,
                self.state.total_distance_m,
                self.state.distance_traveled_m,
                current_average,
            )
        } else {
            None
        };

        // progress along the route
        if let Some(position) = sector.locate_on_route(fix.latitude, fix.longitude) {
            let total = self.state.total_distance_m;
            if total > 0.0 {
                let traveled = position.distance_from_start_m.clamp(0.0, total);
                self.state.distance_traveled_m = traveled;
                self.state.progress = (traveled / total).clamp(0.0, 1.0);

                for threshold in PROGRESS_THRESHOLDS {
                    if self.state.progress >= threshold
                        && self.state.last_progress_threshold_notified < threshold
                    {
                        self.state.last_progress_threshold_notified = threshold;
                        events.push(TrackingEvent::SectorProgress {
                            sector_id: sector.id.clone(),
                            threshold_crossed: threshold,
                            average_speed_kmh: current_average,
                            exceeding: self.state.will_exceed_limit,
                            recommended_speed_kmh: self.state.recommended_speed_kmh,
                        });
                    }
                }
            }
        }

        // instantaneous violation, one per sector per 30 s
        if fix.speed_kmh > limit + settings.speed_violation_margin_kmh {
            let due = self
                .speed_violation_log
                .get(&sector.id)
                .map_or(true, |last| now - last >= SPEED_VIOLATION_INTERVAL_MS);
            if due {
                self.speed_violation_log.insert(sector.id.clone(), now);
                events.push(TrackingEvent::SpeedViolation {
                    sector_id: sector.id.clone(),
                    current_speed_kmh: fix.speed_kmh,
                    average_speed_kmh: current_average,
                    speed_limit_kmh: limit,
                });
            }
        }

        // average violation, one per sector per 60 s
        if current_average > limit {
            let due = self
                .average_violation_log
                .get(&sector.id)
                .map_or(true, |last| now - last >= AVERAGE_VIOLATION_INTERVAL_MS);
            if due {
                self.average_violation_log.insert(sector.id.clone(), now);
                events.push(TrackingEvent::AverageViolation {
                    sector_id: sector.id.clone(),
                    average_speed_kmh: current_average,
                    recommended_speed_kmh: self.state.recommended_speed_kmh,
                    speed_limit_kmh: limit,
                });
            }
        }
    }

    /// Serializes the continuity-relevant part of the state.
    pub fn snapshot(&self, now_ms: i64) -> TrackingSnapshot {
        TrackingSnapshot {
            current_sector_id: self.state.current_sector_id.clone(),
            entry_time_ms: self.state.entry_time_ms,
            speed_readings: self.state.speed_readings.clone(),
            recommended_speed_kmh: self.state.recommended_speed_kmh,
            current_average_speed: self.state.current_average_speed,
            saved_at_ms: now_ms,
        }
    }

    /// Applies a persisted snapshot. The snapshot is the source of truth when
    /// the two execution contexts disagree: a differing persisted sector
    /// overwrites the in-memory one, a missing persisted sector clears it.
    /// When both agree the longer reading list wins.
    pub fn restore(&mut self, snapshot: &TrackingSnapshot, catalog: &SectorCatalog) {
        let persisted = match &snapshot.current_sector_id {
            Some(id) => id,
            None => {
                if self.state.is_in_sector() {
                    log::info!("persisted state has no sector, clearing in-memory session");
                    self.state.reset_to_idle();
                }
                return;
            }
        };

        if self.state.current_sector_id.as_ref() == Some(persisted) {
            if snapshot.speed_readings.len() > self.state.speed_readings.len() {
                self.state.speed_readings = snapshot.speed_readings.clone();
                self.state.current_average_speed = snapshot.current_average_speed;
                self.state.recommended_speed_kmh = snapshot.recommended_speed_kmh;
            }
            return;
        }

        let sector = match catalog.get(persisted) {
            Some(sector) => sector,
            None => {
                log::warn!("persisted sector '{}' missing from catalog, ignoring snapshot", persisted);
                return;
            }
        };

        log::info!("restoring persisted session in sector '{}'", persisted);
        self.state.reset_to_idle();
        self.state.current_sector_id = Some(persisted.clone());
        self.state.entry_time_ms = snapshot.entry_time_ms.or(Some(snapshot.saved_at_ms));
        self.state.speed_readings = snapshot.speed_readings.clone();
        self.state.recommended_speed_kmh = snapshot.recommended_speed_kmh;
        self.state.total_distance_m = sector.total_route_distance_m();

        if self.state.speed_readings.is_empty() {
            self.state.current_average_speed = snapshot.current_average_speed;
        } else {
            let readings = &self.state.speed_readings;
            let current_average = readings.iter().sum::<f64>() / readings.len() as f64;
            let recent_count = readings.len().min(RECENT_WINDOW);
            let recent_average = readings[readings.len() - recent_count..]
                .iter()
                .sum::<f64>()
                / recent_count as f64;
            self.state.current_average_speed = current_average;
            self.state.predicted_average_speed = PREDICTION_SESSION_WEIGHT * current_average
                + PREDICTION_RECENT_WEIGHT * recent_average;
            self.state.will_exceed_limit =
                self.state.predicted_average_speed > sector.speed_limit_kmh;
        }
    }
}

/// The constant speed over the remaining distance that brings the session
/// average exactly to the limit. `None` when the remaining distance is too
/// short to matter or recovery is infeasible.
fn recommended_speed(
    limit_kmh: f64,
    total_m: f64,
    covered_m: f64,
    average_kmh: f64,
) -> Option<f64> {
    let remaining_m = total_m - covered_m;
    if remaining_m < MIN_RECOMMENDATION_REMAINING_M {
        return None;
    }

    let total_km = total_m / 1_000.0;
    let covered_km = covered_m / 1_000.0;
    let remaining_km = remaining_m / 1_000.0;

    let required = (limit_kmh * total_km - average_kmh * covered_km) / remaining_km;

    let floor = (limit_kmh - RECOMMENDATION_UNDERSHOOT_KMH).max(0.0);
    if required < floor {
        // cannot get the average back under the limit anymore
        return None;
    }

    let rounded = required.clamp(floor, limit_kmh).round();
    Some(if rounded >= limit_kmh {
        limit_kmh - 1.0
    } else {
        rounded
    })
}

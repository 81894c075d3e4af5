use std::collections::HashMap;

use model::event::TrackingEvent;
use model::fix::LocationFix;
use model::sector::Sector;
use utility::geo::haversine_distance;
use utility::id::Id;

use crate::catalog::SectorCatalog;
use crate::settings::TrackingSettings;

/// A sector/distance pair is not re-announced within this window.
const REWARN_INTERVAL_MS: i64 = 120_000;

/// Once the vehicle is this far beyond the widest warning distance, the
/// sector's warned record is cleared so the next approach warns again.
const CLEAR_MARGIN_M: f64 = 500.0;

/// Pre-entry approach warnings, independent of the entry/exit state machine.
/// The service only consults this while the vehicle is not inside any sector.
pub struct EarlyWarningWatcher {
    /// distance bucket (meters) -> last warned timestamp, per sector
    warned: HashMap<Id<Sector>, HashMap<i64, i64>>,
}

impl Default for EarlyWarningWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EarlyWarningWatcher {
    pub fn new() -> Self {
        Self {
            warned: HashMap::new(),
        }
    }

    pub fn process(
        &mut self,
        catalog: &SectorCatalog,
        settings: &TrackingSettings,
        fix: &LocationFix,
    ) -> Vec<TrackingEvent> {
        let mut events = Vec::new();
        if !settings.early_warning_enabled || !fix.is_valid() {
            return events;
        }

        let distances = settings.sanitized_distances();
        let max_distance = distances.last().copied().unwrap_or(0.0);
        let now = fix.timestamp_ms;

        for sector in catalog.sectors().iter().filter(|sector| sector.active) {
            let to_start = haversine_distance(
                fix.latitude,
                fix.longitude,
                sector.start.latitude,
                sector.start.longitude,
            );

            if to_start > max_distance + CLEAR_MARGIN_M {
                self.warned.remove(&sector.id);
                continue;
            }

            for &distance in &distances {
                if to_start > distance {
                    continue;
                }
                let bucket = distance.round() as i64;
                let due = self
                    .warned
                    .get(&sector.id)
                    .and_then(|buckets| buckets.get(&bucket))
                    .map_or(true, |last| now - last >= REWARN_INTERVAL_MS);
                if due {
                    self.warned
                        .entry(sector.id.clone())
                        .or_default()
                        .insert(bucket, now);
                    events.push(TrackingEvent::SectorApproaching {
                        sector_id: sector.id.clone(),
                        sector_name: sector.name.clone(),
                        speed_limit_kmh: sector.speed_limit_kmh,
                        distance_m: distance,
                    });
                }
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::sector::SectorEndpoint;

    fn catalog() -> SectorCatalog {
        SectorCatalog::new(vec![Sector {
            id: Id::new("a7-nord".to_owned()),
            name: "A7 Nord".to_owned(),
            speed_limit_kmh: 100.0,
            start: SectorEndpoint::new(54.0, 10.0),
            end: SectorEndpoint::new(54.02, 10.0),
            active: true,
            route: None,
        }])
    }

    /// A fix `south_m` meters south of the sector start.
    fn fix_at(south_m: f64, t: i64) -> LocationFix {
        LocationFix::new(54.0 - south_m / 111_195.0, 10.0, 90.0, t)
    }

    fn approaching_distances(events: &[TrackingEvent]) -> Vec<f64> {
        events
            .iter()
            .filter_map(|e| match e {
                TrackingEvent::SectorApproaching { distance_m, .. } => Some(*distance_m),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn countdown_warns_each_distance_once() {
        let catalog = catalog();
        let settings = TrackingSettings::default();
        let mut watcher = EarlyWarningWatcher::new();

        let far = watcher.process(&catalog, &settings, &fix_at(2_800.0, 1_000));
        assert_eq!(approaching_distances(&far), vec![3_000.0]);

        let mid = watcher.process(&catalog, &settings, &fix_at(1_800.0, 2_000));
        assert_eq!(approaching_distances(&mid), vec![2_000.0]);

        let near = watcher.process(&catalog, &settings, &fix_at(800.0, 3_000));
        assert_eq!(approaching_distances(&near), vec![1_000.0]);

        // still 800 m out: everything has been announced already
        let again = watcher.process(&catalog, &settings, &fix_at(800.0, 4_000));
        assert!(approaching_distances(&again).is_empty());
    }

    #[test]
    fn close_approach_announces_every_matching_distance() {
        let catalog = catalog();
        let settings = TrackingSettings::default();
        let mut watcher = EarlyWarningWatcher::new();
        // popping up 800 m out matches all three thresholds at once
        let events = watcher.process(&catalog, &settings, &fix_at(800.0, 1_000));
        assert_eq!(
            approaching_distances(&events),
            vec![1_000.0, 2_000.0, 3_000.0]
        );
    }

    #[test]
    fn rewarns_after_the_interval() {
        let catalog = catalog();
        let settings = TrackingSettings {
            warning_distances_m: vec![1_000.0],
            ..TrackingSettings::default()
        };
        let mut watcher = EarlyWarningWatcher::new();

        assert_eq!(
            approaching_distances(&watcher.process(&catalog, &settings, &fix_at(800.0, 1_000))),
            vec![1_000.0]
        );
        assert!(watcher
            .process(&catalog, &settings, &fix_at(800.0, 60_000))
            .is_empty());
        assert_eq!(
            approaching_distances(&watcher.process(
                &catalog,
                &settings,
                &fix_at(800.0, 1_000 + 120_000)
            )),
            vec![1_000.0]
        );
    }

    #[test]
    fn moving_away_clears_the_warned_record() {
        let catalog = catalog();
        let settings = TrackingSettings {
            warning_distances_m: vec![1_000.0],
            ..TrackingSettings::default()
        };
        let mut watcher = EarlyWarningWatcher::new();

        watcher.process(&catalog, &settings, &fix_at(800.0, 1_000));
        // beyond max(distances) + 500 m clears the record
        watcher.process(&catalog, &settings, &fix_at(1_600.0, 2_000));
        // approaching again warns immediately, no 120 s wait
        let events = watcher.process(&catalog, &settings, &fix_at(800.0, 3_000));
        assert_eq!(approaching_distances(&events), vec![1_000.0]);
    }

    #[test]
    fn disabled_early_warning_is_silent() {
        let catalog = catalog();
        let settings = TrackingSettings {
            early_warning_enabled: false,
            ..TrackingSettings::default()
        };
        let mut watcher = EarlyWarningWatcher::new();
        assert!(watcher
            .process(&catalog, &settings, &fix_at(800.0, 1_000))
            .is_empty());
    }

    #[test]
    fn malformed_distances_fall_back_to_default() {
        let catalog = catalog();
        let settings = TrackingSettings {
            warning_distances_m: vec![f64::NAN, -3.0],
            ..TrackingSettings::default()
        };
        let mut watcher = EarlyWarningWatcher::new();
        let events = watcher.process(&catalog, &settings, &fix_at(800.0, 1_000));
        assert_eq!(approaching_distances(&events), vec![1_000.0]);
    }
}

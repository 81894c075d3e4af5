use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::id::Id;

use crate::sector::Sector;

/// The mutable heart of the tracker. One vehicle, one device; mutated only by
/// the reducer step, all other readers receive cloned snapshots.
///
/// Invariant: `current_sector_id` and `entry_time_ms` are either both set or
/// both empty.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackingState {
    pub current_sector_id: Option<Id<Sector>>,
    pub entry_time_ms: Option<i64>,
    /// Every accepted speed sample since entry. Cleared on entry and exit.
    pub speed_readings: Vec<f64>,
    pub current_average_speed: f64,
    pub predicted_average_speed: f64,
    pub will_exceed_limit: bool,
    /// Fraction of the sector route traveled, clamped to [0, 1]. Not forced
    /// monotonic: GPS noise can move the nearest-segment index backward.
    pub progress: f64,
    pub total_distance_m: f64,
    pub distance_traveled_m: f64,
    /// `None` means no recommendation needed, or recovery is infeasible.
    pub recommended_speed_kmh: Option<f64>,
    pub entry_confirmation_count: u32,
    pub exit_confirmation_count: u32,
    /// Highest of {0, 0.33, 0.66} already announced this session.
    pub last_progress_threshold_notified: f64,
    pub last_check_time_ms: i64,
}

impl Default for TrackingState {
    fn default() -> Self {
        Self {
            current_sector_id: None,
            entry_time_ms: None,
            speed_readings: Vec::new(),
            current_average_speed: 0.0,
            predicted_average_speed: 0.0,
            will_exceed_limit: false,
            progress: 0.0,
            total_distance_m: 0.0,
            distance_traveled_m: 0.0,
            recommended_speed_kmh: None,
            entry_confirmation_count: 0,
            exit_confirmation_count: 0,
            last_progress_threshold_notified: 0.0,
            last_check_time_ms: 0,
        }
    }
}

impl TrackingState {
    pub fn is_in_sector(&self) -> bool {
        self.current_sector_id.is_some()
    }

    /// Clears every session-scoped field, keeping only the debounce clock.
    pub fn reset_to_idle(&mut self) {
        let last_check_time_ms = self.last_check_time_ms;
        *self = Self {
            last_check_time_ms,
            ..Self::default()
        };
    }
}

/// Immutable record of one completed sector session, created exactly once at
/// confirmed exit.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SectorHistoryEntry {
    pub sector_id: Id<Sector>,
    pub sector_name: String,
    pub timestamp_ms: i64,
    pub average_speed_kmh: f64,
    pub speed_limit_kmh: f64,
    pub exceeded: bool,
    pub duration_ms: i64,
}

/// Serialized continuity state handed across process suspension. The
/// persisted snapshot is the source of truth when the two execution contexts
/// disagree.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSnapshot {
    pub current_sector_id: Option<Id<Sector>>,
    pub entry_time_ms: Option<i64>,
    pub speed_readings: Vec<f64>,
    pub recommended_speed_kmh: Option<f64>,
    pub current_average_speed: f64,
    pub saved_at_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_keeps_debounce_clock() {
        let mut state = TrackingState {
            current_sector_id: Some(Id::new("x".to_owned())),
            entry_time_ms: Some(1_000),
            speed_readings: vec![90.0, 100.0],
            last_check_time_ms: 5_000,
            ..TrackingState::default()
        };
        state.reset_to_idle();
        assert!(!state.is_in_sector());
        assert!(state.entry_time_ms.is_none());
        assert!(state.speed_readings.is_empty());
        assert_eq!(state.last_check_time_ms, 5_000);
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let snapshot = TrackingSnapshot {
            current_sector_id: Some(Id::new("a7-nord".to_owned())),
            entry_time_ms: Some(1_700_000_000_000),
            speed_readings: vec![98.0, 102.0],
            recommended_speed_kmh: Some(85.0),
            current_average_speed: 100.0,
            saved_at_ms: 1_700_000_060_000,
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: TrackingSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.current_sector_id, snapshot.current_sector_id);
        assert_eq!(back.entry_time_ms, snapshot.entry_time_ms);
        assert_eq!(back.speed_readings, snapshot.speed_readings);
    }
}

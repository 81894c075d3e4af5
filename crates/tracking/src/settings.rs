use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_WARNING_DISTANCES_M: [f64; 3] = [1_000.0, 2_000.0, 3_000.0];
pub const FALLBACK_WARNING_DISTANCE_M: f64 = 1_000.0;

/// Configuration supplied by the host's settings collaborator. Read-only to
/// the core; malformed values are repaired by `sanitized_distances`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSettings {
    pub early_warning_enabled: bool,
    pub warning_distances_m: Vec<f64>,
    pub sound_enabled: bool,
    /// Instantaneous speed must exceed the limit by this much before a
    /// speed-violation event fires.
    pub speed_violation_margin_kmh: f64,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            early_warning_enabled: true,
            warning_distances_m: DEFAULT_WARNING_DISTANCES_M.to_vec(),
            sound_enabled: true,
            speed_violation_margin_kmh: 5.0,
        }
    }
}

impl TrackingSettings {
    /// Warning distances with garbage removed: finite, positive, sorted
    /// ascending, deduplicated. An empty result falls back to a single
    /// default distance.
    pub fn sanitized_distances(&self) -> Vec<f64> {
        let mut distances: Vec<f64> = self
            .warning_distances_m
            .iter()
            .copied()
            .filter(|d| d.is_finite() && *d > 0.0)
            .collect();
        distances.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        distances.dedup();

        if distances.is_empty() {
            vec![FALLBACK_WARNING_DISTANCE_M]
        } else {
            distances
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_distances_pass_through() {
        let settings = TrackingSettings::default();
        assert_eq!(settings.sanitized_distances(), vec![1_000.0, 2_000.0, 3_000.0]);
    }

    #[test]
    fn garbage_is_dropped_and_sorted() {
        let settings = TrackingSettings {
            warning_distances_m: vec![3_000.0, f64::NAN, -500.0, 1_000.0, 1_000.0],
            ..TrackingSettings::default()
        };
        assert_eq!(settings.sanitized_distances(), vec![1_000.0, 3_000.0]);
    }

    #[test]
    fn empty_list_falls_back_to_default() {
        let settings = TrackingSettings {
            warning_distances_m: vec![],
            ..TrackingSettings::default()
        };
        assert_eq!(settings.sanitized_distances(), vec![FALLBACK_WARNING_DISTANCE_M]);

        let settings = TrackingSettings {
            warning_distances_m: vec![f64::NAN, -1.0],
            ..TrackingSettings::default()
        };
        assert_eq!(settings.sanitized_distances(), vec![FALLBACK_WARNING_DISTANCE_M]);
    }
}

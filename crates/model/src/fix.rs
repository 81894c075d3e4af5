use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One GPS sample. Produced externally at irregular intervals; never stored
/// beyond the current reducer step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub speed_kmh: f64,
    pub timestamp_ms: i64,
}

impl LocationFix {
    pub fn new(latitude: f64, longitude: f64, speed_kmh: f64, timestamp_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            speed_kmh,
            timestamp_ms,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
            && self.speed_kmh.is_finite()
            && self.speed_kmh >= 0.0
    }
}

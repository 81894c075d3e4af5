use chrono::{DateTime, TimeZone, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::id::Id;

use crate::sector::Sector;
use crate::tracking::SectorHistoryEntry;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ViolationType {
    Speeding,
    Normal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct ViolationLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// The record handed to the external storage backend on sector exit.
/// Field names are the storage wire schema, hence no renames.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ViolationReport {
    pub device_id: String,
    pub sector_id: Id<Sector>,
    pub sector_name: String,
    pub speed_limit: f64,
    pub current_speed: f64,
    pub violation_type: ViolationType,
    pub location: ViolationLocation,
    pub timestamp: DateTime<Utc>,
}

impl ViolationReport {
    pub fn from_history(
        entry: &SectorHistoryEntry,
        latitude: f64,
        longitude: f64,
        device_id: &str,
    ) -> Self {
        let timestamp = Utc
            .timestamp_millis_opt(entry.timestamp_ms)
            .single()
            .unwrap_or_else(Utc::now);
        Self {
            device_id: device_id.to_owned(),
            sector_id: entry.sector_id.clone(),
            sector_name: entry.sector_name.clone(),
            speed_limit: entry.speed_limit_kmh,
            current_speed: entry.average_speed_kmh,
            violation_type: if entry.exceeded {
                ViolationType::Speeding
            } else {
                ViolationType::Normal
            },
            location: ViolationLocation {
                latitude,
                longitude,
            },
            timestamp,
        }
    }
}

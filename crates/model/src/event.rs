use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::id::Id;

use crate::sector::Sector;

/// Lifecycle and alert events emitted by the tracker, consumed by the UI and
/// the notification-content collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TrackingEvent {
    #[serde(rename_all = "camelCase")]
    SectorEntered {
        sector_id: Id<Sector>,
        sector_name: String,
        speed_limit_kmh: f64,
        current_speed_kmh: f64,
    },
    #[serde(rename_all = "camelCase")]
    SectorProgress {
        sector_id: Id<Sector>,
        /// 0.33 or 0.66, each announced at most once per session.
        threshold_crossed: f64,
        average_speed_kmh: f64,
        exceeding: bool,
        recommended_speed_kmh: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    SectorExited {
        sector_id: Id<Sector>,
        sector_name: String,
        average_speed_kmh: f64,
        exceeded: bool,
    },
    /// Instantaneous speed over the limit by the configured margin.
    /// Rate-limited to one per sector per 30 s.
    #[serde(rename_all = "camelCase")]
    SpeedViolation {
        sector_id: Id<Sector>,
        current_speed_kmh: f64,
        average_speed_kmh: f64,
        speed_limit_kmh: f64,
    },
    /// Session average over the limit. Rate-limited to one per sector per 60 s.
    #[serde(rename_all = "camelCase")]
    AverageViolation {
        sector_id: Id<Sector>,
        average_speed_kmh: f64,
        recommended_speed_kmh: Option<f64>,
        speed_limit_kmh: f64,
    },
    /// Pre-entry early warning, independent of the entry/exit state machine.
    #[serde(rename_all = "camelCase")]
    SectorApproaching {
        sector_id: Id<Sector>,
        sector_name: String,
        speed_limit_kmh: f64,
        distance_m: f64,
    },
}

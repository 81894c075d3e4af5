use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::geo::haversine_distance;
use utility::id::{HasId, Id};

use crate::route::{RoutePolyline, RoutePosition};

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SectorEndpoint {
    pub latitude: f64,
    pub longitude: f64,
    pub kilometer_marker: Option<f64>,
}

impl SectorEndpoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            kilometer_marker: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// A fixed stretch of road with a speed limit enforced by average speed
/// between its two endpoints. Immutable after catalog load; only the route
/// polyline is attached later, replaced wholesale by the route provider.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Sector {
    pub id: Id<Sector>,
    pub name: String,
    pub speed_limit_kmh: f64,
    pub start: SectorEndpoint,
    pub end: SectorEndpoint,
    pub active: bool,
    pub route: Option<RoutePolyline>,
}

impl HasId for Sector {
    type IdType = String;
}

impl Sector {
    pub fn is_valid(&self) -> bool {
        self.speed_limit_kmh.is_finite()
            && self.speed_limit_kmh > 0.0
            && self.start.is_valid()
            && self.end.is_valid()
    }

    /// The two-point fallback geometry used whenever no resolved route is
    /// available. Valid for distance math, but not a real route.
    pub fn straight_line(&self) -> RoutePolyline {
        RoutePolyline::straight_line(&self.start, &self.end)
    }

    /// Whether a position lies within `threshold_m` of this sector: any route
    /// segment (straight-line fallback when no route is resolved), or either
    /// raw endpoint.
    pub fn is_near(&self, latitude: f64, longitude: f64, threshold_m: f64) -> bool {
        let to_start = haversine_distance(
            latitude,
            longitude,
            self.start.latitude,
            self.start.longitude,
        );
        let to_end =
            haversine_distance(latitude, longitude, self.end.latitude, self.end.longitude);
        if to_start <= threshold_m || to_end <= threshold_m {
            return true;
        }

        match self.geometry_min_distance(latitude, longitude) {
            Some(distance) => distance <= threshold_m,
            None => false,
        }
    }

    /// Total length of the sector along its route, or along the straight line
    /// between the endpoints when no route is resolved.
    pub fn total_route_distance_m(&self) -> f64 {
        match &self.route {
            Some(route) if route.points.len() >= 2 => route.total_distance_m(),
            _ => self.straight_line().total_distance_m(),
        }
    }

    /// Locates a position along the sector geometry (route or fallback).
    pub fn locate_on_route(&self, latitude: f64, longitude: f64) -> Option<RoutePosition> {
        match &self.route {
            Some(route) if route.points.len() >= 2 => route.locate(latitude, longitude),
            _ => self.straight_line().locate(latitude, longitude),
        }
    }

    fn geometry_min_distance(&self, latitude: f64, longitude: f64) -> Option<f64> {
        match &self.route {
            Some(route) if route.points.len() >= 2 => {
                route.min_distance_to(latitude, longitude)
            }
            _ => self.straight_line().min_distance_to(latitude, longitude),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use utility::id::Id;

    fn sector(limit: f64) -> Sector {
        Sector {
            id: Id::new("a7-nord".to_owned()),
            name: "A7 Nord".to_owned(),
            speed_limit_kmh: limit,
            start: SectorEndpoint::new(54.0, 10.0),
            end: SectorEndpoint::new(54.02, 10.0),
            active: true,
            route: None,
        }
    }

    #[test]
    fn rejects_non_positive_limit() {
        assert!(sector(100.0).is_valid());
        assert!(!sector(0.0).is_valid());
        assert!(!sector(-30.0).is_valid());
        assert!(!sector(f64::NAN).is_valid());
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        let mut s = sector(100.0);
        s.start.latitude = 91.0;
        assert!(!s.is_valid());
    }

    #[test]
    fn straight_line_has_two_points() {
        let line = sector(100.0).straight_line();
        assert_eq!(line.points.len(), 2);
        assert!(!line.is_real_route());
    }

    #[test]
    fn is_near_uses_fallback_geometry() {
        let s = sector(100.0);
        // on the line, halfway between the endpoints
        assert!(s.is_near(54.01, 10.0, 80.0));
        // ~110 m east of the line
        assert!(!s.is_near(54.01, 10.0017, 80.0));
        assert!(s.is_near(54.01, 10.0017, 120.0));
    }

    #[test]
    fn total_distance_from_fallback() {
        let s = sector(100.0);
        let total = s.total_route_distance_m();
        assert!((total - 2_224.0).abs() < 10.0);
    }
}

use itertools::Itertools;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::geo::{haversine_distance, point_to_segment_distance};

use crate::sector::SectorEndpoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoutePoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl RoutePoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

/// Where a fix sits relative to a route: how far along it, and how far off it.
#[derive(Debug, Clone, Copy)]
pub struct RoutePosition {
    pub distance_from_start_m: f64,
    pub distance_to_route_m: f64,
}

/// Ordered sequence of points approximating the road between two sector
/// endpoints. A two-point polyline is the straight-line fallback: usable for
/// distance and progress math, but excluded from consumers that need a real
/// resolved route (`is_real_route`).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoutePolyline {
    pub points: Vec<RoutePoint>,
}

impl RoutePolyline {
    pub fn new(points: Vec<RoutePoint>) -> Self {
        Self { points }
    }

    pub fn straight_line(start: &SectorEndpoint, end: &SectorEndpoint) -> Self {
        Self {
            points: vec![
                RoutePoint::new(start.longitude, start.latitude),
                RoutePoint::new(end.longitude, end.latitude),
            ],
        }
    }

    pub fn is_real_route(&self) -> bool {
        self.points.len() >= 3
    }

    pub fn total_distance_m(&self) -> f64 {
        self.points
            .iter()
            .tuple_windows()
            .map(|(a, b)| haversine_distance(a.latitude, a.longitude, b.latitude, b.longitude))
            .sum()
    }

    /// Smallest distance from the given position to any segment of the route,
    /// in meters. Returns `None` for polylines with fewer than two points.
    pub fn min_distance_to(&self, latitude: f64, longitude: f64) -> Option<f64> {
        self.points
            .iter()
            .tuple_windows()
            .map(|(a, b)| {
                point_to_segment_distance(
                    latitude,
                    longitude,
                    a.latitude,
                    a.longitude,
                    b.latitude,
                    b.longitude,
                )
            })
            .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Locates the nearest point on the route. The distance from the start is
    /// the sum of all full segments before the nearest one plus the partial
    /// distance along it. Returns `None` for polylines with fewer than two
    /// points.
    pub fn locate(&self, latitude: f64, longitude: f64) -> Option<RoutePosition> {
        let mut cumulative = 0.0;
        let mut best: Option<RoutePosition> = None;

        for (a, b) in self.points.iter().tuple_windows() {
            let segment_length =
                haversine_distance(a.latitude, a.longitude, b.latitude, b.longitude);
            let distance = point_to_segment_distance(
                latitude,
                longitude,
                a.latitude,
                a.longitude,
                b.latitude,
                b.longitude,
            );

            let best_so_far = best.map_or(f64::INFINITY, |b| b.distance_to_route_m);
            if distance < best_so_far {
                let t = projection_parameter(latitude, longitude, a, b);
                best = Some(RoutePosition {
                    distance_from_start_m: cumulative + t * segment_length,
                    distance_to_route_m: distance,
                });
            }

            cumulative += segment_length;
        }

        best
    }
}

/// Clamped projection parameter of the point onto a segment, in the same
/// planar approximation the distance uses.
fn projection_parameter(latitude: f64, longitude: f64, a: &RoutePoint, b: &RoutePoint) -> f64 {
    let dlat = b.latitude - a.latitude;
    let dlon = b.longitude - a.longitude;
    let length_squared = dlat * dlat + dlon * dlon;
    if length_squared == 0.0 {
        return 0.0;
    }
    let t = ((latitude - a.latitude) * dlat + (longitude - a.longitude) * dlon) / length_squared;
    t.clamp(0.0, 1.0)
}

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

fn to_radians(degrees: f64) -> f64 {
    degrees * std::f64::consts::PI / 180.0
}

pub fn haversine_distance(
    latitude_1: f64,
    longitude_1: f64,
    latitude_2: f64,
    longitude_2: f64,
) -> f64 {
    let lat1_rad = to_radians(latitude_1);
    let lon1_rad = to_radians(longitude_1);
    let lat2_rad = to_radians(latitude_2);
    let lon2_rad = to_radians(longitude_2);

    let dlat = lat2_rad - lat1_rad;
    let dlon = lon2_rad - lon1_rad;

    let a = (dlat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Distance in meters from a point to the closest point on a segment.
/// The projection treats latitude/longitude deltas as planar coordinates,
/// which is accurate enough at sector scale (single-digit kilometers).
pub fn point_to_segment_distance(
    latitude: f64,
    longitude: f64,
    start_latitude: f64,
    start_longitude: f64,
    end_latitude: f64,
    end_longitude: f64,
) -> f64 {
    let dlat = end_latitude - start_latitude;
    let dlon = end_longitude - start_longitude;

    let length_squared = dlat * dlat + dlon * dlon;
    if length_squared == 0.0 {
        // degenerate segment
        return haversine_distance(latitude, longitude, start_latitude, start_longitude);
    }

    let t = ((latitude - start_latitude) * dlat + (longitude - start_longitude) * dlon)
        / length_squared;
    let t = t.clamp(0.0, 1.0);

    let nearest_latitude = start_latitude + t * dlat;
    let nearest_longitude = start_longitude + t * dlon;

    haversine_distance(latitude, longitude, nearest_latitude, nearest_longitude)
}

use crate::gtfs::{RoutePoint, ShapeIndex};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two WGS-84 coordinates, in meters.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Forward azimuth from one coordinate to another, in degrees [0, 360).
///
/// An identical pair of coordinates has no defined azimuth; this returns 0.0
/// rather than letting NaN escape into rendering.
pub fn bearing(from_lat: f64, from_lon: f64, to_lat: f64, to_lon: f64) -> f64 {
    if from_lat == to_lat && from_lon == to_lon {
        return 0.0;
    }

    let lat1 = from_lat.to_radians();
    let lat2 = to_lat.to_radians();
    let delta_lon = (to_lon - from_lon).to_radians();

    let x = delta_lon.sin() * lat2.cos();
    let y = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lon.cos();

    let degrees = x.atan2(y).to_degrees();
    ((degrees % 360.0) + 360.0) % 360.0
}

/// The two distinct route vertices nearest to a position, by planar
/// approximation, with the lower index first.
///
/// The pair approximates the local tangent of the route, which is what gives
/// a vehicle its heading when the telemetry carries none. Returns `None` for
/// shapes with fewer than two points. Ties resolve to the earliest vertex.
pub fn closest_segment(points: &[RoutePoint], lat: f64, lon: f64) -> Option<(usize, usize)> {
    if points.len() < 2 {
        return None;
    }

    let planar_sq = |p: &RoutePoint| {
        let dlat = p.lat - lat;
        let dlon = p.lon - lon;
        dlat * dlat + dlon * dlon
    };

    let mut first = 0;
    let mut second = 1;
    if planar_sq(&points[1]) < planar_sq(&points[0]) {
        first = 1;
        second = 0;
    }

    for (idx, point) in points.iter().enumerate().skip(2) {
        let d = planar_sq(point);
        if d < planar_sq(&points[first]) {
            second = first;
            first = idx;
        } else if d < planar_sq(&points[second]) {
            second = idx;
        }
    }

    Some((first.min(second), first.max(second)))
}

/// One entry in the ranked nearest-routes list. Derived, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosestRoute {
    pub route_id: i64,
    pub shape_id: i64,
    pub distance: f64,
    pub color: String,
}

/// Rank all loaded routes by their minimum distance to a position.
///
/// Ascending by distance, deduplicated by route identity (first occurrence
/// wins), truncated to `limit`. Deterministic for identical input: shapes are
/// visited in shape-id order and the sort is stable.
pub fn rank_closest_routes(
    lat: f64,
    lon: f64,
    index: &ShapeIndex,
    limit: usize,
) -> Vec<ClosestRoute> {
    let mut ranked: Vec<ClosestRoute> = Vec::new();

    for (&shape_id, points) in index.shapes() {
        if points.is_empty() {
            continue;
        }
        let Some(route_id) = index.route_for_shape(shape_id) else {
            continue;
        };

        let min_distance = points
            .iter()
            .map(|p| haversine_distance(lat, lon, p.lat, p.lon))
            .fold(f64::INFINITY, f64::min);

        ranked.push(ClosestRoute {
            route_id,
            shape_id,
            distance: min_distance,
            color: index.color_for_route(route_id).to_string(),
        });
    }

    ranked.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut seen = std::collections::HashSet::new();
    ranked.retain(|r| seen.insert(r.route_id));
    ranked.truncate(limit);
    ranked
}

use std::collections::{BTreeMap, HashMap};

/// One vertex of a route polyline, in WGS-84 degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutePoint {
    pub lat: f64,
    pub lon: f64,
}

/// Fallback colors for routes that carry none in the static feed.
/// Assignment is deterministic per route so reloads keep the same color.
const FALLBACK_COLORS: [&str; 8] = [
    "#E4572E", "#17BEBB", "#FFC914", "#2E282A", "#76B041", "#9B5DE5", "#00A6ED", "#F15BB5",
];

/// Static lookup from shape geometry to route metadata.
///
/// Loaded once at startup and read-only afterwards; shared freely across
/// components without locking. Point order within a shape is geographic order
/// along the route and is preserved, since it encodes directionality.
#[derive(Debug, Default)]
pub struct ShapeIndex {
    shapes: BTreeMap<i64, Vec<RoutePoint>>,
    shape_to_route: HashMap<i64, i64>,
    route_to_shape: HashMap<i64, i64>,
    route_colors: HashMap<i64, String>,
    route_headsigns: HashMap<i64, String>,
}

impl ShapeIndex {
    pub fn insert_point(&mut self, shape_id: i64, point: RoutePoint) {
        self.shapes.entry(shape_id).or_default().push(point);
    }

    pub fn map_shape_to_route(&mut self, shape_id: i64, route_id: i64) {
        self.shape_to_route.insert(shape_id, route_id);
        // First shape seen for a route is the one used for heading derivation.
        self.route_to_shape.entry(route_id).or_insert(shape_id);
    }

    pub fn set_route_color(&mut self, route_id: i64, color: String) {
        self.route_colors.insert(route_id, color);
    }

    pub fn set_route_headsign(&mut self, route_id: i64, headsign: String) {
        self.route_headsigns.entry(route_id).or_insert(headsign);
    }

    /// All shapes in ascending shape-id order.
    pub fn shapes(&self) -> &BTreeMap<i64, Vec<RoutePoint>> {
        &self.shapes
    }

    pub fn shape_points(&self, shape_id: i64) -> Option<&[RoutePoint]> {
        self.shapes.get(&shape_id).map(Vec::as_slice)
    }

    pub fn route_for_shape(&self, shape_id: i64) -> Option<i64> {
        self.shape_to_route.get(&shape_id).copied()
    }

    /// The polyline a route's heading is derived from.
    pub fn points_for_route(&self, route_id: i64) -> Option<&[RoutePoint]> {
        let shape_id = self.route_to_shape.get(&route_id)?;
        self.shape_points(*shape_id)
    }

    pub fn color_for_route(&self, route_id: i64) -> &str {
        self.route_colors
            .get(&route_id)
            .map(String::as_str)
            .unwrap_or_else(|| {
                FALLBACK_COLORS[route_id.unsigned_abs() as usize % FALLBACK_COLORS.len()]
            })
    }

    pub fn headsign_for_route(&self, route_id: i64) -> Option<&str> {
        self.route_headsigns.get(&route_id).map(String::as_str)
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    pub fn route_count(&self) -> usize {
        self.route_to_shape.len()
    }
}

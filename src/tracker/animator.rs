use crate::geo;
use crate::gtfs::ShapeIndex;
use crate::realtime::batcher::VehicleSnapshot;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

/// A route's visual position.
///
/// Owned exclusively by the [`Reconciler`]; mutated only by replacing the
/// target and restarting the transition. Retargeting starts from the
/// currently rendered position, so the superseded transition can never leak
/// a partially-applied interpolation into the next one.
#[derive(Debug, Clone)]
pub struct AnimatedVehicle {
    pub route_id: i64,
    from: Coordinate,
    target: Coordinate,
    started_at: Instant,
    duration: Duration,
    last_raw_bearing: Option<f32>,
}

impl AnimatedVehicle {
    fn stationary(route_id: i64, at: Coordinate, now: Instant, bearing: Option<f32>) -> Self {
        Self {
            route_id,
            from: at,
            target: at,
            started_at: now,
            duration: Duration::ZERO,
            last_raw_bearing: bearing,
        }
    }

    /// The rendered position at `now`, eased between transition endpoints.
    pub fn position_at(&self, now: Instant) -> Coordinate {
        if self.duration.is_zero() {
            return self.target;
        }
        let elapsed = now
            .checked_duration_since(self.started_at)
            .unwrap_or(Duration::ZERO);
        let t = (elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0);
        let eased = ease_in_out_cubic(t);

        Coordinate {
            lat: self.from.lat + (self.target.lat - self.from.lat) * eased,
            lon: self.from.lon + (self.target.lon - self.from.lon) * eased,
        }
    }

    pub fn target(&self) -> Coordinate {
        self.target
    }

    pub fn in_flight(&self, now: Instant) -> bool {
        now < self.started_at + self.duration
    }
}

/// Cubic ease-in-out: slow start, fast middle, slow settle.
fn ease_in_out_cubic(t: f64) -> f64 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

/// Owns the single animated position per tracked route.
///
/// First snapshot for a route creates the entity with current == target (no
/// animation); every later snapshot cancels the in-flight transition by
/// retargeting from the rendered position. Exactly one transition per route
/// exists at any time. External consumers only read interpolated values.
#[derive(Debug)]
pub struct Reconciler {
    vehicles: HashMap<i64, AnimatedVehicle>,
    transition: Duration,
    /// Moves shorter than this are treated as telemetry noise and skipped,
    /// so jitter-level updates do not restart the animation.
    epsilon_m: f64,
}

impl Reconciler {
    pub fn new(transition: Duration, epsilon_m: f64) -> Self {
        Self {
            vehicles: HashMap::new(),
            transition,
            epsilon_m,
        }
    }

    pub fn apply(&mut self, snapshots: &[VehicleSnapshot], now: Instant) {
        for snapshot in snapshots {
            let target = Coordinate {
                lat: snapshot.latitude,
                lon: snapshot.longitude,
            };

            match self.vehicles.entry(snapshot.route_id) {
                Entry::Vacant(slot) => {
                    slot.insert(AnimatedVehicle::stationary(
                        snapshot.route_id,
                        target,
                        now,
                        snapshot.bearing,
                    ));
                }
                Entry::Occupied(mut slot) => {
                    let vehicle = slot.get_mut();
                    if let Some(bearing) = snapshot.bearing {
                        vehicle.last_raw_bearing = Some(bearing);
                    }

                    let current = vehicle.position_at(now);
                    let moved =
                        geo::haversine_distance(current.lat, current.lon, target.lat, target.lon);
                    if moved < self.epsilon_m {
                        continue;
                    }

                    vehicle.from = current;
                    vehicle.target = target;
                    vehicle.started_at = now;
                    vehicle.duration = self.transition;
                }
            }
        }
    }

    pub fn get(&self, route_id: i64) -> Option<&AnimatedVehicle> {
        self.vehicles.get(&route_id)
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    /// Rendered positions for all tracked routes, in route-id order.
    pub fn positions(&self, now: Instant) -> Vec<(i64, Coordinate)> {
        let mut out: Vec<_> = self
            .vehicles
            .values()
            .map(|v| (v.route_id, v.position_at(now)))
            .collect();
        out.sort_by_key(|&(route_id, _)| route_id);
        out
    }

    /// Heading for rendering, derived from the route's geometry at the
    /// vehicle's rendered position. Telemetry bearing is frequently absent,
    /// so the shape's local tangent is authoritative; the last raw bearing is
    /// only a fallback for degenerate shapes.
    pub fn heading(&self, route_id: i64, shapes: &ShapeIndex, now: Instant) -> Option<f64> {
        let vehicle = self.vehicles.get(&route_id)?;
        let position = vehicle.position_at(now);

        let derived = shapes.points_for_route(route_id).and_then(|points| {
            geo::closest_segment(points, position.lat, position.lon).map(|(a, b)| {
                geo::bearing(
                    points[a].lat,
                    points[a].lon,
                    points[b].lat,
                    points[b].lon,
                )
            })
        });

        Some(derived.unwrap_or_else(|| vehicle.last_raw_bearing.map(f64::from).unwrap_or(0.0)))
    }

    /// Releases every animated entity. Called on tracking teardown.
    pub fn clear(&mut self) {
        self.vehicles.clear();
    }
}

use crate::geo::{self, ClosestRoute};
use crate::gtfs::ShapeIndex;

/// Ranks routes by proximity to the rider.
///
/// Pure recomputation over the shape index; the only state kept is the last
/// rider location, so an unchanged fix does not trigger a redundant ranking.
#[derive(Debug)]
pub struct ProximityRanker {
    limit: usize,
    last_location: Option<(f64, f64)>,
    ranked: Vec<ClosestRoute>,
}

impl ProximityRanker {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            last_location: None,
            ranked: Vec::new(),
        }
    }

    /// Re-rank if the rider moved; otherwise return the memoized result.
    pub fn update(&mut self, lat: f64, lon: f64, shapes: &ShapeIndex) -> &[ClosestRoute] {
        if self.last_location != Some((lat, lon)) {
            self.ranked = geo::rank_closest_routes(lat, lon, shapes, self.limit);
            self.last_location = Some((lat, lon));
        }
        &self.ranked
    }

    pub fn current(&self) -> &[ClosestRoute] {
        &self.ranked
    }

    /// The single nearest route, if any is loaded.
    pub fn nearest(&self) -> Option<&ClosestRoute> {
        self.ranked.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtfs::RoutePoint;

    fn index_with_two_routes() -> ShapeIndex {
        let mut index = ShapeIndex::default();
        index.insert_point(1, RoutePoint { lat: 49.26, lon: -123.25 });
        index.insert_point(1, RoutePoint { lat: 49.27, lon: -123.24 });
        index.insert_point(2, RoutePoint { lat: 49.50, lon: -123.00 });
        index.map_shape_to_route(1, 101);
        index.map_shape_to_route(2, 202);
        index
    }

    #[test]
    fn ranks_and_memoizes() {
        let index = index_with_two_routes();
        let mut ranker = ProximityRanker::new(4);

        let ranked = ranker.update(49.265, -123.245, &index);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].route_id, 101);
        assert_eq!(ranker.nearest().unwrap().route_id, 101);

        // Same location: memoized result stays.
        assert_eq!(ranker.update(49.265, -123.245, &index).len(), 2);
    }

    #[test]
    fn reranks_after_the_rider_moves() {
        let index = index_with_two_routes();
        let mut ranker = ProximityRanker::new(4);

        ranker.update(49.265, -123.245, &index);
        assert_eq!(ranker.nearest().unwrap().route_id, 101);

        let ranked = ranker.update(49.50, -123.00, &index);
        assert_eq!(ranked[0].route_id, 202);
    }

    #[test]
    fn respects_the_limit() {
        let index = index_with_two_routes();
        let mut ranker = ProximityRanker::new(1);
        assert_eq!(ranker.update(49.265, -123.245, &index).len(), 1);
    }
}

use geo::Point;
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

pub static EARTH_RADIUS_APPROX: f64 = 6_371_000f64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedStop {
    pub coords: [f64; 3],
    pub id: usize,
}

impl RTreeObject for IndexedStop {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.coords[0], self.coords[1], self.coords[2]])
    }
}

impl PointDistance for IndexedStop {
    fn distance_2(
        &self,
        point: &<Self::Envelope as rstar::Envelope>::Point,
    ) -> <<Self::Envelope as rstar::Envelope>::Point as rstar::Point>::Scalar {
        (self.coords[0] - point[0]).powi(2)
            + (self.coords[1] - point[1]).powi(2)
            + (self.coords[2] - point[2]).powi(2)
    }
}

pub fn lat_lng_to_cartesian(lat: f64, lng: f64) -> [f64; 3] {
    if !lat.is_finite() || !lng.is_finite() {
        return [0.0; 3];
    }
    let lat = lat.to_radians();
    let lng = lng.to_radians();
    [
        EARTH_RADIUS_APPROX * lat.cos() * lng.sin(),
        EARTH_RADIUS_APPROX * lat.cos() * lng.cos(),
        EARTH_RADIUS_APPROX * lat.sin(),
    ]
}

/// Great-circle distance in meters.
pub fn haversine_meters(from: Point<f64>, to: Point<f64>) -> f64 {
    let lat1 = from.y().to_radians();
    let lat2 = to.y().to_radians();
    let dlat = (to.y() - from.y()).to_radians();
    let dlng = (to.x() - from.x()).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_APPROX * a.sqrt().asin()
}

/// Spatial index over stop locations, used for endpoint snapping and the
/// transfer walk matrix.
pub struct StopTree {
    tree: RTree<IndexedStop>,
}

impl StopTree {
    pub fn build(locations: impl Iterator<Item = (usize, Point<f64>)>) -> StopTree {
        let indexed = locations
            .map(|(id, point)| IndexedStop {
                coords: lat_lng_to_cartesian(point.y(), point.x()),
                id,
            })
            .collect();
        StopTree {
            tree: RTree::bulk_load(indexed),
        }
    }

    /// Stops within `max_meters` of `point`, ordered by distance then id.
    /// Chord distance under-approximates arc distance, so the iterator is
    /// cut off on chord and the exact filter uses the haversine distance.
    pub fn within_meters(&self, point: Point<f64>, max_meters: f64) -> Vec<(usize, f64)> {
        let origin = lat_lng_to_cartesian(point.y(), point.x());
        let mut found = vec![];
        for (stop, dist_sq) in self.tree.nearest_neighbor_iter_with_distance_2(&origin) {
            if dist_sq.sqrt() > max_meters {
                break;
            }
            found.push((stop.id, dist_sq.sqrt()));
        }
        found.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        found
    }
}

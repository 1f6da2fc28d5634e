use chrono::NaiveDateTime;
use geo::Point;

use crate::geomath::haversine_meters;

/// Pedestrian speed used when no street network is available.
pub const DEFAULT_WALK_SPEED_METERS_PER_SECOND: f64 = 1.39;

/// A walking path between two points. Only its cost is of interest here;
/// geometry stays with the street router.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkPath {
    pub duration_secs: u32,
    pub distance_meters: f64,
}

/// Computes a walking path between two geographic points at a given start
/// time. Implementations must be deterministic for fixed inputs.
pub trait StreetRouter {
    fn walk(&self, from: Point<f64>, to: Point<f64>, depart: NaiveDateTime) -> Option<WalkPath>;
}

/// Fallback street router estimating walks along the great circle at
/// constant speed. Used by tests and as the default for builds without a
/// street network.
#[derive(Debug, Clone, Copy)]
pub struct CrowFlightRouter {
    speed_meters_per_second: f64,
}

impl Default for CrowFlightRouter {
    fn default() -> Self {
        CrowFlightRouter {
            speed_meters_per_second: DEFAULT_WALK_SPEED_METERS_PER_SECOND,
        }
    }
}

impl CrowFlightRouter {
    pub fn with_speed(speed_meters_per_second: f64) -> CrowFlightRouter {
        CrowFlightRouter {
            speed_meters_per_second,
        }
    }
}

impl StreetRouter for CrowFlightRouter {
    fn walk(&self, from: Point<f64>, to: Point<f64>, _depart: NaiveDateTime) -> Option<WalkPath> {
        let distance_meters = haversine_meters(from, to);
        Some(WalkPath {
            duration_secs: (distance_meters / self.speed_meters_per_second).round() as u32,
            distance_meters,
        })
    }
}

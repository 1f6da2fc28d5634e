pub mod materialize;
pub mod pareto;
pub mod unfold;

use chrono::{NaiveDateTime, Timelike};
use geo::Point;
use log::debug;
use serde::Serialize;
use thiserror::Error;

use crate::geomath::StopTree;
use crate::pattern::PatternIndex;
use crate::query::materialize::{Endpoint, Materializer, WalkCache};
use crate::query::unfold::unfold;
use crate::street::StreetRouter;
use crate::timetable::{PatternId, ServiceDay, StopId, TimetableOverlay, TimetableView};

/// Endpoint snapping tries a tight radius first, then the request's walk
/// limit, then one expansion of it.
pub const SNAP_RADII_FACTORS: [f64; 2] = [1.0, 1.5];
pub const SNAP_TIGHT_RADIUS_METERS: f64 = 30.0;
/// Candidate stops considered per endpoint.
pub const MAX_ENDPOINT_STOPS: usize = 8;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("no vertex found for {0}")]
    VertexNotFound(String),
    #[error("no transit stop within walking distance of the requested endpoints")]
    PathNotFound,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Place {
    Stop(String),
    Point { lat: f64, lng: f64 },
}

#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub from: Place,
    pub to: Place,
    pub date_time: NaiveDateTime,
    pub max_walk_distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegEndpoint {
    pub stop: Option<String>,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LegKind {
    Walk,
    Transit {
        pattern: String,
        /// Present when this leg exists only under a delay scenario.
        scenario: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Leg {
    pub from: LegEndpoint,
    pub to: LegEndpoint,
    pub depart: NaiveDateTime,
    pub arrive: NaiveDateTime,
    pub kind: LegKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Journey {
    pub depart: NaiveDateTime,
    pub arrive: NaiveDateTime,
    pub transfers: usize,
    pub legs: Vec<Leg>,
}

impl Leg {
    pub fn is_transit(&self) -> bool {
        matches!(self.kind, LegKind::Transit { .. })
    }
}

/// Answers journey queries from a built index, the live timetable view and
/// a street router. Construction validates that the index and the view
/// describe the same network version.
pub struct JourneyPlanner<'a, V: TimetableView + ?Sized, S: StreetRouter + ?Sized> {
    view: &'a V,
    index: &'a PatternIndex,
    streets: &'a S,
    stop_tree: StopTree,
    /// Index stop id → view stop id.
    stop_map: Vec<StopId>,
    /// Index pattern id → view pattern id.
    pattern_map: Vec<PatternId>,
}

impl<'a, V: TimetableView + ?Sized, S: StreetRouter + ?Sized> JourneyPlanner<'a, V, S> {
    pub fn new(
        view: &'a V,
        index: &'a PatternIndex,
        streets: &'a S,
    ) -> Result<JourneyPlanner<'a, V, S>, crate::Error> {
        let stop_map = index
            .stop_labels
            .iter()
            .map(|label| {
                view.stop_id(label)
                    .ok_or_else(|| crate::Error::UnknownStop(label.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let pattern_map = index
            .pattern_codes
            .iter()
            .map(|code| {
                view.pattern_id(code)
                    .ok_or_else(|| crate::Error::UnknownTripPattern(code.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let stop_tree = StopTree::build(
            view.stops()
                .iter()
                .enumerate()
                .map(|(id, stop)| (id, stop.location())),
        );
        Ok(JourneyPlanner {
            view,
            index,
            streets,
            stop_tree,
            stop_map,
            pattern_map,
        })
    }

    /// Expands the precomputed patterns between every candidate endpoint
    /// pair into concrete journeys and returns the Pareto set, ordered for
    /// display. `overlay` is the read-only realtime state, if any.
    pub fn plan(
        &self,
        request: &PlanRequest,
        overlay: Option<&TimetableOverlay>,
    ) -> Result<Vec<Journey>, QueryError> {
        let (sources, start) = self.resolve(&request.from, request.max_walk_distance)?;
        let (targets, end) = self.resolve(&request.to, request.max_walk_distance)?;
        let day = ServiceDay(request.date_time.date());
        let depart_secs = request.date_time.time().num_seconds_from_midnight();

        let materializer = Materializer {
            view: self.view,
            streets: self.streets,
            index: self.index,
            stop_map: &self.stop_map,
            pattern_map: &self.pattern_map,
            day,
            overlay,
        };
        let mut cache = WalkCache::default();
        let mut journeys = vec![];
        for &source in &sources {
            for &target in &targets {
                if source == target {
                    continue;
                }
                let Some(dag) = self.index.target_dag(source, target) else {
                    continue;
                };
                for candidate in unfold(dag) {
                    if let Some(journey) =
                        materializer.materialize(&mut cache, &candidate, start, end, depart_secs)
                    {
                        journeys.push(journey);
                    }
                }
            }
        }
        debug!(
            "Materialized {} candidate journeys for {} source and {} target stops",
            journeys.len(),
            sources.len(),
            targets.len()
        );
        Ok(pareto::filter_and_sort(journeys))
    }

    /// Maps a request place onto candidate stops in the index's identifier
    /// space plus the journey endpoint used for walking legs.
    fn resolve(
        &self,
        place: &Place,
        max_walk_distance: f64,
    ) -> Result<(Vec<StopId>, Endpoint), QueryError> {
        match place {
            Place::Stop(label) => {
                let stop = self
                    .index
                    .stop_id(label)
                    .ok_or_else(|| QueryError::VertexNotFound(label.clone()))?;
                Ok((vec![stop], Endpoint::Stop(stop)))
            }
            Place::Point { lat, lng } => {
                let point = Point::new(*lng, *lat);
                let mut radii = vec![SNAP_TIGHT_RADIUS_METERS];
                radii.extend(
                    SNAP_RADII_FACTORS
                        .iter()
                        .map(|factor| factor * max_walk_distance),
                );
                for radius in radii {
                    let candidates: Vec<StopId> = self
                        .stop_tree
                        .within_meters(point, radius)
                        .into_iter()
                        .filter_map(|(view_stop, _)| {
                            self.index.stop_id(&self.view.stop(view_stop).label)
                        })
                        .take(MAX_ENDPOINT_STOPS)
                        .collect();
                    if !candidates.is_empty() {
                        return Ok((
                            candidates,
                            Endpoint::Point {
                                lat: *lat,
                                lng: *lng,
                            },
                        ));
                    }
                }
                Err(QueryError::PathNotFound)
            }
        }
    }
}

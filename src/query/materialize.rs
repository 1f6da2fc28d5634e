use std::collections::HashMap;

use geo::Point;

use super::unfold::CandidateLeg;
use super::{Journey, Leg, LegEndpoint, LegKind};
use crate::pattern::{PatternIndex, ScenarioId};
use crate::scenario::DelayScenario;
use crate::street::{StreetRouter, WalkPath};
use crate::timetable::{PatternId, ServiceDay, StopId, TimetableOverlay, TimetableView};

/// A journey endpoint during materialization: either a stop in the index's
/// identifier space or a free geographic point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Endpoint {
    Stop(StopId),
    Point { lat: f64, lng: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EndpointKey {
    Stop(StopId),
    Point(u64, u64),
}

fn key_of(endpoint: Endpoint) -> EndpointKey {
    match endpoint {
        Endpoint::Stop(stop) => EndpointKey::Stop(stop),
        Endpoint::Point { lat, lng } => EndpointKey::Point(lat.to_bits(), lng.to_bits()),
    }
}

/// Request-scoped cache of street-router answers, keyed by endpoint pair.
#[derive(Debug, Default)]
pub struct WalkCache {
    paths: HashMap<(EndpointKey, EndpointKey), Option<WalkPath>>,
}

struct WorkLeg {
    from: Endpoint,
    to: Endpoint,
    walking: bool,
    scenario: Option<ScenarioId>,
}

struct TimedLeg {
    from: Endpoint,
    to: Endpoint,
    depart_secs: u32,
    arrive_secs: u32,
    pattern: Option<PatternId>,
    scenario: Option<ScenarioId>,
}

/// Turns unfolded leg sequences into concrete journeys against the live
/// timetable. Any infeasible leg rejects just its own journey.
pub(crate) struct Materializer<'a, V: TimetableView + ?Sized, S: StreetRouter + ?Sized> {
    pub view: &'a V,
    pub streets: &'a S,
    pub index: &'a PatternIndex,
    /// Index stop id → view stop id.
    pub stop_map: &'a [StopId],
    /// Index pattern id → view pattern id.
    pub pattern_map: &'a [PatternId],
    pub day: ServiceDay,
    pub overlay: Option<&'a TimetableOverlay>,
}

impl<'a, V: TimetableView + ?Sized, S: StreetRouter + ?Sized> Materializer<'a, V, S> {
    pub fn materialize(
        &self,
        cache: &mut WalkCache,
        candidate: &[CandidateLeg],
        start: Endpoint,
        end: Endpoint,
        depart_secs: u32,
    ) -> Option<Journey> {
        if candidate.is_empty() {
            return None;
        }
        let mut legs: Vec<WorkLeg> = candidate
            .iter()
            .map(|leg| WorkLeg {
                from: Endpoint::Stop(leg.from),
                to: Endpoint::Stop(leg.to),
                walking: leg.walking,
                scenario: leg.scenario,
            })
            .collect();
        self.attach_endpoints(&mut legs, start, end);

        let mut timed: Vec<TimedLeg> = Vec::with_capacity(legs.len());
        let mut now = depart_secs;
        for leg in &legs {
            if let Some(scenario) = leg.scenario {
                if !self.scenario_applies(scenario) {
                    return None;
                }
            }
            let next = if leg.walking {
                self.materialize_walk(cache, leg, now)?
            } else {
                self.materialize_ride(leg, now)?
            };
            now = next.arrive_secs;
            timed.push(next);
        }
        self.align_walks(&mut timed);
        Some(self.into_journey(timed))
    }

    /// Splices the request endpoints onto the pattern's leg sequence: an
    /// existing walking leg is re-anchored, otherwise a new walking leg
    /// covers the gap.
    fn attach_endpoints(&self, legs: &mut Vec<WorkLeg>, start: Endpoint, end: Endpoint) {
        if legs.first().map(|leg| leg.from) != Some(start) {
            if legs.first().is_some_and(|leg| leg.walking) {
                legs[0].from = start;
            } else {
                let to = legs[0].from;
                legs.insert(
                    0,
                    WorkLeg {
                        from: start,
                        to,
                        walking: true,
                        scenario: None,
                    },
                );
            }
        }
        if legs.last().map(|leg| leg.to) != Some(end) {
            if legs.last().is_some_and(|leg| leg.walking) {
                legs.last_mut().unwrap().to = end;
            } else {
                let from = legs.last().unwrap().to;
                legs.push(WorkLeg {
                    from,
                    to: end,
                    walking: true,
                    scenario: None,
                });
            }
        }
    }

    fn materialize_walk(
        &self,
        cache: &mut WalkCache,
        leg: &WorkLeg,
        now: u32,
    ) -> Option<TimedLeg> {
        let pair = (key_of(leg.from), key_of(leg.to));
        let path = match cache.paths.get(&pair) {
            Some(cached) => *cached,
            None => {
                let walked = self.streets.walk(
                    self.location(leg.from),
                    self.location(leg.to),
                    self.day.time(now),
                );
                cache.paths.insert(pair, walked);
                walked
            }
        }?;
        Some(TimedLeg {
            from: leg.from,
            to: leg.to,
            depart_secs: now,
            arrive_secs: now + path.duration_secs,
            pattern: None,
            scenario: leg.scenario,
        })
    }

    /// Picks the direct connection with the earliest resolved departure and
    /// rides it. Arcs carrying a delay scenario are only usable while the
    /// live overlay exhibits at least that much delay.
    fn materialize_ride(&self, leg: &WorkLeg, now: u32) -> Option<TimedLeg> {
        let (Endpoint::Stop(from), Endpoint::Stop(to)) = (leg.from, leg.to) else {
            return None;
        };
        let mut best: Option<(u32, u32, PatternId)> = None;
        for connection in self.index.direct_connections(from, to) {
            let pattern = self.pattern_map[connection.pattern];
            let Some(resolved) = self.view.next_trip(pattern, connection.from_pos, now, self.overlay)
            else {
                continue;
            };
            let trip = &self.view.timetable_for(pattern, self.overlay).trips[resolved.trip];
            let departure = trip.departures[connection.from_pos] + resolved.day_offset;
            let arrival = trip.arrivals[connection.to_pos] + resolved.day_offset;
            if best.map_or(true, |(dep, _, _)| departure < dep) {
                best = Some((departure, arrival, connection.pattern));
            }
        }
        let (departure, arrival, pattern) = best?;
        Some(TimedLeg {
            from: leg.from,
            to: leg.to,
            depart_secs: departure,
            arrive_secs: arrival,
            pattern: Some(pattern),
            scenario: leg.scenario,
        })
    }

    fn scenario_applies(&self, scenario: ScenarioId) -> bool {
        let entries = self
            .index
            .scenario(scenario)
            .entries()
            .iter()
            .map(|(pattern, delay)| (self.pattern_map[*pattern], *delay))
            .collect();
        DelayScenario::new(entries).applies(self.view, self.overlay)
    }

    /// Walking legs can start later than the moment of arrival; every walk
    /// followed by a transit leg is shifted to end exactly at that leg's
    /// departure.
    fn align_walks(&self, legs: &mut [TimedLeg]) {
        for index in 0..legs.len().saturating_sub(1) {
            if legs[index].pattern.is_some() || legs[index + 1].pattern.is_none() {
                continue;
            }
            let slack = legs[index + 1].depart_secs.saturating_sub(legs[index].arrive_secs);
            if slack > 0 {
                legs[index].depart_secs += slack;
                legs[index].arrive_secs += slack;
            }
        }
    }

    fn into_journey(&self, timed: Vec<TimedLeg>) -> Journey {
        let legs: Vec<Leg> = timed
            .iter()
            .map(|leg| Leg {
                from: self.endpoint_info(leg.from),
                to: self.endpoint_info(leg.to),
                depart: self.day.time(leg.depart_secs),
                arrive: self.day.time(leg.arrive_secs),
                kind: match leg.pattern {
                    Some(pattern) => LegKind::Transit {
                        pattern: self.index.pattern_code(pattern).to_string(),
                        scenario: leg.scenario,
                    },
                    None => LegKind::Walk,
                },
            })
            .collect();
        let transfers = timed
            .iter()
            .filter(|leg| leg.pattern.is_some())
            .count()
            .saturating_sub(1);
        Journey {
            depart: legs.first().map(|leg| leg.depart).unwrap_or_default(),
            arrive: legs.last().map(|leg| leg.arrive).unwrap_or_default(),
            transfers,
            legs,
        }
    }

    fn location(&self, endpoint: Endpoint) -> Point<f64> {
        match endpoint {
            Endpoint::Stop(stop) => self.view.stop(self.stop_map[stop]).location(),
            Endpoint::Point { lat, lng } => Point::new(lng, lat),
        }
    }

    fn endpoint_info(&self, endpoint: Endpoint) -> LegEndpoint {
        match endpoint {
            Endpoint::Stop(stop) => {
                let stop_data = self.view.stop(self.stop_map[stop]);
                LegEndpoint {
                    stop: Some(stop_data.label.clone()),
                    lat: stop_data.lat,
                    lng: stop_data.lng,
                }
            }
            Endpoint::Point { lat, lng } => LegEndpoint {
                stop: None,
                lat,
                lng,
            },
        }
    }
}

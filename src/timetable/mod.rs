pub mod in_memory;

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use geo::Point;
use serde::{Deserialize, Serialize};

pub static DAY_SECONDS: u32 = 86_400;

pub type StopId = usize;
pub type PatternId = usize;

/// A transit stop. Identity across process and chunk boundaries is the
/// stable label; the dense index is positional within one view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub label: String,
    pub lat: f64,
    pub lng: f64,
}

impl Stop {
    #[inline]
    pub fn location(&self) -> Point<f64> {
        Point::new(self.lng, self.lat)
    }
}

/// An ordered sequence of stops served by a set of trips. Identity is the
/// stable code. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripPattern {
    pub code: String,
    pub stops: Vec<StopId>,
}

/// Per-trip schedule along one pattern. Times are seconds since midnight of
/// the service day and may exceed 24h for overnight trips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripTimes {
    pub arrivals: Vec<u32>,
    pub departures: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timetable {
    pub trips: Vec<TripTimes>,
}

impl Timetable {
    /// Index of the first trip departing `pos` at or after `earliest`.
    /// Trips are sorted by first departure; dwell times keep per-position
    /// departures in the same order, so a linear scan from the front is
    /// correct and the lists are short.
    pub fn next_trip_from(&self, pos: usize, earliest: u32) -> Option<usize> {
        self.trips
            .iter()
            .position(|trip| trip.departures.get(pos).is_some_and(|dep| *dep >= earliest))
    }
}

/// One visit of a trip pattern at a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternVisit {
    pub pattern: PatternId,
    pub pos: usize,
}

/// A scheduled departure of some pattern at a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Departure {
    pub pattern: PatternId,
    pub pos: usize,
    pub depart_secs: u32,
}

/// A trip resolved by `next_trip`. `day_offset` is 0 for the queried
/// service day and `DAY_SECONDS` when the trip was rolled over to the next
/// one; all its times must be shifted by the offset before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTrip {
    pub trip: usize,
    pub day_offset: u32,
}

/// A set of replacement timetables, keyed by pattern. During the build this
/// carries a synthesized delay scenario; at query time it is the read-only
/// realtime state. Threaded explicitly through search and materialization,
/// never stored on the view.
#[derive(Debug, Clone, Default)]
pub struct TimetableOverlay {
    tables: HashMap<PatternId, Timetable>,
}

impl TimetableOverlay {
    pub fn insert(&mut self, pattern: PatternId, timetable: Timetable) {
        self.tables.insert(pattern, timetable);
    }

    #[inline]
    pub fn table(&self, pattern: PatternId) -> Option<&Timetable> {
        self.tables.get(&pattern)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Largest per-stop arrival delay of the overlay against the schedule,
    /// in seconds. Patterns or trips absent from the overlay contribute
    /// nothing.
    pub fn max_arrival_delay<V: TimetableView + ?Sized>(
        &self,
        view: &V,
        pattern: PatternId,
    ) -> u32 {
        let Some(table) = self.table(pattern) else {
            return 0;
        };
        let scheduled = view.scheduled_timetable(pattern);
        let mut max_delay = 0u32;
        for (live, planned) in table.trips.iter().zip(scheduled.trips.iter()) {
            for (live_arr, planned_arr) in live.arrivals.iter().zip(planned.arrivals.iter()) {
                max_delay = max_delay.max(live_arr.saturating_sub(*planned_arr));
            }
        }
        max_delay
    }
}

/// The service day a query or a build sample is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDay(pub NaiveDate);

impl ServiceDay {
    /// Absolute time for seconds since this day's midnight; rolls into the
    /// following days for values past 24h.
    pub fn time(&self, secs: u32) -> NaiveDateTime {
        self.0.and_time(NaiveTime::MIN) + TimeDelta::seconds(secs as i64)
    }

    pub fn next(&self) -> ServiceDay {
        ServiceDay(self.0 + TimeDelta::days(1))
    }
}

/// Read-only access to the timetable graph. The build and query cores only
/// consume this trait; loading and realtime ingestion live elsewhere.
pub trait TimetableView {
    fn stops(&self) -> &[Stop];
    fn trip_patterns(&self) -> &[TripPattern];
    fn stop(&self, stop: StopId) -> &Stop;
    fn trip_pattern(&self, pattern: PatternId) -> &TripPattern;
    fn stop_count(&self) -> usize;
    fn stop_id(&self, label: &str) -> Option<StopId>;
    fn pattern_id(&self, code: &str) -> Option<PatternId>;
    /// All `(pattern, position)` visits at a stop.
    fn stop_visits(&self, stop: StopId) -> &[PatternVisit];
    fn scheduled_timetable(&self, pattern: PatternId) -> &Timetable;

    /// The overlayed timetable for a pattern if the overlay carries one,
    /// the scheduled timetable otherwise.
    fn timetable_for<'a>(
        &'a self,
        pattern: PatternId,
        overlay: Option<&'a TimetableOverlay>,
    ) -> &'a Timetable {
        overlay
            .and_then(|overlay| overlay.table(pattern))
            .unwrap_or_else(|| self.scheduled_timetable(pattern))
    }

    /// All scheduled departures at a stop, excluding visits at the end of
    /// their pattern (nothing can be ridden from there).
    fn scheduled_departures(&self, stop: StopId) -> Vec<Departure> {
        let mut departures = vec![];
        for visit in self.stop_visits(stop) {
            if visit.pos + 1 >= self.trip_pattern(visit.pattern).stops.len() {
                continue;
            }
            for trip in &self.scheduled_timetable(visit.pattern).trips {
                departures.push(Departure {
                    pattern: visit.pattern,
                    pos: visit.pos,
                    depart_secs: trip.departures[visit.pos],
                });
            }
        }
        departures
    }

    /// Earliest trip of `pattern` departing `from_pos` at or after
    /// `earliest_secs`, looking at the queried service day and then the
    /// next one.
    fn next_trip(
        &self,
        pattern: PatternId,
        from_pos: usize,
        earliest_secs: u32,
        overlay: Option<&TimetableOverlay>,
    ) -> Option<ResolvedTrip> {
        let timetable = self.timetable_for(pattern, overlay);
        if let Some(trip) = timetable.next_trip_from(from_pos, earliest_secs) {
            return Some(ResolvedTrip {
                trip,
                day_offset: 0,
            });
        }
        let wrapped = earliest_secs.saturating_sub(DAY_SECONDS);
        timetable
            .next_trip_from(from_pos, wrapped)
            .map(|trip| ResolvedTrip {
                trip,
                day_offset: DAY_SECONDS,
            })
    }
}

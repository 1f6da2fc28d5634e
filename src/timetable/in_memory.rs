use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use super::{PatternId, PatternVisit, Stop, StopId, Timetable, TimetableView, TripPattern, TripTimes};

/// Owned timetable graph, as produced by a feed loader. Serializable so the
/// build binaries can read it back from disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryTimetable {
    stops: Vec<Stop>,
    patterns: Vec<TripPattern>,
    timetables: Vec<Timetable>,
    stop_visits: Vec<PatternVisit>,
    stop_visit_index: Vec<usize>,
    stop_ids: HashMap<String, StopId>,
    pattern_ids: HashMap<String, PatternId>,
}

impl TimetableView for InMemoryTimetable {
    #[inline]
    fn stops(&self) -> &[Stop] {
        &self.stops
    }

    #[inline]
    fn trip_patterns(&self) -> &[TripPattern] {
        &self.patterns
    }

    #[inline]
    fn stop(&self, stop: StopId) -> &Stop {
        &self.stops[stop]
    }

    #[inline]
    fn trip_pattern(&self, pattern: PatternId) -> &TripPattern {
        &self.patterns[pattern]
    }

    #[inline]
    fn stop_count(&self) -> usize {
        self.stops.len()
    }

    fn stop_id(&self, label: &str) -> Option<StopId> {
        self.stop_ids.get(label).copied()
    }

    fn pattern_id(&self, code: &str) -> Option<PatternId> {
        self.pattern_ids.get(code).copied()
    }

    fn stop_visits(&self, stop: StopId) -> &[PatternVisit] {
        let range_end = if stop == self.stop_visit_index.len() - 1 {
            self.stop_visits.len()
        } else {
            self.stop_visit_index[stop + 1]
        };
        &self.stop_visits[self.stop_visit_index[stop]..range_end]
    }

    #[inline]
    fn scheduled_timetable(&self, pattern: PatternId) -> &Timetable {
        &self.timetables[pattern]
    }
}

impl InMemoryTimetable {
    pub fn open(path: &Path) -> Result<InMemoryTimetable, crate::Error> {
        let file = File::open(path)?;
        let timetable: InMemoryTimetable = rmp_serde::decode::from_read(BufReader::new(file))?;
        debug!(
            "Opened timetable with {} stops and {} patterns",
            timetable.stops.len(),
            timetable.patterns.len()
        );
        Ok(timetable)
    }

    pub fn save(&self, path: &Path) -> Result<(), crate::Error> {
        let mut file = File::create(path)?;
        rmp_serde::encode::write(&mut file, self)?;
        Ok(())
    }
}

/// Incremental construction of an [`InMemoryTimetable`]. Feed loaders push
/// stops, then patterns with their trips; `finish` freezes the visit index.
#[derive(Debug, Default)]
pub struct InMemoryTimetableBuilder {
    timetable: InMemoryTimetable,
}

impl InMemoryTimetableBuilder {
    pub fn new() -> InMemoryTimetableBuilder {
        InMemoryTimetableBuilder::default()
    }

    pub fn add_stop(&mut self, label: &str, lat: f64, lng: f64) -> StopId {
        let id = self.timetable.stops.len();
        self.timetable.stops.push(Stop {
            label: label.to_string(),
            lat,
            lng,
        });
        self.timetable.stop_ids.insert(label.to_string(), id);
        id
    }

    /// Registers a pattern and its trips. Trips are kept sorted by first
    /// departure so earliest-trip lookups can scan from the front.
    pub fn add_pattern(
        &mut self,
        code: &str,
        stops: Vec<StopId>,
        mut trips: Vec<TripTimes>,
    ) -> PatternId {
        let id = self.timetable.patterns.len();
        trips.sort_by_key(|trip| trip.departures.first().copied());
        self.timetable.patterns.push(TripPattern {
            code: code.to_string(),
            stops,
        });
        self.timetable.timetables.push(Timetable { trips });
        self.timetable.pattern_ids.insert(code.to_string(), id);
        id
    }

    pub fn finish(mut self) -> InMemoryTimetable {
        let mut visits_by_stop: Vec<Vec<PatternVisit>> =
            vec![vec![]; self.timetable.stops.len()];
        for (pattern, definition) in self.timetable.patterns.iter().enumerate() {
            for (pos, stop) in definition.stops.iter().enumerate() {
                visits_by_stop[*stop].push(PatternVisit { pattern, pos });
            }
        }
        for visits in visits_by_stop {
            self.timetable
                .stop_visit_index
                .push(self.timetable.stop_visits.len());
            self.timetable.stop_visits.extend(visits);
        }
        self.timetable
    }
}

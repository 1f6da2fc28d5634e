use chrono::NaiveDateTime;
use rayon::prelude::*;

use crate::geomath::StopTree;
use crate::street::StreetRouter;
use crate::timetable::{PatternId, StopId, TimetableOverlay, TimetableView};

/// Transfer bound applied to every build-time search.
pub const MAX_TRANSFERS: usize = 2;
/// Walking between stops is only considered below this distance.
pub const MAX_TRANSFER_WALK_METERS: f64 = 500.0;

/// A short walking hop between two nearby stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkHop {
    pub to: StopId,
    pub duration_secs: u32,
}

/// Precomputed stop-to-stop walking costs within the transfer radius.
/// Computed once per worker and shared by every search.
#[derive(Debug, Clone, Default)]
pub struct WalkMatrix {
    hops: Vec<Vec<WalkHop>>,
}

impl WalkMatrix {
    pub fn build<V, S>(view: &V, streets: &S, max_meters: f64) -> WalkMatrix
    where
        V: TimetableView + Sync + ?Sized,
        S: StreetRouter + Sync + ?Sized,
    {
        let tree = StopTree::build(
            view.stops()
                .iter()
                .enumerate()
                .map(|(id, stop)| (id, stop.location())),
        );
        // Street routers may be time-dependent; the matrix is built against
        // a fixed reference instant.
        let reference = NaiveDateTime::default();
        let hops = (0..view.stop_count())
            .into_par_iter()
            .map(|from| {
                let origin = view.stop(from).location();
                let mut hops = vec![];
                for (to, _) in tree.within_meters(origin, max_meters) {
                    if to == from {
                        continue;
                    }
                    let destination = view.stop(to).location();
                    if let Some(path) = streets.walk(origin, destination, reference) {
                        hops.push(WalkHop {
                            to,
                            duration_secs: path.duration_secs,
                        });
                    }
                }
                hops.sort_by_key(|hop| hop.to);
                hops
            })
            .collect();
        WalkMatrix { hops }
    }

    #[inline]
    pub fn hops(&self, stop: StopId) -> &[WalkHop] {
        &self.hops[stop]
    }
}

/// How a search state was reached from its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackMode {
    Origin,
    Walk {
        duration_secs: u32,
    },
    Ride {
        pattern: PatternId,
        trip: usize,
        board_pos: usize,
        alight_pos: usize,
        board_secs: u32,
    },
}

/// One settled arrival at a stop. States form chains back to the origin
/// through `back` indices into the search's state log.
#[derive(Debug, Clone, Copy)]
pub struct SearchState {
    pub stop: StopId,
    pub arrive_secs: u32,
    pub rides: u8,
    pub back: Option<usize>,
    pub mode: BackMode,
}

impl SearchState {
    #[inline]
    pub fn transfers(&self) -> u8 {
        self.rides.saturating_sub(1)
    }
}

/// Per-target Pareto-optimal state chains of one search run.
#[derive(Debug, Default)]
pub struct SearchResults {
    states: Vec<SearchState>,
    frontier: Vec<Vec<usize>>,
}

impl SearchResults {
    #[inline]
    pub fn state(&self, id: usize) -> &SearchState {
        &self.states[id]
    }

    /// Reached stops in ascending id order, each with its Pareto-optimal
    /// state chains (by increasing transfer count).
    pub fn targets(&self) -> impl Iterator<Item = (StopId, &[usize])> {
        self.frontier
            .iter()
            .enumerate()
            .filter(|(_, states)| !states.is_empty())
            .map(|(stop, states)| (stop, states.as_slice()))
    }

    pub fn best_arrival(&self, stop: StopId) -> Option<u32> {
        self.frontier
            .get(stop)?
            .last()
            .map(|id| self.states[*id].arrive_secs)
    }

    #[cfg(test)]
    pub(crate) fn from_parts(states: Vec<SearchState>, frontier: Vec<Vec<usize>>) -> SearchResults {
        SearchResults { states, frontier }
    }
}

/// Multi-target bounded-transfer earliest-arrival search. One round boards
/// at every stop reached in the previous round, rides each pattern forward,
/// then relaxes nearby footpaths; arrival improvements per stop across
/// rounds form the Pareto front over `(arrival, transfers)`.
pub struct OneToAllSearch<'a, V: TimetableView + ?Sized> {
    view: &'a V,
    walks: &'a WalkMatrix,
    overlay: Option<&'a TimetableOverlay>,
    max_rides: usize,
}

impl<'a, V: TimetableView + ?Sized> OneToAllSearch<'a, V> {
    pub fn new(
        view: &'a V,
        walks: &'a WalkMatrix,
        overlay: Option<&'a TimetableOverlay>,
    ) -> OneToAllSearch<'a, V> {
        OneToAllSearch {
            view,
            walks,
            overlay,
            max_rides: MAX_TRANSFERS + 1,
        }
    }

    pub fn run(&self, source: StopId, depart_secs: u32) -> SearchResults {
        let stop_count = self.view.stop_count();
        let mut results = SearchResults {
            states: vec![],
            frontier: vec![vec![]; stop_count],
        };
        let mut best = vec![u32::MAX; stop_count];
        let mut marked = vec![false; stop_count];

        let origin = push_state(
            &mut results,
            &mut best,
            SearchState {
                stop: source,
                arrive_secs: depart_secs,
                rides: 0,
                back: None,
                mode: BackMode::Origin,
            },
        );
        debug_assert!(origin.is_some());
        marked[source] = true;
        self.relax_footpaths(&mut results, &mut best, &mut marked, &[source], 0);

        for round in 1..=self.max_rides {
            let boarding: Vec<(StopId, u32, usize)> = marked
                .iter()
                .enumerate()
                .filter(|(_, is_marked)| **is_marked)
                .map(|(stop, _)| {
                    let state_id = *results.frontier[stop].last().unwrap();
                    (stop, results.states[state_id].arrive_secs, state_id)
                })
                .collect();
            if boarding.is_empty() {
                break;
            }
            for flag in &mut marked {
                *flag = false;
            }

            let mut improved_by_ride = vec![];
            for (stop, arrive_secs, back) in boarding {
                for visit in self.view.stop_visits(stop) {
                    let pattern = self.view.trip_pattern(visit.pattern);
                    if visit.pos + 1 >= pattern.stops.len() {
                        continue;
                    }
                    let Some(resolved) =
                        self.view
                            .next_trip(visit.pattern, visit.pos, arrive_secs, self.overlay)
                    else {
                        continue;
                    };
                    let timetable = self.view.timetable_for(visit.pattern, self.overlay);
                    let trip = &timetable.trips[resolved.trip];
                    let board_secs = trip.departures[visit.pos] + resolved.day_offset;
                    for alight_pos in visit.pos + 1..pattern.stops.len() {
                        let alight_stop = pattern.stops[alight_pos];
                        let arrive = trip.arrivals[alight_pos] + resolved.day_offset;
                        if push_state(
                            &mut results,
                            &mut best,
                            SearchState {
                                stop: alight_stop,
                                arrive_secs: arrive,
                                rides: round as u8,
                                back: Some(back),
                                mode: BackMode::Ride {
                                    pattern: visit.pattern,
                                    trip: resolved.trip,
                                    board_pos: visit.pos,
                                    alight_pos,
                                    board_secs,
                                },
                            },
                        )
                        .is_some()
                        {
                            marked[alight_stop] = true;
                            improved_by_ride.push(alight_stop);
                        }
                    }
                }
            }

            improved_by_ride.sort_unstable();
            improved_by_ride.dedup();
            self.relax_footpaths(
                &mut results,
                &mut best,
                &mut marked,
                &improved_by_ride,
                round as u8,
            );
        }
        results
    }

    /// Walks outward from every stop just improved by transit (or from the
    /// origin in round zero). Footpaths never chain, matching the transfer
    /// semantics of the timetable graph.
    fn relax_footpaths(
        &self,
        results: &mut SearchResults,
        best: &mut [u32],
        marked: &mut [bool],
        from_stops: &[StopId],
        round: u8,
    ) {
        for &stop in from_stops {
            let Some(&state_id) = results.frontier[stop].last() else {
                continue;
            };
            let depart = results.states[state_id].arrive_secs;
            for hop in self.walks.hops(stop) {
                let arrive = depart.saturating_add(hop.duration_secs);
                if push_state(
                    results,
                    best,
                    SearchState {
                        stop: hop.to,
                        arrive_secs: arrive,
                        rides: round,
                        back: Some(state_id),
                        mode: BackMode::Walk {
                            duration_secs: hop.duration_secs,
                        },
                    },
                )
                .is_some()
                {
                    marked[hop.to] = true;
                }
            }
        }
    }
}

/// Records a state when it strictly improves the stop's best arrival.
/// Within one round the newest improvement replaces the older one, so each
/// frontier entry is the round's final best and the list stays a Pareto
/// front over transfers.
fn push_state(
    results: &mut SearchResults,
    best: &mut [u32],
    state: SearchState,
) -> Option<usize> {
    if state.arrive_secs >= best[state.stop] {
        return None;
    }
    best[state.stop] = state.arrive_secs;
    let id = results.states.len();
    let stop = state.stop;
    let rides = state.rides;
    results.states.push(state);
    let frontier = &mut results.frontier[stop];
    match frontier.last() {
        Some(&last) if results.states[last].rides == rides => *frontier.last_mut().unwrap() = id,
        _ => frontier.push(id),
    }
    Some(id)
}

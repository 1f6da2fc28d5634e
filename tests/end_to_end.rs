use std::collections::BTreeSet;

use chrono::NaiveDate;
use interchange::build::{build_all, BuildOptions};
use interchange::pattern::merge::{load_chunk, open_merged, save_chunk, save_merged};
use interchange::pattern::PatternIndex;
use interchange::query::{Journey, JourneyPlanner, LegKind, Place, PlanRequest, QueryError};
use interchange::scenario::{DelayPolicy, DelayScenario};
use interchange::street::CrowFlightRouter;
use interchange::timetable::in_memory::{InMemoryTimetable, InMemoryTimetableBuilder};
use interchange::timetable::{TimetableOverlay, TimetableView, TripTimes};

fn hms(h: u32, m: u32, s: u32) -> u32 {
    h * 3600 + m * 60 + s
}

fn trip(times: &[(u32, u32)]) -> TripTimes {
    TripTimes {
        arrivals: times.iter().map(|(arrival, _)| *arrival).collect(),
        departures: times.iter().map(|(_, departure)| *departure).collect(),
    }
}

fn build(view: &InMemoryTimetable, chunks: usize, policy: DelayPolicy) -> PatternIndex {
    build_all(
        view,
        &CrowFlightRouter::default(),
        &BuildOptions {
            chunks,
            policy,
            ..BuildOptions::default()
        },
    )
    .unwrap()
}

fn plan(
    view: &InMemoryTimetable,
    index: &PatternIndex,
    from: Place,
    to: Place,
    depart: (u32, u32),
    overlay: Option<&TimetableOverlay>,
) -> Result<Vec<Journey>, QueryError> {
    let streets = CrowFlightRouter::default();
    let planner = JourneyPlanner::new(view, index, &streets).unwrap();
    planner.plan(
        &PlanRequest {
            from,
            to,
            date_time: NaiveDate::from_ymd_opt(2024, 5, 6)
                .unwrap()
                .and_hms_opt(depart.0, depart.1, 0)
                .unwrap(),
            max_walk_distance: 1000.0,
        },
        overlay,
    )
}

fn pattern_of(journey: &Journey, leg: usize) -> Option<&str> {
    match &journey.legs[leg].kind {
        LegKind::Transit { pattern, .. } => Some(pattern),
        LegKind::Walk => None,
    }
}

/// Stops A-B-C on one pattern, one morning trip.
fn linear_view() -> InMemoryTimetable {
    let mut builder = InMemoryTimetableBuilder::new();
    let a = builder.add_stop("A", 52.50, 13.40);
    let b = builder.add_stop("B", 52.51, 13.40);
    let c = builder.add_stop("C", 52.52, 13.40);
    builder.add_pattern(
        "P1",
        vec![a, b, c],
        vec![trip(&[
            (hms(8, 0, 0), hms(8, 0, 0)),
            (hms(8, 10, 0), hms(8, 10, 0)),
            (hms(8, 20, 0), hms(8, 20, 0)),
        ])],
    );
    builder.finish()
}

#[test]
fn linear_line_without_transfers() {
    let view = linear_view();
    let index = build(&view, 1, DelayPolicy::Simple);

    let journeys = plan(
        &view,
        &index,
        Place::Stop("A".into()),
        Place::Stop("C".into()),
        (7, 55),
        None,
    )
    .unwrap();

    assert_eq!(journeys.len(), 1);
    let journey = &journeys[0];
    assert_eq!(journey.legs.len(), 1);
    assert_eq!(journey.transfers, 0);
    assert_eq!(pattern_of(journey, 0), Some("P1"));
    assert_eq!(journey.depart.format("%H:%M").to_string(), "08:00");
    assert_eq!(journey.arrive.format("%H:%M").to_string(), "08:20");
}

#[test]
fn single_transfer() {
    let mut builder = InMemoryTimetableBuilder::new();
    let a = builder.add_stop("A", 52.50, 13.40);
    let b = builder.add_stop("B", 52.51, 13.40);
    let c = builder.add_stop("C", 52.52, 13.40);
    builder.add_pattern(
        "P1",
        vec![a, b],
        vec![trip(&[
            (hms(8, 0, 0), hms(8, 0, 0)),
            (hms(8, 10, 0), hms(8, 10, 0)),
        ])],
    );
    builder.add_pattern(
        "P2",
        vec![b, c],
        vec![trip(&[
            (hms(8, 15, 0), hms(8, 15, 0)),
            (hms(8, 30, 0), hms(8, 30, 0)),
        ])],
    );
    let view = builder.finish();
    let index = build(&view, 1, DelayPolicy::Simple);

    let journeys = plan(
        &view,
        &index,
        Place::Stop("A".into()),
        Place::Stop("C".into()),
        (7, 55),
        None,
    )
    .unwrap();

    assert_eq!(journeys.len(), 1);
    let journey = &journeys[0];
    assert_eq!(journey.legs.len(), 2);
    assert_eq!(journey.transfers, 1);
    assert_eq!(pattern_of(journey, 0), Some("P1"));
    assert_eq!(pattern_of(journey, 1), Some("P2"));
    assert_eq!(journey.arrive.format("%H:%M").to_string(), "08:30");
}

#[test]
fn walking_interchange_aligns_with_the_onward_departure() {
    let mut builder = InMemoryTimetableBuilder::new();
    let a = builder.add_stop("A", 52.50, 13.40);
    let b = builder.add_stop("B", 52.51, 13.40);
    // A separate platform ~145m from B, within walking range.
    let b2 = builder.add_stop("B2", 52.5113, 13.40);
    let c = builder.add_stop("C", 52.52, 13.40);
    builder.add_pattern(
        "P1",
        vec![a, b],
        vec![trip(&[
            (hms(8, 0, 0), hms(8, 0, 0)),
            (hms(8, 10, 0), hms(8, 10, 0)),
        ])],
    );
    builder.add_pattern(
        "P2",
        vec![b2, c],
        vec![trip(&[
            (hms(8, 20, 0), hms(8, 20, 0)),
            (hms(8, 30, 0), hms(8, 30, 0)),
        ])],
    );
    let view = builder.finish();
    let index = build(&view, 1, DelayPolicy::Simple);

    let journeys = plan(
        &view,
        &index,
        Place::Stop("A".into()),
        Place::Stop("C".into()),
        (7, 55),
        None,
    )
    .unwrap();

    assert_eq!(journeys.len(), 1);
    let journey = &journeys[0];
    assert_eq!(journey.legs.len(), 3);
    assert_eq!(journey.transfers, 1);
    assert!(matches!(journey.legs[1].kind, LegKind::Walk));
    // The interchange walk waits at B and lands exactly on P2's departure.
    assert_eq!(journey.legs[1].arrive, journey.legs[2].depart);
    assert_eq!(
        journey.legs[2].depart.format("%H:%M").to_string(),
        "08:20"
    );
}

/// A network where missing the B interchange has a real alternative: a
/// slower pair of patterns over B2. Only a delayed P1 makes it optimal.
fn delay_prone_view() -> InMemoryTimetable {
    let mut builder = InMemoryTimetableBuilder::new();
    let a = builder.add_stop("A", 52.50, 13.40);
    let b = builder.add_stop("B", 52.51, 13.40);
    let b2 = builder.add_stop("B2", 52.515, 13.40);
    let c = builder.add_stop("C", 52.52, 13.40);
    builder.add_pattern(
        "P1",
        vec![a, b],
        vec![trip(&[
            (hms(8, 0, 0), hms(8, 0, 0)),
            (hms(8, 10, 0), hms(8, 10, 0)),
        ])],
    );
    builder.add_pattern(
        "P2",
        vec![b, c],
        vec![trip(&[
            (hms(8, 15, 0), hms(8, 15, 0)),
            (hms(8, 30, 0), hms(8, 30, 0)),
        ])],
    );
    builder.add_pattern(
        "P5",
        vec![a, b2],
        vec![trip(&[
            (hms(8, 1, 0), hms(8, 1, 0)),
            (hms(8, 20, 0), hms(8, 20, 0)),
        ])],
    );
    builder.add_pattern(
        "P6",
        vec![b2, c],
        vec![trip(&[
            (hms(8, 25, 0), hms(8, 25, 0)),
            (hms(8, 50, 0), hms(8, 50, 0)),
        ])],
    );
    builder.finish()
}

#[test]
fn dynamic_arc_is_used_only_under_matching_delays() {
    let view = delay_prone_view();
    let index = build(&view, 1, DelayPolicy::Simple);

    // Undisturbed network: the normal interchange at B, and nothing else.
    let calm = plan(
        &view,
        &index,
        Place::Stop("A".into()),
        Place::Stop("C".into()),
        (7, 55),
        None,
    )
    .unwrap();
    assert_eq!(calm.len(), 1);
    assert_eq!(pattern_of(&calm[0], 0), Some("P1"));
    assert_eq!(pattern_of(&calm[0], 1), Some("P2"));
    assert_eq!(calm[0].arrive.format("%H:%M").to_string(), "08:30");

    // P1 running six minutes late: the scenario discovered at build time
    // applies and the alternative over B2 wins.
    let p1 = view.pattern_id("P1").unwrap();
    let late = DelayScenario::new(vec![(p1, 360)]).overlay(&view);
    let delayed = plan(
        &view,
        &index,
        Place::Stop("A".into()),
        Place::Stop("C".into()),
        (7, 55),
        Some(&late),
    )
    .unwrap();
    let best = &delayed[0];
    assert_eq!(pattern_of(best, 0), Some("P5"));
    assert_eq!(pattern_of(best, 1), Some("P6"));
    assert_eq!(best.arrive.format("%H:%M").to_string(), "08:50");
    assert!(best
        .legs
        .iter()
        .all(|leg| !matches!(leg.kind, LegKind::Transit { scenario: None, .. })));
}

/// Normalized arc set of an index, in label space: `(source, target, into,
/// pred, walking, scenario pattern codes)`.
fn arc_fingerprints(
    index: &PatternIndex,
) -> BTreeSet<(String, String, String, String, bool, Option<Vec<String>>)> {
    let mut arcs = BTreeSet::new();
    for (source, pattern) in index.transfer_patterns() {
        for (target, dag) in &pattern.targets {
            for node in &dag.nodes {
                for arc in &node.arcs {
                    arcs.insert((
                        index.stop_label(*source).to_string(),
                        index.stop_label(*target).to_string(),
                        index.stop_label(node.stop).to_string(),
                        index.stop_label(dag.node(arc.pred).stop).to_string(),
                        arc.walking,
                        arc.scenario.map(|scenario| {
                            index
                                .scenario(scenario)
                                .pattern_set()
                                .iter()
                                .map(|pattern| index.pattern_code(*pattern).to_string())
                                .collect()
                        }),
                    ));
                }
            }
        }
    }
    arcs
}

/// Ten stops, three overlapping patterns.
fn ten_stop_view() -> InMemoryTimetable {
    let mut builder = InMemoryTimetableBuilder::new();
    let stops: Vec<usize> = (0..10)
        .map(|i| builder.add_stop(&format!("S{i}"), 52.50 + 0.01 * i as f64, 13.40))
        .collect();

    let local: Vec<(u32, u32)> = (0..10)
        .map(|i| {
            let at = hms(8, 0, 0) + 300 * i;
            (at, at)
        })
        .collect();
    builder.add_pattern("local", stops.clone(), vec![trip(&local)]);

    let express_stops = vec![stops[0], stops[3], stops[6], stops[9]];
    let express: Vec<(u32, u32)> = (0..4)
        .map(|i| {
            let at = hms(8, 20, 0) + 420 * i;
            (at, at)
        })
        .collect();
    builder.add_pattern("express", express_stops, vec![trip(&express)]);

    let back_stops: Vec<usize> = stops.iter().rev().copied().collect();
    let back: Vec<(u32, u32)> = (0..10)
        .map(|i| {
            let at = hms(9, 30, 0) + 300 * i;
            (at, at)
        })
        .collect();
    builder.add_pattern("back", back_stops, vec![trip(&back)]);

    builder.finish()
}

#[test]
fn chunked_build_merges_to_the_single_chunk_index() {
    let view = ten_stop_view();
    let whole = build(&view, 1, DelayPolicy::Simple);
    let merged = build(&view, 5, DelayPolicy::Simple);

    assert_eq!(arc_fingerprints(&whole), arc_fingerprints(&merged));
    assert_eq!(
        whole.transfer_patterns().len(),
        merged.transfer_patterns().len()
    );
}

#[test]
fn chunk_and_merged_artifacts_round_trip() {
    let view = ten_stop_view();
    let index = build(&view, 1, DelayPolicy::Simple);
    let dir = tempdir::TempDir::new("patterns").unwrap();

    save_chunk(dir.path(), 1, 1, &index).unwrap();
    let chunk = load_chunk(dir.path(), 1, 1).unwrap();
    assert_eq!(arc_fingerprints(&index), arc_fingerprints(&chunk));

    save_merged(dir.path(), &index).unwrap();
    let merged = open_merged(dir.path()).unwrap();

    let before = plan(
        &view,
        &index,
        Place::Stop("S0".into()),
        Place::Stop("S9".into()),
        (8, 0),
        None,
    )
    .unwrap();
    let after = plan(
        &view,
        &merged,
        Place::Stop("S0".into()),
        Place::Stop("S9".into()),
        (8, 0),
        None,
    )
    .unwrap();
    assert!(!after.is_empty());
    assert_eq!(before, after);
}

#[test]
fn stop_without_transit_gets_an_empty_pattern() {
    let mut builder = InMemoryTimetableBuilder::new();
    let a = builder.add_stop("A", 52.50, 13.40);
    let b = builder.add_stop("B", 52.51, 13.40);
    // An isolated stop far from everything, served by nothing.
    let z = builder.add_stop("Z", 53.00, 13.40);
    builder.add_pattern(
        "P1",
        vec![a, b],
        vec![trip(&[
            (hms(8, 0, 0), hms(8, 0, 0)),
            (hms(8, 10, 0), hms(8, 10, 0)),
        ])],
    );
    let view = builder.finish();
    let index = build(&view, 1, DelayPolicy::Simple);

    let pattern = index.transfer_pattern(z).unwrap();
    assert!(pattern.targets.is_empty());
}

#[test]
fn point_endpoints_get_walking_legs() {
    let view = linear_view();
    let index = build(&view, 1, DelayPolicy::Simple);

    // ~20m from stop A.
    let journeys = plan(
        &view,
        &index,
        Place::Point {
            lat: 52.50018,
            lng: 13.40,
        },
        Place::Stop("C".into()),
        (7, 55),
        None,
    )
    .unwrap();

    assert_eq!(journeys.len(), 1);
    let journey = &journeys[0];
    assert_eq!(journey.legs.len(), 2);
    assert!(matches!(journey.legs[0].kind, LegKind::Walk));
    assert_eq!(journey.legs[0].from.stop, None);
    // The access walk starts as late as the 08:00 departure allows.
    assert_eq!(journey.legs[0].arrive, journey.legs[1].depart);
    assert_eq!(journey.legs[1].depart.format("%H:%M").to_string(), "08:00");
}

#[test]
fn unknown_stop_label_is_a_vertex_error() {
    let view = linear_view();
    let index = build(&view, 1, DelayPolicy::Simple);
    let result = plan(
        &view,
        &index,
        Place::Stop("nowhere".into()),
        Place::Stop("C".into()),
        (7, 55),
        None,
    );
    assert!(matches!(result, Err(QueryError::VertexNotFound(label)) if label == "nowhere"));
}

#[test]
fn point_outside_walking_range_is_a_path_error() {
    let view = linear_view();
    let index = build(&view, 1, DelayPolicy::Simple);
    let result = plan(
        &view,
        &index,
        Place::Point {
            lat: 53.50,
            lng: 13.40,
        },
        Place::Stop("C".into()),
        (7, 55),
        None,
    );
    assert!(matches!(result, Err(QueryError::PathNotFound)));
}

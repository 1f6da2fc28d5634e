pub mod cycles;
pub mod editor;
pub mod merge;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::scenario::DelayScenario;
use crate::timetable::{PatternId, PatternVisit, StopId, TimetableView};

pub type ScenarioId = usize;
/// Node handle within one target DAG arena.
pub type NodeId = u32;

/// A predecessor edge `current ← pred`: the journey reached the owning
/// node's stop from `pred`'s stop, on foot when `walking` is set. A
/// scenario is attached iff the link was discovered only under that
/// perturbation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpArc {
    pub pred: NodeId,
    pub walking: bool,
    pub scenario: Option<ScenarioId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpNode {
    pub stop: StopId,
    pub arcs: Vec<TpArc>,
}

/// One target's predecessor DAG, arena-allocated. Node 0 is the target
/// sink; nodes without arcs are roots anchored at the source stop. At most
/// one node per stop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDag {
    pub nodes: Vec<TpNode>,
}

impl TargetDag {
    #[inline]
    pub fn sink(&self) -> &TpNode {
        &self.nodes[0]
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &TpNode {
        &self.nodes[id as usize]
    }

    pub fn arc_count(&self) -> usize {
        self.nodes.iter().map(|node| node.arcs.len()).sum()
    }
}

/// All transfer patterns rooted at one source stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferPattern {
    pub source: StopId,
    pub targets: HashMap<StopId, TargetDag>,
}

/// A ride between two stops on the same trip pattern with no transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectConnection {
    pub pattern: PatternId,
    pub from_pos: usize,
    pub to_pos: usize,
}

/// Inverted index from stops to their pattern visits, enabling on-the-fly
/// enumeration of direct connections between any two stops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectConnectionIndex {
    visits: Vec<PatternVisit>,
    index: Vec<usize>,
}

impl DirectConnectionIndex {
    pub fn build<V: TimetableView + ?Sized>(view: &V) -> DirectConnectionIndex {
        let mut built = DirectConnectionIndex::default();
        for stop in 0..view.stop_count() {
            built.index.push(built.visits.len());
            built.visits.extend_from_slice(view.stop_visits(stop));
        }
        built
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn stop_visits(&self, stop: StopId) -> &[PatternVisit] {
        if stop >= self.index.len() {
            return &[];
        }
        let range_end = if stop == self.index.len() - 1 {
            self.visits.len()
        } else {
            self.index[stop + 1]
        };
        &self.visits[self.index[stop]..range_end]
    }

    /// All rides `(pattern, i, j)` with `i < j` carrying `from` at position
    /// `i` and `to` at position `j`.
    pub fn connections(&self, from: StopId, to: StopId) -> Vec<DirectConnection> {
        let mut connections = vec![];
        for boarding in self.stop_visits(from) {
            for alighting in self.stop_visits(to) {
                if boarding.pattern == alighting.pattern && boarding.pos < alighting.pos {
                    connections.push(DirectConnection {
                        pattern: boarding.pattern,
                        from_pos: boarding.pos,
                        to_pos: alighting.pos,
                    });
                }
            }
        }
        connections
    }
}

/// The final build artifact: per-source DAG map, interned delay scenarios,
/// the direct-connection index, and the canonical stop/pattern reference
/// tables that define identity across chunk boundaries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternIndex {
    pub(crate) stop_labels: Vec<String>,
    pub(crate) pattern_codes: Vec<String>,
    pub(crate) scenarios: Vec<DelayScenario>,
    pub(crate) transfer_patterns: HashMap<StopId, TransferPattern>,
    pub(crate) direct: DirectConnectionIndex,
    #[serde(skip)]
    stop_ids: HashMap<String, StopId>,
    #[serde(skip)]
    scenario_ids: HashMap<Vec<PatternId>, ScenarioId>,
}

impl PatternIndex {
    /// An empty index sharing the view's identifier space: stop and pattern
    /// ids coincide with the view's dense indices.
    pub fn for_view<V: TimetableView + ?Sized>(view: &V) -> PatternIndex {
        let mut index = PatternIndex {
            stop_labels: view.stops().iter().map(|stop| stop.label.clone()).collect(),
            pattern_codes: view
                .trip_patterns()
                .iter()
                .map(|pattern| pattern.code.clone())
                .collect(),
            ..PatternIndex::default()
        };
        index.rebuild_lookups();
        index
    }

    /// Rebuilds the transient lookup maps; must run after deserialization.
    pub fn rebuild_lookups(&mut self) {
        self.stop_ids = self
            .stop_labels
            .iter()
            .enumerate()
            .map(|(id, label)| (label.clone(), id))
            .collect();
        self.scenario_ids = self
            .scenarios
            .iter()
            .enumerate()
            .map(|(id, scenario)| (scenario.pattern_set(), id))
            .collect();
    }

    #[inline]
    pub fn stop_label(&self, stop: StopId) -> &str {
        &self.stop_labels[stop]
    }

    #[inline]
    pub fn pattern_code(&self, pattern: PatternId) -> &str {
        &self.pattern_codes[pattern]
    }

    pub fn stop_id(&self, label: &str) -> Option<StopId> {
        self.stop_ids.get(label).copied()
    }

    pub fn scenario(&self, id: ScenarioId) -> &DelayScenario {
        &self.scenarios[id]
    }

    pub fn scenarios(&self) -> &[DelayScenario] {
        &self.scenarios
    }

    /// Interns a scenario by its pattern set.
    pub fn intern_scenario(&mut self, scenario: DelayScenario) -> ScenarioId {
        if let Some(id) = self.scenario_ids.get(&scenario.pattern_set()) {
            return *id;
        }
        let id = self.scenarios.len();
        self.scenario_ids.insert(scenario.pattern_set(), id);
        self.scenarios.push(scenario);
        id
    }

    pub fn insert_transfer_pattern(&mut self, pattern: TransferPattern) {
        self.transfer_patterns.insert(pattern.source, pattern);
    }

    pub fn transfer_pattern(&self, source: StopId) -> Option<&TransferPattern> {
        self.transfer_patterns.get(&source)
    }

    pub fn transfer_patterns(&self) -> &HashMap<StopId, TransferPattern> {
        &self.transfer_patterns
    }

    /// The target-anchored DAG for a `(source, target)` pair, if any
    /// optimal journey between them was found during the build.
    pub fn target_dag(&self, source: StopId, target: StopId) -> Option<&TargetDag> {
        self.transfer_patterns
            .get(&source)
            .and_then(|pattern| pattern.targets.get(&target))
    }

    pub fn direct_connections(&self, from: StopId, to: StopId) -> Vec<DirectConnection> {
        self.direct.connections(from, to)
    }

    pub(crate) fn set_direct(&mut self, direct: DirectConnectionIndex) {
        self.direct = direct;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::timetable::in_memory::InMemoryTimetableBuilder;
    use crate::timetable::TripTimes;

    fn view_with_loop() -> crate::timetable::in_memory::InMemoryTimetable {
        let mut builder = InMemoryTimetableBuilder::new();
        let a = builder.add_stop("a", 0.0, 0.0);
        let b = builder.add_stop("b", 0.001, 0.0);
        let c = builder.add_stop("c", 0.002, 0.0);
        // A loop pattern visiting `a` twice.
        builder.add_pattern(
            "loop",
            vec![a, b, c, a],
            vec![TripTimes {
                arrivals: vec![0, 60, 120, 180],
                departures: vec![0, 60, 120, 180],
            }],
        );
        builder.finish()
    }

    #[test]
    fn direct_connections_require_increasing_positions() {
        let view = view_with_loop();
        let direct = DirectConnectionIndex::build(&view);

        let a_to_c = direct.connections(0, 2);
        assert_eq!(
            a_to_c,
            vec![DirectConnection {
                pattern: 0,
                from_pos: 0,
                to_pos: 2
            }]
        );

        // Riding the loop from b back around to a is a valid forward ride;
        // the reverse direction is not offered.
        let b_to_a = direct.connections(1, 0);
        assert_eq!(
            b_to_a,
            vec![DirectConnection {
                pattern: 0,
                from_pos: 1,
                to_pos: 3
            }]
        );
    }

    #[test]
    fn scenario_interning_is_by_pattern_set() {
        let view = view_with_loop();
        let mut index = PatternIndex::for_view(&view);
        let first = index.intern_scenario(crate::scenario::DelayScenario::new(vec![(0, 61)]));
        let second = index.intern_scenario(crate::scenario::DelayScenario::new(vec![(0, 200)]));
        assert_eq!(first, second);
        assert_eq!(index.scenarios().len(), 1);
    }
}

use std::collections::{BTreeMap, HashMap};

use super::{NodeId, ScenarioId, TargetDag, TpArc, TpNode, TransferPattern};
use crate::search::{BackMode, SearchResults};
use crate::timetable::{PatternId, StopId};

/// Accumulates search results into one source stop's transfer patterns.
/// Each target gets its own node arena with node 0 as the sink; stops are
/// deduplicated per target, arcs per `(predecessor, walking, provenance)`.
pub struct PatternEditor {
    root: StopId,
    targets: BTreeMap<StopId, DagBuilder>,
    possible_delays: BTreeMap<PatternId, u32>,
}

struct DagBuilder {
    nodes: Vec<TpNode>,
    by_stop: HashMap<StopId, NodeId>,
}

impl DagBuilder {
    fn new(target: StopId) -> DagBuilder {
        DagBuilder {
            nodes: vec![TpNode {
                stop: target,
                arcs: vec![],
            }],
            by_stop: HashMap::from([(target, 0)]),
        }
    }

    fn node_for(&mut self, stop: StopId) -> NodeId {
        if let Some(id) = self.by_stop.get(&stop) {
            return *id;
        }
        let id = self.nodes.len() as NodeId;
        self.nodes.push(TpNode { stop, arcs: vec![] });
        self.by_stop.insert(stop, id);
        id
    }

    /// Adds `arc` into `into` unless an equal arc exists. A static arc with
    /// the same endpoint and walking flag subsumes a dynamic rediscovery of
    /// the link; arcs that differ only in their scenario are kept side by
    /// side as distinct provenance.
    fn add_arc(&mut self, into: NodeId, arc: TpArc) {
        #[cfg(feature = "enforce_invariants")]
        assert_ne!(into, arc.pred, "self-arc on node {into}");
        let node = &mut self.nodes[into as usize];
        let subsumed = node.arcs.iter().any(|existing| {
            existing.pred == arc.pred
                && existing.walking == arc.walking
                && (existing.scenario == arc.scenario || existing.scenario.is_none())
        });
        if !subsumed {
            node.arcs.push(arc);
        }
    }
}

impl PatternEditor {
    pub fn new(root: StopId) -> PatternEditor {
        PatternEditor {
            root,
            targets: BTreeMap::new(),
            possible_delays: BTreeMap::new(),
        }
    }

    /// Folds one search run into the per-target DAGs. `scenario` tags arcs
    /// discovered under a synthesized delay; static runs also record the
    /// transfer waits that seed scenario generation.
    pub fn add(&mut self, results: &SearchResults, scenario: Option<ScenarioId>) {
        for (target, chains) in results.targets() {
            if target == self.root {
                continue;
            }
            let dag = self
                .targets
                .entry(target)
                .or_insert_with(|| DagBuilder::new(target));
            for &chain in chains {
                record_chain(dag, results, chain, scenario);
            }
            if scenario.is_none() {
                for &chain in chains {
                    self.record_waits(results, chain);
                }
            }
        }
    }

    /// Per-pattern maximum wait observed before a transfer, from the static
    /// passes. Seed data for the delay scenario policies.
    pub fn possible_delays(&self) -> &BTreeMap<PatternId, u32> {
        &self.possible_delays
    }

    pub fn create(self) -> TransferPattern {
        TransferPattern {
            source: self.root,
            targets: self
                .targets
                .into_iter()
                .map(|(target, dag)| (target, TargetDag { nodes: dag.nodes }))
                .collect(),
        }
    }

    /// For every boarding after the first ride in a chain, records the time
    /// spent waiting at the transfer stop against the pattern that fed the
    /// transfer: delaying that pattern past the wait makes the connection
    /// miss.
    fn record_waits(&mut self, results: &SearchResults, chain: usize) {
        let mut cursor = Some(chain);
        while let Some(id) = cursor {
            let state = results.state(id);
            if let BackMode::Ride { board_secs, .. } = state.mode {
                if let Some(at_board_stop) = state.back {
                    let boarded_from = results.state(at_board_stop);
                    if let Some(feeder) = feeder_pattern(results, at_board_stop) {
                        let wait = board_secs.saturating_sub(boarded_from.arrive_secs);
                        if wait > 0 {
                            let entry = self.possible_delays.entry(feeder).or_insert(0);
                            *entry = (*entry).max(wait);
                        }
                    }
                }
            }
            cursor = state.back;
        }
    }
}

/// The pattern ridden into the chain position `from`, if any ride precedes
/// it (walking is looked through).
fn feeder_pattern(results: &SearchResults, from: usize) -> Option<PatternId> {
    let mut cursor = Some(from);
    while let Some(id) = cursor {
        let state = results.state(id);
        if let BackMode::Ride { pattern, .. } = state.mode {
            return Some(pattern);
        }
        cursor = state.back;
    }
    None
}

/// Walks one state chain backward from the target, linking each visited
/// stop to its successor's node. No arc is created into the sink's own
/// node on re-visits, onto itself, or when an equal arc already exists.
fn record_chain(
    dag: &mut DagBuilder,
    results: &SearchResults,
    chain: usize,
    scenario: Option<ScenarioId>,
) {
    let mut before: Option<NodeId> = None;
    let mut was_walking = false;
    let mut cursor = Some(chain);
    while let Some(id) = cursor {
        let state = results.state(id);
        let node = dag.node_for(state.stop);
        if let Some(before_node) = before {
            if node != 0 && node != before_node {
                dag.add_arc(
                    before_node,
                    TpArc {
                        pred: node,
                        walking: was_walking,
                        scenario,
                    },
                );
            }
        }
        before = Some(node);
        was_walking = matches!(state.mode, BackMode::Walk { .. });
        cursor = state.back;
    }
}

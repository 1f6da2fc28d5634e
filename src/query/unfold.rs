use crate::pattern::{ScenarioId, TargetDag};
use crate::timetable::StopId;

/// One hop of an unfolded candidate journey, in the index's identifier
/// space. Not yet tied to concrete trips or times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateLeg {
    pub from: StopId,
    pub to: StopId,
    pub walking: bool,
    pub scenario: Option<ScenarioId>,
}

/// Expands a target's predecessor DAG into every source-to-target leg
/// sequence. Paths fork at nodes with several predecessors and end at
/// root nodes (no predecessors, anchored at the source).
pub fn unfold(dag: &TargetDag) -> Vec<Vec<CandidateLeg>> {
    let mut sequences = vec![];
    if dag.nodes.is_empty() {
        return sequences;
    }
    let mut trail = vec![];
    descend(dag, 0, &mut trail, &mut sequences);
    sequences
}

fn descend(
    dag: &TargetDag,
    node: usize,
    trail: &mut Vec<CandidateLeg>,
    sequences: &mut Vec<Vec<CandidateLeg>>,
) {
    let current = &dag.nodes[node];
    if current.arcs.is_empty() {
        sequences.push(trail.iter().rev().copied().collect());
        return;
    }
    for arc in &current.arcs {
        trail.push(CandidateLeg {
            from: dag.nodes[arc.pred as usize].stop,
            to: current.stop,
            walking: arc.walking,
            scenario: arc.scenario,
        });
        descend(dag, arc.pred as usize, trail, sequences);
        trail.pop();
    }
}

use log::debug;

use super::{PatternIndex, TargetDag, TpNode, TransferPattern};

/// Removes every back-reference that would let a predecessor chain revisit
/// a stop already on its path. Two disjoint paths may still meet at the
/// same node; only the path-local revisit is cut, by dropping the arc in
/// the parent that closed the loop.
pub fn clean_index(index: &mut PatternIndex) {
    let mut removed = 0usize;
    for pattern in index.transfer_patterns.values_mut() {
        removed += clean_transfer_pattern(pattern);
    }
    if removed > 0 {
        debug!("Removed {} cycle-closing arcs", removed);
    }
}

pub fn clean_transfer_pattern(pattern: &mut TransferPattern) -> usize {
    pattern
        .targets
        .values_mut()
        .map(clean_target_dag)
        .sum()
}

/// Depth-first walk from the sink with an on-path mark per arena slot.
/// Marks are cleared on exit, which is equivalent to cloning the visited
/// set per path.
pub fn clean_target_dag(dag: &mut TargetDag) -> usize {
    if dag.nodes.is_empty() {
        return 0;
    }
    let mut on_path = vec![false; dag.nodes.len()];
    visit(&mut dag.nodes, 0, &mut on_path)
}

fn visit(nodes: &mut [TpNode], at: usize, on_path: &mut [bool]) -> usize {
    on_path[at] = true;
    let mut removed = 0usize;
    let mut arc = 0usize;
    while arc < nodes[at].arcs.len() {
        let pred = nodes[at].arcs[arc].pred as usize;
        if on_path[pred] {
            nodes[at].arcs.swap_remove(arc);
            removed += 1;
            continue;
        }
        removed += visit(nodes, pred, on_path);
        arc += 1;
    }
    on_path[at] = false;
    removed
}

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::{cycles, PatternIndex, ScenarioId, TargetDag, TpNode, TransferPattern};
use crate::scenario::DelayScenario;
use crate::timetable::{PatternId, StopId};
use crate::Error;

pub const GRAPH_FILENAME: &str = "patterns.graph";
pub const MERGED_DIR: &str = "merged";

pub fn chunk_filename(chunk: usize, chunks: usize) -> String {
    format!("chunk_{}_{}", chunk, chunks)
}

/// On-disk envelope of one build artifact. The transfer-pattern index is
/// reachable via `tp`; identity across files rests only on stop labels and
/// trip pattern codes.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChunkGraph {
    pub tp: PatternIndex,
}

pub fn save_chunk(
    dir: &Path,
    chunk: usize,
    chunks: usize,
    index: &PatternIndex,
) -> Result<PathBuf, Error> {
    fs::create_dir_all(dir)?;
    let path = dir.join(chunk_filename(chunk, chunks));
    let mut file = File::create(&path)?;
    rmp_serde::encode::write(
        &mut file,
        &ChunkGraph {
            tp: index.clone(),
        },
    )?;
    debug!("Wrote {}", path.display());
    Ok(path)
}

pub fn load_chunk(dir: &Path, chunk: usize, chunks: usize) -> Result<PatternIndex, Error> {
    let path = dir.join(chunk_filename(chunk, chunks));
    let file = File::open(&path)?;
    let graph: ChunkGraph = rmp_serde::decode::from_read(BufReader::new(file))?;
    let mut index = graph.tp;
    index.rebuild_lookups();
    Ok(index)
}

/// Writes the merged index under `dir/merged/`. The artifact is staged
/// next to its final name and renamed, so a failed save leaves no
/// partially-written graph behind.
pub fn save_merged(dir: &Path, index: &PatternIndex) -> Result<PathBuf, Error> {
    let merged_dir = dir.join(MERGED_DIR);
    fs::create_dir_all(&merged_dir)?;
    let staging = merged_dir.join(format!("{GRAPH_FILENAME}.partial"));
    let path = merged_dir.join(GRAPH_FILENAME);
    let write = (|| -> Result<(), Error> {
        let mut file = File::create(&staging)?;
        rmp_serde::encode::write(
            &mut file,
            &ChunkGraph {
                tp: index.clone(),
            },
        )?;
        Ok(())
    })();
    if let Err(error) = write {
        let _ = fs::remove_file(&staging);
        return Err(error);
    }
    fs::rename(&staging, &path)?;
    Ok(path)
}

pub fn open_merged(dir: &Path) -> Result<PatternIndex, Error> {
    let path = dir.join(MERGED_DIR).join(GRAPH_FILENAME);
    let file = File::open(&path)?;
    let graph: ChunkGraph = rmp_serde::decode::from_read(BufReader::new(file))?;
    let mut index = graph.tp;
    index.rebuild_lookups();
    Ok(index)
}

/// Loads and merges all chunk files of a build. Per-target DAGs are made
/// acyclic before the merge consolidates them.
pub fn merge_chunk_files(dir: &Path, chunks: usize) -> Result<PatternIndex, Error> {
    let mut accumulator = load_chunk(dir, 1, chunks)?;
    cycles::clean_index(&mut accumulator);
    for chunk in 2..=chunks {
        let mut incoming = load_chunk(dir, chunk, chunks)?;
        cycles::clean_index(&mut incoming);
        info!("Merging chunk {} of {}", chunk, chunks);
        merge_into(&mut accumulator, incoming)?;
    }
    Ok(accumulator)
}

/// In-memory variant used by single-process builds.
pub fn merge_indexes(indexes: Vec<PatternIndex>) -> Result<PatternIndex, Error> {
    let mut iter = indexes.into_iter();
    let mut accumulator = iter.next().unwrap_or_default();
    cycles::clean_index(&mut accumulator);
    for mut incoming in iter {
        cycles::clean_index(&mut incoming);
        merge_into(&mut accumulator, incoming)?;
    }
    Ok(accumulator)
}

/// Canonicalizes every reference of `incoming` into the accumulator's
/// identifier space (stops by label, patterns by code, scenarios re-interned
/// by pattern set) and moves its per-source DAGs over. Chunks partition the
/// source stops, so arc-level deduplication is unnecessary. The donor is
/// consumed and dropped once canonicalized.
fn merge_into(accumulator: &mut PatternIndex, incoming: PatternIndex) -> Result<(), Error> {
    let stop_map = stop_mapping(accumulator, &incoming)?;
    let pattern_map = pattern_mapping(accumulator, &incoming)?;
    let scenario_map: Vec<ScenarioId> = incoming
        .scenarios
        .iter()
        .map(|scenario| {
            let entries = scenario
                .entries()
                .iter()
                .map(|(pattern, delay)| (pattern_map[*pattern], *delay))
                .collect();
            accumulator.intern_scenario(DelayScenario::new(entries))
        })
        .collect();

    let mut incoming_patterns: Vec<(StopId, TransferPattern)> =
        incoming.transfer_patterns.into_iter().collect();
    incoming_patterns.sort_by_key(|(source, _)| *source);
    for (_, pattern) in incoming_patterns {
        let canonical = TransferPattern {
            source: stop_map[pattern.source],
            targets: pattern
                .targets
                .into_iter()
                .map(|(target, dag)| (stop_map[target], remap_dag(dag, &stop_map, &scenario_map)))
                .collect(),
        };
        accumulator.insert_transfer_pattern(canonical);
    }
    Ok(())
}

fn remap_dag(dag: TargetDag, stop_map: &[StopId], scenario_map: &[ScenarioId]) -> TargetDag {
    TargetDag {
        nodes: dag
            .nodes
            .into_iter()
            .map(|node| TpNode {
                stop: stop_map[node.stop],
                arcs: node
                    .arcs
                    .into_iter()
                    .map(|mut arc| {
                        arc.scenario = arc.scenario.map(|scenario| scenario_map[scenario]);
                        arc
                    })
                    .collect(),
            })
            .collect(),
    }
}

fn stop_mapping(accumulator: &PatternIndex, incoming: &PatternIndex) -> Result<Vec<StopId>, Error> {
    incoming
        .stop_labels
        .iter()
        .map(|label| {
            accumulator
                .stop_id(label)
                .ok_or_else(|| Error::UnknownStop(label.clone()))
        })
        .collect()
}

fn pattern_mapping(
    accumulator: &PatternIndex,
    incoming: &PatternIndex,
) -> Result<Vec<PatternId>, Error> {
    let codes: HashMap<&str, PatternId> = accumulator
        .pattern_codes
        .iter()
        .enumerate()
        .map(|(id, code)| (code.as_str(), id))
        .collect();
    incoming
        .pattern_codes
        .iter()
        .map(|code| {
            codes
                .get(code.as_str())
                .copied()
                .ok_or_else(|| Error::UnknownTripPattern(code.clone()))
        })
        .collect()
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;
    use crate::pattern::TpArc;

    fn index_with(labels: &[&str], codes: &[&str]) -> PatternIndex {
        let mut index = PatternIndex {
            stop_labels: labels.iter().map(|label| label.to_string()).collect(),
            pattern_codes: codes.iter().map(|code| code.to_string()).collect(),
            ..PatternIndex::default()
        };
        index.rebuild_lookups();
        index
    }

    fn single_arc_pattern(source: StopId, target: StopId) -> TransferPattern {
        TransferPattern {
            source,
            targets: HashMap::from([(
                target,
                TargetDag {
                    nodes: vec![
                        TpNode {
                            stop: target,
                            arcs: vec![TpArc {
                                pred: 1,
                                walking: false,
                                scenario: Some(0),
                            }],
                        },
                        TpNode {
                            stop: source,
                            arcs: vec![],
                        },
                    ],
                },
            )]),
        }
    }

    #[test]
    fn merge_canonicalizes_by_label_and_code() {
        let mut accumulator = index_with(&["x", "y", "z"], &["p", "q"]);

        // The incoming chunk enumerated the same network in another order.
        let mut incoming = index_with(&["z", "x", "y"], &["q", "p"]);
        let scenario = incoming.intern_scenario(DelayScenario::new(vec![(0, 90)]));
        assert_eq!(scenario, 0);
        incoming.insert_transfer_pattern(single_arc_pattern(1, 2));

        merge_into(&mut accumulator, incoming).unwrap();

        // Source "x" → id 0, target "y" → id 1 in the accumulator.
        let pattern = accumulator.transfer_pattern(0).unwrap();
        let dag = &pattern.targets[&1];
        assert_eq!(dag.sink().stop, 1);
        assert_eq!(dag.node(1).stop, 0);
        // Scenario pattern "q" (incoming id 0) → accumulator id 1.
        let scenario = accumulator.scenario(dag.sink().arcs[0].scenario.unwrap());
        assert_eq!(scenario.entries(), &[(1, 90)]);
    }

    #[test]
    fn unknown_stop_label_is_fatal() {
        let mut accumulator = index_with(&["x"], &[]);
        let incoming = index_with(&["x", "ghost"], &[]);
        match merge_into(&mut accumulator, incoming) {
            Err(Error::UnknownStop(label)) => assert_eq!(label, "ghost"),
            other => panic!("expected UnknownStop, got {other:?}"),
        }
    }

    #[test]
    fn unknown_pattern_code_is_fatal() {
        let mut accumulator = index_with(&["x"], &["p"]);
        let incoming = index_with(&["x"], &["r"]);
        match merge_into(&mut accumulator, incoming) {
            Err(Error::UnknownTripPattern(code)) => assert_eq!(code, "r"),
            other => panic!("expected UnknownTripPattern, got {other:?}"),
        }
    }
}

use std::ops::Range;

use log::{debug, info};
use rayon::prelude::*;

use crate::pattern::editor::PatternEditor;
use crate::pattern::merge::merge_indexes;
use crate::pattern::{DirectConnectionIndex, PatternIndex};
use crate::scenario::DelayPolicy;
use crate::search::{OneToAllSearch, WalkMatrix, MAX_TRANSFER_WALK_METERS};
use crate::street::StreetRouter;
use crate::timetable::{StopId, TimetableView};
use crate::Error;

/// Consecutive departure samples closer than this are collapsed into one
/// search run.
pub const MIN_SAMPLE_GAP_SECS: u32 = 1_800;

#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Number of chunks the stop set is partitioned into.
    pub chunks: usize,
    pub policy: DelayPolicy,
    pub max_transfer_walk_meters: f64,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            chunks: 1,
            policy: DelayPolicy::Simple,
            max_transfer_walk_meters: MAX_TRANSFER_WALK_METERS,
        }
    }
}

/// The contiguous slice of dense stop indices owned by a 1-based chunk.
pub fn chunk_range(total: usize, chunk: usize, chunks: usize) -> Range<StopId> {
    total * (chunk - 1) / chunks..total * chunk / chunks
}

/// All scheduled departure times at a stop, sorted and thinned so
/// consecutive samples are at least [`MIN_SAMPLE_GAP_SECS`] apart.
pub fn departure_samples<V: TimetableView + ?Sized>(view: &V, stop: StopId) -> Vec<u32> {
    let mut samples: Vec<u32> = view
        .scheduled_departures(stop)
        .iter()
        .map(|departure| departure.depart_secs)
        .collect();
    samples.sort_unstable();
    samples.dedup();
    let mut thinned: Vec<u32> = vec![];
    for sample in samples {
        match thinned.last() {
            Some(last) if sample < last + MIN_SAMPLE_GAP_SECS => {}
            _ => thinned.push(sample),
        }
    }
    thinned
}

/// Builds the transfer patterns of one chunk. Only chunk 1 carries the
/// direct-connection index; the merged union of all chunks forms the full
/// index.
pub fn build_chunk<V, S>(
    view: &V,
    streets: &S,
    options: &BuildOptions,
    chunk: usize,
) -> Result<PatternIndex, Error>
where
    V: TimetableView + Sync + ?Sized,
    S: StreetRouter + Sync + ?Sized,
{
    let walks = WalkMatrix::build(view, streets, options.max_transfer_walk_meters);
    Ok(build_chunk_with_walks(view, &walks, options, chunk))
}

/// Builds every chunk in-process and consolidates them, for single-worker
/// builds and for the chunked-equivalence law in the test suite.
pub fn build_all<V, S>(view: &V, streets: &S, options: &BuildOptions) -> Result<PatternIndex, Error>
where
    V: TimetableView + Sync + ?Sized,
    S: StreetRouter + Sync + ?Sized,
{
    let walks = WalkMatrix::build(view, streets, options.max_transfer_walk_meters);
    let indexes: Vec<PatternIndex> = (1..=options.chunks)
        .into_par_iter()
        .map(|chunk| build_chunk_with_walks(view, &walks, options, chunk))
        .collect();
    merge_indexes(indexes)
}

fn build_chunk_with_walks<V>(
    view: &V,
    walks: &WalkMatrix,
    options: &BuildOptions,
    chunk: usize,
) -> PatternIndex
where
    V: TimetableView + ?Sized,
{
    let range = chunk_range(view.stop_count(), chunk, options.chunks);
    info!(
        "Building chunk {} of {}: stops {}..{}",
        chunk, options.chunks, range.start, range.end
    );
    let mut index = PatternIndex::for_view(view);
    for source in range {
        build_source(view, walks, options, &mut index, source);
    }
    if chunk == 1 {
        index.set_direct(DirectConnectionIndex::build(view));
    }
    index
}

/// Runs the static passes for one source, derives delay scenarios from the
/// observed transfer waits, probes each scenario under a synthesized
/// overlay, and freezes the editor into the chunk index. A sample whose
/// search reaches nothing simply leaves no trace.
fn build_source<V>(
    view: &V,
    walks: &WalkMatrix,
    options: &BuildOptions,
    index: &mut PatternIndex,
    source: StopId,
) where
    V: TimetableView + ?Sized,
{
    let samples = departure_samples(view, source);
    let mut editor = PatternEditor::new(source);
    for &sample in &samples {
        let results = OneToAllSearch::new(view, walks, None).run(source, sample);
        editor.add(&results, None);
    }

    let scenarios = options.policy.scenarios(editor.possible_delays());
    if !scenarios.is_empty() {
        debug!(
            "Stop {}: probing {} delay scenarios over {} samples",
            view.stop(source).label,
            scenarios.len(),
            samples.len()
        );
    }
    for scenario in scenarios {
        let overlay = scenario.overlay(view);
        let id = index.intern_scenario(scenario);
        for &sample in &samples {
            let results = OneToAllSearch::new(view, walks, Some(&overlay)).run(source, sample);
            editor.add(&results, Some(id));
        }
    }
    index.insert_transfer_pattern(editor.create());
}

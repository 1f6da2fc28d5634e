use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::timetable::{PatternId, Timetable, TimetableOverlay, TimetableView};

/// A synthesized timetable perturbation: every listed pattern runs at least
/// `min_delay_secs` late. Identity for interning and applicability checks is
/// the set of patterns mentioned; delays are always positive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DelayScenario {
    entries: Vec<(PatternId, u32)>,
}

impl DelayScenario {
    pub fn new(mut entries: Vec<(PatternId, u32)>) -> DelayScenario {
        debug_assert!(entries.iter().all(|(_, delay)| *delay > 0));
        entries.sort_by_key(|(pattern, _)| *pattern);
        entries.dedup_by_key(|(pattern, _)| *pattern);
        DelayScenario { entries }
    }

    pub fn entries(&self) -> &[(PatternId, u32)] {
        &self.entries
    }

    /// The pattern set that identifies this scenario.
    pub fn pattern_set(&self) -> Vec<PatternId> {
        self.entries.iter().map(|(pattern, _)| *pattern).collect()
    }

    /// Synthesizes the overlay realizing this scenario: every trip of every
    /// mentioned pattern shifted late by the pattern's delay.
    pub fn overlay<V: TimetableView + ?Sized>(&self, view: &V) -> TimetableOverlay {
        let mut overlay = TimetableOverlay::default();
        for (pattern, delay) in &self.entries {
            let mut delayed = view.scheduled_timetable(*pattern).clone();
            for trip in &mut delayed.trips {
                for arrival in &mut trip.arrivals {
                    *arrival = arrival.saturating_add(*delay);
                }
                for departure in &mut trip.departures {
                    *departure = departure.saturating_add(*delay);
                }
            }
            overlay.insert(*pattern, delayed);
        }
        overlay
    }

    /// Whether the live overlay exhibits at least this scenario's delay for
    /// every mentioned pattern. Arcs tagged with a scenario may only be
    /// materialized when this holds.
    pub fn applies<V: TimetableView + ?Sized>(
        &self,
        view: &V,
        overlay: Option<&TimetableOverlay>,
    ) -> bool {
        let Some(overlay) = overlay else {
            return false;
        };
        self.entries
            .iter()
            .all(|(pattern, min_delay)| overlay.max_arrival_delay(view, *pattern) >= *min_delay)
    }
}

/// How delay scenarios are derived from the waits observed during the
/// static passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayPolicy {
    /// Probe no scenarios.
    None,
    /// One scenario per observed pattern, delaying it just past its
    /// observed maximum wait so the chosen connection is missed.
    Simple,
    /// `Simple`, uniformly downsampled to at most `k` scenarios.
    RestrictedSimple(usize),
    /// Every non-empty subset of up to `k` observed patterns.
    PowerSet(usize),
}

impl DelayPolicy {
    pub fn scenarios(&self, observed: &BTreeMap<PatternId, u32>) -> Vec<DelayScenario> {
        match self {
            DelayPolicy::None => vec![],
            DelayPolicy::Simple => simple(observed),
            DelayPolicy::RestrictedSimple(limit) => {
                let mut scenarios = simple(observed);
                if scenarios.len() > *limit {
                    scenarios = downsample(scenarios, *limit, seed_from(observed));
                }
                scenarios
            }
            DelayPolicy::PowerSet(limit) => {
                let entries: Vec<(PatternId, u32)> = observed
                    .iter()
                    .map(|(pattern, wait)| (*pattern, wait + 1))
                    .collect();
                let mut scenarios = vec![];
                let mut subset = vec![];
                power_set(&entries, 0, *limit, &mut subset, &mut scenarios);
                scenarios
            }
        }
    }
}

fn simple(observed: &BTreeMap<PatternId, u32>) -> Vec<DelayScenario> {
    observed
        .iter()
        .map(|(pattern, wait)| DelayScenario::new(vec![(*pattern, wait + 1)]))
        .collect()
}

fn power_set(
    entries: &[(PatternId, u32)],
    from: usize,
    limit: usize,
    subset: &mut Vec<(PatternId, u32)>,
    out: &mut Vec<DelayScenario>,
) {
    if subset.len() >= limit {
        return;
    }
    for index in from..entries.len() {
        subset.push(entries[index]);
        out.push(DelayScenario::new(subset.clone()));
        power_set(entries, index + 1, limit, subset, out);
        subset.pop();
    }
}

/// Uniform sample of `limit` scenarios. Seeded from the observed pattern
/// set so repeated builds pick the same subset.
fn downsample(
    mut scenarios: Vec<DelayScenario>,
    limit: usize,
    mut seed: u64,
) -> Vec<DelayScenario> {
    for index in 0..limit {
        let pick = index + (splitmix64(&mut seed) as usize) % (scenarios.len() - index);
        scenarios.swap(index, pick);
    }
    scenarios.truncate(limit);
    scenarios
}

fn seed_from(observed: &BTreeMap<PatternId, u32>) -> u64 {
    let mut seed = 0x9e37_79b9_7f4a_7c15u64;
    for pattern in observed.keys() {
        seed ^= splitmix64(&mut ((*pattern as u64).wrapping_add(seed)));
    }
    seed
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

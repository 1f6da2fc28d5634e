use super::Journey;

/// Keeps the Pareto set over (later departure, earlier arrival, fewer
/// legs), then orders for display by arrival and total duration.
pub fn filter_and_sort(journeys: Vec<Journey>) -> Vec<Journey> {
    let mut kept: Vec<Journey> = vec![];
    for journey in &journeys {
        if !journeys.iter().any(|other| dominates(other, journey)) {
            kept.push(journey.clone());
        }
    }
    kept.sort_by_key(|journey| (journey.arrive, journey.arrive - journey.depart));
    kept.dedup_by(|a, b| a.legs == b.legs);
    kept
}

/// `a` dominates `b` when it arrives strictly earlier without departing
/// earlier or using more legs. Journeys tied on arrival never displace
/// each other, so a later departure and a lower leg count both survive as
/// distinct offers.
fn dominates(a: &Journey, b: &Journey) -> bool {
    a.arrive < b.arrive && a.depart >= b.depart && a.legs.len() <= b.legs.len()
}

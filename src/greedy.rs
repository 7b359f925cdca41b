//! Greedy Sequencer (C6): nearest-neighbor construction + 2-opt
//! improvement + relocate, adapted from the teacher crate's
//! `solver.rs::{two_opt_improve, relocate_improve, local_search}` local
//! search loop shape, generalized from a multi-visitor VRP to a
//! single-sequence, multi-day walking tour. Also used as the Sequencer's
//! warm-start hint source and as the Re-optimizer's Tier-1/Tier-2 engine
//! (spec §4.6/§4.7).

use std::collections::HashSet;

use tracing::{debug, instrument};

use crate::coherence::CoherenceMatrix;
use crate::config::{Pace, PlannerConfig};
use crate::distance::Matrix;
use crate::geo_provider::TravelMode;
use crate::poi::{Poi, Slug};

#[derive(Debug, Clone, Default)]
pub struct GreedyResult {
    pub sequence: Vec<Slug>,
    pub day_assignments: Vec<Vec<Slug>>,
    pub total_distance_km: f64,
}

fn distance_km(distances: &Matrix, a: &str, b: &str, config: &PlannerConfig) -> f64 {
    if a == b {
        return 0.0;
    }
    distances
        .lookup(a, b, TravelMode::Walking)
        .map(|d| d.distance_km)
        .unwrap_or(config.default_unknown_distance_km)
}

/// Builds an initial nearest-neighbor sequence, improves it with bounded
/// 2-opt, then partitions it into days by walking-hours budget.
#[instrument(skip(pois, priority, distances, coherence, config), fields(poi_count = pois.len()))]
pub fn sequence(
    pois: &[&Poi],
    priority: &[Slug],
    distances: &Matrix,
    coherence: &CoherenceMatrix,
    pace: Pace,
    config: &PlannerConfig,
) -> GreedyResult {
    if pois.is_empty() {
        return GreedyResult::default();
    }

    let order = nearest_neighbor(pois, priority, distances, coherence, config);
    let improved = two_opt(order, distances, config);
    let total_distance_km = tour_distance(&improved, distances, config);
    let day_assignments = partition_into_days(&improved, pois, distances, pace, config);

    debug!(days = day_assignments.len(), total_distance_km, "greedy sequence built");

    GreedyResult { sequence: improved, total_distance_km, day_assignments }
}

fn nearest_neighbor(
    pois: &[&Poi],
    priority: &[Slug],
    distances: &Matrix,
    coherence: &CoherenceMatrix,
    config: &PlannerConfig,
) -> Vec<Slug> {
    let (w_d, w_c) = config.weights.normalized();
    let mut remaining: Vec<&Poi> = pois.to_vec();

    let start_slug = priority
        .iter()
        .find(|slug| remaining.iter().any(|p| &p.slug == *slug))
        .cloned()
        .unwrap_or_else(|| remaining[0].slug.clone());

    remaining.retain(|p| p.slug != start_slug);
    let mut sequence = vec![start_slug];

    while !remaining.is_empty() {
        let current = sequence.last().unwrap().clone();
        let (best_idx, _) = remaining
            .iter()
            .enumerate()
            .map(|(idx, cand)| {
                let d = distance_km(distances, &current, &cand.slug, config);
                let coh = coherence.lookup(&current, &cand.slug);
                let score = w_d * (1.0 - (d / 5.0).min(1.0)) + w_c * coh;
                (idx, score)
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .expect("remaining is non-empty");

        let chosen = remaining.remove(best_idx);
        sequence.push(chosen.slug.clone());
    }

    sequence
}

fn tour_distance(sequence: &[Slug], distances: &Matrix, config: &PlannerConfig) -> f64 {
    sequence.windows(2).map(|pair| distance_km(distances, &pair[0], &pair[1], config)).sum()
}

/// Bounded 2-opt: reverses `[i+1..=j]` whenever it strictly reduces total
/// walking distance, up to 10 improvement passes, mirroring the teacher's
/// `two_opt_improve`/`local_search` accept-first-improvement loop.
fn two_opt(mut sequence: Vec<Slug>, distances: &Matrix, config: &PlannerConfig) -> Vec<Slug> {
    if sequence.len() < 3 {
        return sequence;
    }

    for _ in 0..10 {
        let mut improved = false;
        let current_cost = tour_distance(&sequence, distances, config);
        let n = sequence.len();

        'search: for i in 0..n - 1 {
            for j in i + 2..n {
                let mut candidate = sequence.clone();
                candidate[i + 1..=j].reverse();
                let candidate_cost = tour_distance(&candidate, distances, config);
                if candidate_cost < current_cost {
                    sequence = candidate;
                    improved = true;
                    break 'search;
                }
            }
        }

        if !improved {
            break;
        }
    }

    sequence
}

fn partition_into_days(
    sequence: &[Slug],
    pois: &[&Poi],
    distances: &Matrix,
    pace: Pace,
    config: &PlannerConfig,
) -> Vec<Vec<Slug>> {
    let budget_hours = pace.hours_per_day();
    let mut days: Vec<Vec<Slug>> = vec![Vec::new()];
    let mut day_hours = 0.0;
    let mut prev: Option<&Slug> = None;

    for slug in sequence {
        let poi = pois.iter().find(|p| &p.slug == slug);
        let visit_hours = poi.map(|p| p.estimated_visit_minutes as f64 / 60.0).unwrap_or(config.default_visit_duration_minutes as f64 / 60.0);
        let walk_hours = match prev {
            Some(p) => distance_km(distances, p, slug, config) / config.walking_speed_kmh,
            None => 0.0,
        };

        let addition = visit_hours + walk_hours;
        if !days.last().unwrap().is_empty() && day_hours + addition > budget_hours {
            days.push(Vec::new());
            day_hours = visit_hours;
            prev = Some(slug);
            days.last_mut().unwrap().push(slug.clone());
            continue;
        }

        day_hours += addition;
        days.last_mut().unwrap().push(slug.clone());
        prev = Some(slug);
    }

    days
}

/// Re-sequences a single day's POIs (nearest-neighbor + bounded 2-opt, no
/// day partitioning) — the Re-optimizer's Tier-2 engine per spec §4.7,
/// which re-runs "the Greedy Sequencer + 2-opt on each affected day
/// independently, holding other days fixed."
pub fn resequence_day(
    pois: &[&Poi],
    priority: &[Slug],
    distances: &Matrix,
    coherence: &CoherenceMatrix,
    config: &PlannerConfig,
) -> Vec<Slug> {
    if pois.is_empty() {
        return Vec::new();
    }
    let order = nearest_neighbor(pois, priority, distances, coherence, config);
    two_opt(order, distances, config)
}

/// Slugs present in `sequence` but absent from `pois`, useful for callers
/// asserting no POI was silently dropped by the local search.
pub fn missing_from(sequence: &[Slug], pois: &[&Poi]) -> Vec<Slug> {
    let known: HashSet<&str> = pois.iter().map(|p| p.slug.as_str()).collect();
    sequence.iter().filter(|s| !known.contains(s.as_str())).cloned().collect()
}

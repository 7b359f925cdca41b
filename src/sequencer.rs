//! Sequencer — CP core (C5). Re-expresses the original's OR-Tools CP-SAT
//! model (`ilp_optimizer.py::ILPOptimizer.optimize_sequence`) as a mixed
//! integer program solved with `good_lp`'s pure-Rust `microlp` backend (see
//! SPEC_FULL.md §4.5 for the translation rationale). Falls back to the
//! Greedy Sequencer whenever the MIP doesn't return `Optimal`/`Infeasible`
//! cleanly within budget, exactly as the original falls back when CP-SAT
//! doesn't return `OPTIMAL`/`FEASIBLE`.

use std::collections::HashMap;
use std::time::Instant;

use good_lp::{microlp, variable, Expression, ProblemVariables, Solution, SolverModel, Variable};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::coherence::CoherenceMatrix;
use crate::combo::{ComboConstraintKind, ComboGroup};
use crate::config::{Pace, PlannerConfig};
use crate::distance::Matrix;
use crate::error::{Error, Result};
use crate::geo_provider::TravelMode;
use crate::greedy::{self, GreedyResult};
use crate::poi::{Poi, Slug};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverStatus {
    Optimal,
    Feasible,
    GreedyFallback,
}

impl SolverStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolverStatus::Optimal => "optimal",
            SolverStatus::Feasible => "feasible",
            SolverStatus::GreedyFallback => "greedy_fallback",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverStats {
    pub status: SolverStatus,
    pub solve_time_seconds: f64,
    pub objective_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scores {
    pub distance_score: f64,
    pub coherence_score: f64,
    pub overall_score: f64,
    pub total_distance_km: f64,
}

#[derive(Debug, Clone)]
pub struct SequencerOutput {
    pub sequence: Vec<Slug>,
    pub day_assignments: Vec<Vec<Slug>>,
    pub scores: Scores,
    pub solver_stats: SolverStats,
}

pub struct SequencerInput<'a> {
    pub pois: Vec<&'a Poi>,
    pub must_see: Vec<Slug>,
    pub combo_groups: Vec<&'a ComboGroup>,
    pub distances: &'a Matrix,
    pub coherence: &'a CoherenceMatrix,
    pub day_count: usize,
    /// Weekday (0=Sunday) of the trip's first day, for opening-hours
    /// checks against `day_count` days ahead.
    pub trip_start_weekday: u8,
    pub start_location: Option<(f64, f64)>,
    pub end_location: Option<(f64, f64)>,
    pub pace: Pace,
}

/// `(poi_index, day, position)` decision variable grid, holding only the
/// feasible triples (time-window forbidding is by variable omission, not
/// an explicit `== 0` constraint, per SPEC_FULL.md §4.5).
struct VarGrid {
    vars: HashMap<(usize, usize, usize), Variable>,
}

impl VarGrid {
    fn get(&self, i: usize, d: usize, p: usize) -> Option<Variable> {
        self.vars.get(&(i, d, p)).copied()
    }
}

pub(crate) fn distance_km(distances: &Matrix, a: &str, b: &str, config: &PlannerConfig) -> f64 {
    if a == b {
        return 0.0;
    }
    distances.lookup(a, b, TravelMode::Walking).map(|d| d.distance_km).unwrap_or(config.default_unknown_distance_km)
}

/// Runs the MIP solve, falling back to the Greedy Sequencer on anything
/// short of `Optimal`/`Feasible`, per spec §4.5 "Solve budget".
#[instrument(skip_all, fields(poi_count = input.pois.len(), day_count = input.day_count))]
pub fn solve(input: SequencerInput, config: &PlannerConfig) -> Result<SequencerOutput> {
    let n = input.pois.len();
    if n == 0 {
        return Ok(SequencerOutput {
            sequence: Vec::new(),
            day_assignments: Vec::new(),
            scores: Scores { distance_score: 1.0, coherence_score: 0.5, overall_score: 0.75, total_distance_km: 0.0 },
            solver_stats: SolverStats { status: SolverStatus::Optimal, solve_time_seconds: 0.0, objective_value: 0.0 },
        });
    }

    let d_count = input.day_count.max(1);
    let p_count = (3usize).max(n.div_ceil(d_count) + 2);

    let warm_start = greedy::sequence(&input.pois, &input.must_see, input.distances, input.coherence, input.pace, config);

    let feasible = feasible_slots(&input, d_count, p_count, config);
    if let Some(unreachable_poi) = feasible.iter().position(|row| row.iter().all(|d| d.iter().all(|f| !f))) {
        let slug = input.pois[unreachable_poi].slug.clone();
        warn!(poi = %slug, "no feasible (day, position) slot for POI under any assignment");
        // No (day, position) in the grid admits this POI's opening hours under
        // any assignment — the Greedy Sequencer doesn't check opening hours at
        // all, so falling back to it would silently schedule a visit outside
        // business hours instead of surfacing the real infeasibility.
        return Err(Error::infeasible(
            "TIME_WINDOWS_EMPTY",
            format!("POI '{slug}' has no feasible time window within the trip's day/position grid"),
            vec!["TIME_WINDOWS_EMPTY".to_string()],
        ));
    }

    let start = Instant::now();
    match build_and_solve(&input, &feasible, d_count, p_count, &warm_start, config) {
        Ok((sequence, day_assignments, objective_value)) => {
            let elapsed = start.elapsed().as_secs_f64();
            let scores = score_sequence(&sequence, &input, config);
            info!(solve_time_seconds = elapsed, objective_value, "CP sequencer solved to optimality");
            Ok(SequencerOutput {
                sequence,
                day_assignments,
                scores,
                solver_stats: SolverStats { status: SolverStatus::Optimal, solve_time_seconds: elapsed, objective_value },
            })
        }
        Err(reason) => {
            warn!(reason, "CP sequencer did not solve cleanly, falling back to greedy");
            Ok(greedy_output(warm_start, &input, config, reason))
        }
    }
}

fn greedy_output(warm_start: GreedyResult, input: &SequencerInput, config: &PlannerConfig, reason: &str) -> SequencerOutput {
    info!(reason, "using greedy sequence");
    let scores = score_sequence(&warm_start.sequence, input, config);
    SequencerOutput {
        sequence: warm_start.sequence,
        day_assignments: warm_start.day_assignments,
        scores,
        solver_stats: SolverStats { status: SolverStatus::GreedyFallback, solve_time_seconds: 0.0, objective_value: 0.0 },
    }
}

/// `feasible[i][d][p]` precomputes whether POI `i` may occupy `(d, p)`
/// given its opening hours and booking preferred slots, per spec §4.5
/// "Time-window constraints".
fn feasible_slots(input: &SequencerInput, d_count: usize, p_count: usize, config: &PlannerConfig) -> Vec<Vec<Vec<bool>>> {
    input
        .pois
        .iter()
        .map(|poi| {
            (0..d_count)
                .map(|d| {
                    (0..p_count)
                        .map(|p| {
                            let minutes = config.start_minutes + p as i32 * config.avg_slot_minutes;
                            let hhmm = minutes_to_hhmm(minutes);
                            let weekday = ((input.trip_start_weekday as usize + d) % 7) as u8;
                            if poi.opening_hours.is_empty() {
                                return true;
                            }
                            let open = poi.opening_hours.is_open(weekday, hhmm);
                            open && poi.booking.admits_preferred(hhmm)
                        })
                        .collect()
                })
                .collect()
        })
        .collect()
}

fn minutes_to_hhmm(minutes: i32) -> u16 {
    let wrapped = minutes.rem_euclid(24 * 60);
    let h = wrapped / 60;
    let m = wrapped % 60;
    (h * 100 + m) as u16
}

type SolveOutcome = (Vec<Slug>, Vec<Vec<Slug>>, f64);

fn build_and_solve(
    input: &SequencerInput,
    feasible: &[Vec<Vec<bool>>],
    d_count: usize,
    p_count: usize,
    warm_start: &GreedyResult,
    config: &PlannerConfig,
) -> std::result::Result<SolveOutcome, &'static str> {
    let n = input.pois.len();
    let mut problem = ProblemVariables::new();

    let mut grid = HashMap::new();
    for i in 0..n {
        for d in 0..d_count {
            for p in 0..p_count {
                if feasible[i][d][p] {
                    grid.insert((i, d, p), problem.add(variable().binary()));
                }
            }
        }
    }
    let grid = VarGrid { vars: grid };

    let mut constraints = Vec::new();

    // 1. Each POI visited exactly once.
    for i in 0..n {
        let expr: Expression = (0..d_count)
            .flat_map(|d| (0..p_count).filter_map(move |p| Some((d, p))))
            .filter_map(|(d, p)| grid.get(i, d, p))
            .map(Expression::from)
            .sum();
        constraints.push(expr.eq(1.0));
    }

    // 2. Each slot holds at most one POI.
    for d in 0..d_count {
        for p in 0..p_count {
            let expr: Expression = (0..n).filter_map(|i| grid.get(i, d, p)).map(Expression::from).sum();
            constraints.push(expr.leq(1.0));
        }
    }

    // 3. No gaps within a day.
    for d in 0..d_count {
        for p in 1..p_count {
            let occupied_p: Expression = (0..n).filter_map(|i| grid.get(i, d, p)).map(Expression::from).sum();
            let occupied_prev: Expression = (0..n).filter_map(|i| grid.get(i, d, p - 1)).map(Expression::from).sum();
            constraints.push((occupied_p - occupied_prev).leq(0.0));
        }
    }

    // Affine day[i] / seq[i] / position[i] expressions (channeling without
    // separate solver variables, per SPEC_FULL.md §4.5).
    let day_expr = |i: usize| -> Expression {
        (0..d_count)
            .flat_map(|d| (0..p_count).filter_map(move |p| grid.get(i, d, p).map(|v| (d, v))))
            .map(|(d, v)| Expression::from(v) * d as f64)
            .sum()
    };
    let seq_expr = |i: usize| -> Expression {
        (0..d_count)
            .flat_map(|d| (0..p_count).filter_map(move |p| grid.get(i, d, p).map(|v| (d, p, v))))
            .map(|(d, p, v)| Expression::from(v) * (d * p_count + p) as f64)
            .sum()
    };
    let position_expr = |i: usize| -> Expression {
        (0..d_count)
            .flat_map(|d| (0..p_count).filter_map(move |p| grid.get(i, d, p).map(|v| (p, v))))
            .map(|(p, v)| Expression::from(v) * p as f64)
            .sum()
    };

    // 4. Precedence: coherence >= 0.7 or explicit must_visit_after.
    let slug_index: HashMap<&str, usize> = input.pois.iter().enumerate().map(|(idx, p)| (p.slug.as_str(), idx)).collect();
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            let coh = input.coherence.lookup(&input.pois[i].slug, &input.pois[j].slug);
            let explicit = input.pois[j].must_visit_after.iter().any(|s| s == &input.pois[i].slug);
            if coh >= 0.7 || explicit {
                constraints.push((seq_expr(j) - seq_expr(i)).geq(1.0));
            }
        }
    }

    // 5. Clustered-visit constraints for combo groups.
    for group in &input.combo_groups {
        let members: Vec<usize> =
            group.members.iter().filter_map(|name| input.pois.iter().position(|p| &p.name == name)).collect();
        if members.len() < 2 {
            continue;
        }
        for kind in group.applicable_kinds() {
            match kind {
                ComboConstraintKind::SameDay => {
                    for w in members.windows(2) {
                        constraints.push((day_expr(w[0]) - day_expr(w[1])).eq(0.0));
                    }
                }
                ComboConstraintKind::Contiguous => {
                    let min_pos = problem.add(variable().integer().min(0.0).max((p_count - 1) as f64));
                    let max_pos = problem.add(variable().integer().min(0.0).max((p_count - 1) as f64));
                    for &m in &members {
                        constraints.push((position_expr(m) - Expression::from(min_pos)).geq(0.0));
                        constraints.push((position_expr(m) - Expression::from(max_pos)).leq(0.0));
                    }
                    constraints.push((Expression::from(max_pos) - Expression::from(min_pos)).leq((members.len() - 1) as f64));
                }
            }
        }
    }

    // Symmetry breaking: pin an arbitrary anchor POI to (0, 0) if that
    // slot is feasible for it. The Greedy Sequencer's own start choice
    // (itself seeded from `must_see`) picks the anchor, giving the warm
    // start real influence even though `good_lp` has no MIP-start hook.
    let anchor_slug = warm_start.sequence.first().cloned();
    if let Some(anchor) = anchor_slug.and_then(|slug| slug_index.get(slug.as_str()).copied()) {
        if let Some(v) = grid.get(anchor, 0, 0) {
            constraints.push(Expression::from(v).eq(1.0));
        }
    }

    // Start/end hints (soft, via objective bonus, never a hard constraint).
    let mut hint_bonus = Expression::from(0.0);
    const HINT_WEIGHT: f64 = 0.05;
    if let Some(start_loc) = input.start_location {
        if let Some((closest, _)) = closest_poi(input, start_loc) {
            if let Some(v) = grid.get(closest, 0, 0) {
                hint_bonus = hint_bonus + Expression::from(v) * HINT_WEIGHT;
            }
        }
    }
    if let Some(end_loc) = input.end_location {
        if let Some((closest, _)) = closest_poi(input, end_loc) {
            let last_day = d_count - 1;
            let tail_positions = [p_count.saturating_sub(1), p_count.saturating_sub(2)];
            for p in tail_positions {
                if let Some(v) = grid.get(closest, last_day, p) {
                    hint_bonus = hint_bonus + Expression::from(v) * HINT_WEIGHT;
                }
            }
        }
    }

    // Objective: w_d * SCALE * distance - w_c * SCALE * coherence + w_p * SCALE * penalties.
    let (w_d, w_c) = config.weights.normalized();
    let scale = config.weights.scale as f64;
    let mut objective = Expression::from(0.0);
    let mut penalty_terms = Vec::new();

    for d in 0..d_count {
        for p in 0..p_count.saturating_sub(1) {
            for i in 0..n {
                let Some(vi) = grid.get(i, d, p) else { continue };
                for j in 0..n {
                    if i == j {
                        continue;
                    }
                    let Some(vj) = grid.get(j, d, p + 1) else { continue };
                    let dist = distance_km(input.distances, &input.pois[i].slug, &input.pois[j].slug, config);
                    let coh = input.coherence.lookup(&input.pois[i].slug, &input.pois[j].slug);

                    let trans = problem.add(variable().binary());
                    constraints.push((Expression::from(trans) - Expression::from(vi)).leq(0.0));
                    constraints.push((Expression::from(trans) - Expression::from(vj)).leq(0.0));
                    constraints
                        .push((Expression::from(trans) - Expression::from(vi) - Expression::from(vj)).geq(-1.0));

                    objective = objective + Expression::from(trans) * (w_d * scale * dist);
                    objective = objective - Expression::from(trans) * (w_c * scale * coh);
                }
            }
        }

        // Soft penalty: total walking distance on day `d` beyond the
        // threshold, bounded to `max_soft_penalty` (spec §4.5 "Soft penalties").
        let day_distance: Expression = (0..p_count.saturating_sub(1))
            .flat_map(|p| {
                (0..n).flat_map(move |i| {
                    (0..n).filter_map(move |j| if i == j { None } else { Some((i, j, p)) })
                })
            })
            .filter_map(|(i, j, p)| {
                grid.get(i, d, p).zip(grid.get(j, d, p + 1)).map(|(vi, vj)| {
                    let dist = distance_km(input.distances, &input.pois[i].slug, &input.pois[j].slug, config);
                    (vi, vj, dist)
                })
            })
            .map(|(vi, vj, dist)| {
                let gate = problem.add(variable().binary());
                constraints.push((Expression::from(gate) - Expression::from(vi)).leq(0.0));
                constraints.push((Expression::from(gate) - Expression::from(vj)).leq(0.0));
                Expression::from(gate) * dist
            })
            .sum();

        let penalty = problem.add(variable().min(0.0).max(config.max_soft_penalty as f64));
        constraints.push((Expression::from(penalty) - day_distance + config.day_walking_threshold_km).geq(0.0));
        penalty_terms.push(penalty);
    }

    for penalty in &penalty_terms {
        objective = objective + Expression::from(*penalty) * (config.weights.penalty_weight * scale / config.max_soft_penalty as f64);
    }

    objective = objective - hint_bonus;

    let mut model = problem.minimise(objective.clone()).using(microlp);
    for c in constraints {
        model = model.with(c);
    }

    let solution = model.solve().map_err(|_| "solver returned no feasible solution")?;
    let objective_value = solution.eval(&objective);

    let mut assigned: Vec<Option<(usize, usize)>> = vec![None; n];
    for ((i, d, p), var) in grid.vars.iter() {
        if solution.value(*var) > 0.5 {
            assigned[*i] = Some((*d, *p));
        }
    }
    if assigned.iter().any(|a| a.is_none()) {
        return Err("solver left a POI unassigned");
    }

    let mut ordered: Vec<(usize, usize, usize)> =
        assigned.into_iter().enumerate().map(|(i, dp)| (dp.unwrap().0, dp.unwrap().1, i)).collect();
    ordered.sort_by_key(|(d, p, _)| (*d, *p));

    let sequence: Vec<Slug> = ordered.iter().map(|(_, _, i)| input.pois[*i].slug.clone()).collect();
    let mut day_assignments = vec![Vec::new(); d_count];
    for (d, _, i) in &ordered {
        day_assignments[*d].push(input.pois[*i].slug.clone());
    }

    Ok((sequence, day_assignments, objective_value))
}

fn closest_poi(input: &SequencerInput, point: (f64, f64)) -> Option<(usize, f64)> {
    input
        .pois
        .iter()
        .enumerate()
        .filter_map(|(idx, poi)| poi.coordinates().map(|c| (idx, crate::haversine::haversine_km(point, c))))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
}

/// Solution extraction scoring, per spec §4.5 "Solution extraction":
/// `distance_score = clip(1 - total_km/(N*3.0), 0, 1)`,
/// `coherence_score = mean coherence over consecutive pairs` (0.5 default),
/// `overall_score = (distance_score + coherence_score) / 2`.
fn score_sequence(sequence: &[Slug], input: &SequencerInput, config: &PlannerConfig) -> Scores {
    let n = sequence.len().max(1);
    let total_distance_km: f64 = sequence.windows(2).map(|w| distance_km(input.distances, &w[0], &w[1], config)).sum();
    let distance_score = (1.0 - total_distance_km / (n as f64 * 3.0)).clamp(0.0, 1.0);

    let pairs = sequence.windows(2);
    let (sum, count) = pairs.fold((0.0, 0usize), |(sum, count), w| (sum + input.coherence.lookup(&w[0], &w[1]), count + 1));
    let coherence_score = if count > 0 { sum / count as f64 } else { 0.5 };

    let overall_score = (distance_score + coherence_score) / 2.0;
    Scores { distance_score, coherence_score, overall_score, total_distance_km }
}

/// Recomputes scores from a day-partitioned assignment, summing walking
/// distance only between consecutive POIs *within* the same day (never
/// across a day boundary) — grounded in the original re-optimizer's
/// `_recalculate_day_metrics`/`_calculate_overall_scores`, which is the
/// formula the Re-optimizer (§4.7) uses after a Tier-1/2/3 edit rather
/// than the Sequencer's own whole-sequence `score_sequence` above.
pub fn score_from_days(day_assignments: &[Vec<Slug>], distances: &Matrix, coherence: &CoherenceMatrix, config: &PlannerConfig) -> Scores {
    let mut total_distance_km = 0.0;
    let mut coherence_sum = 0.0;
    let mut coherence_count = 0usize;
    let mut total_pois = 0usize;

    for day in day_assignments {
        total_pois += day.len();
        for w in day.windows(2) {
            total_distance_km += distance_km(distances, &w[0], &w[1], config);
            coherence_sum += coherence.lookup(&w[0], &w[1]);
            coherence_count += 1;
        }
    }

    let n = total_pois.max(1);
    let distance_score = (1.0 - total_distance_km / (n as f64 * 3.0)).clamp(0.0, 1.0);
    let coherence_score = if coherence_count > 0 { coherence_sum / coherence_count as f64 } else { 0.5 };
    let overall_score = (distance_score + coherence_score) / 2.0;
    Scores { distance_score, coherence_score, overall_score, total_distance_km }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poi::{CoordinateSource, GeoPoint};

    fn poi_at(slug: &str, lat: f64, lng: f64) -> Poi {
        let mut p = Poi::minimal(slug, slug, "rome");
        p.location = Some(GeoPoint { latitude: lat, longitude: lng, source: CoordinateSource::Manual, collected_at: 0 });
        p
    }

    #[test]
    fn single_day_small_instance_assigns_every_poi() {
        let a = poi_at("a", 41.89, 12.49);
        let b = poi_at("b", 41.90, 12.50);
        let c = poi_at("c", 41.88, 12.48);
        let pois = vec![&a, &b, &c];
        let coherence = CoherenceMatrix::build(&pois);
        let distances = Matrix::default();
        let config = PlannerConfig::default();

        let input = SequencerInput {
            pois,
            must_see: vec![],
            combo_groups: vec![],
            distances: &distances,
            coherence: &coherence,
            day_count: 1,
            trip_start_weekday: 1,
            start_location: None,
            end_location: None,
            pace: Pace::Packed,
        };

        let result = solve(input, &config).unwrap();
        assert_eq!(result.sequence.len(), 3);
        let total_assigned: usize = result.day_assignments.iter().map(|d| d.len()).sum();
        assert_eq!(total_assigned, 3);
    }

    #[test]
    fn minutes_to_hhmm_wraps_midnight() {
        assert_eq!(minutes_to_hhmm(540), 900);
        assert_eq!(minutes_to_hhmm(1439), 2359);
    }
}

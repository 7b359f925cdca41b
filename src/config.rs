//! Typed configuration for the planning pipeline.
//!
//! Mirrors the teacher crate's `SolveOptions`: a plain struct of tunables
//! with a `Default` impl, populated by whatever binary/config-loader wires
//! up the core (peripheral to this crate, per spec §1).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pace {
    Relaxed,
    Normal,
    Packed,
}

impl Pace {
    /// Hours of POI-visiting budget per day, per spec §4.4.
    pub fn hours_per_day(self) -> f64 {
        match self {
            Pace::Relaxed => 6.0,
            Pace::Normal => 7.5,
            Pace::Packed => 9.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkingTolerance {
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndoorOutdoorPreference {
    Indoor,
    Outdoor,
    Balanced,
}

/// Weights and budgets for the Sequencer's objective (§4.5) and the Greedy
/// Sequencer's scoring (§4.6).
#[derive(Debug, Clone)]
pub struct SolverWeights {
    /// Weight on total walking distance in the objective (normalized with
    /// `coherence_weight` to sum to 1).
    pub distance_weight: f64,
    /// Weight on narrative coherence in the objective.
    pub coherence_weight: f64,
    /// Weight on soft-constraint penalties.
    pub penalty_weight: f64,
    /// Integer scale factor applied before handing weighted terms to the
    /// MIP solver.
    pub scale: i64,
}

impl Default for SolverWeights {
    fn default() -> Self {
        Self {
            distance_weight: 0.5,
            coherence_weight: 0.5,
            penalty_weight: 0.3,
            scale: 1000,
        }
    }
}

impl SolverWeights {
    /// Normalize `distance_weight`/`coherence_weight` to sum to 1, per spec.
    pub fn normalized(&self) -> (f64, f64) {
        let total = self.distance_weight + self.coherence_weight;
        if total <= 0.0 {
            (0.5, 0.5)
        } else {
            (self.distance_weight / total, self.coherence_weight / total)
        }
    }
}

/// Aggregate planner configuration: every numeric knob named across the
/// original spec's component sections.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub weights: SolverWeights,

    /// Default estimated visit duration (minutes) when a POI record omits
    /// one, per spec §3.
    pub default_visit_duration_minutes: i32,

    /// Expected arrival time of the first slot of each day, minutes from
    /// midnight (09:00 default).
    pub start_minutes: i32,
    /// Fixed per-slot duration used to project arrival times for every
    /// position, regardless of the POI actually scheduled there (§9 open
    /// question 1 — preserved faithfully, not "fixed").
    pub avg_slot_minutes: i32,

    /// CP-core solve timeout.
    pub solve_timeout_secs: u64,
    /// Parallel search workers for the solve/local-search phases.
    pub search_workers: usize,
    /// Relative optimality gap at which the solver may stop early.
    pub relative_gap_limit: f64,

    /// Soft-penalty cap per spec §4.5.
    pub max_soft_penalty: i64,
    /// Walking-distance threshold per day (km) above which a soft penalty
    /// accrues.
    pub day_walking_threshold_km: f64,

    /// Batch size for Distance Cache matrix/extend requests.
    pub distance_batch_size: usize,
    /// Conservative default (km) substituted when a pairwise distance is
    /// unknown, per spec §4.2.
    pub default_unknown_distance_km: f64,

    /// Starting-set size band targeted by the POI Selector.
    pub starting_set_min: usize,
    pub starting_set_max: usize,
    /// Backup count band per starting POI.
    pub backups_min: usize,
    pub backups_max: usize,
    /// Minimum similarity score for a backup candidate.
    pub backup_min_similarity: f64,
    /// Geographic proximity radius (km) qualifying a backup by location.
    pub backup_proximity_km: f64,

    /// Max local-search iterations for the Greedy Sequencer / Tier-2
    /// re-optimization (2-opt + relocate passes).
    pub local_search_iterations: usize,
    /// Assumed walking speed (km/h) used to estimate travel time between
    /// greedy-sequencer stops when only distance is known.
    pub walking_speed_kmh: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            weights: SolverWeights::default(),
            default_visit_duration_minutes: 120,
            start_minutes: 540,
            avg_slot_minutes: 150,
            solve_timeout_secs: 30,
            search_workers: 4,
            relative_gap_limit: 0.05,
            max_soft_penalty: 1000,
            day_walking_threshold_km: 5.0,
            distance_batch_size: 25,
            default_unknown_distance_km: 2.0,
            starting_set_min: 8,
            starting_set_max: 12,
            backups_min: 2,
            backups_max: 3,
            backup_min_similarity: 0.6,
            backup_proximity_km: 2.0,
            local_search_iterations: 100,
            walking_speed_kmh: 4.0,
        }
    }
}

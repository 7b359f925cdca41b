//! Tour data model (C8): the planning artifact the Sequencer/Greedy
//! Sequencer produce and the Tour Store persists, grounded in the
//! original's `tour_manager.py::TourManager.save_tour` shape (tour
//! document, generation record, transcript links, metadata).

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::{IndoorOutdoorPreference, Pace, WalkingTolerance};
use crate::distance::Matrix;
use crate::poi::Slug;
use crate::selector::{BackupCandidate, RejectedPoi};
use crate::sequencer::{Scores, SolverStats, SolverStatus};

/// `--mode simple|ilp` from spec §6: which sequencer produced this tour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanningMode {
    Simple,
    Ilp,
}

/// The exact call that produced a tour version, per spec §3 "Input parameters".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputParameters {
    pub city: String,
    pub duration_days: u32,
    pub interests: Vec<String>,
    pub pace: Pace,
    pub walking_tolerance: WalkingTolerance,
    pub indoor_outdoor: IndoorOutdoorPreference,
    pub must_see: Vec<Slug>,
    pub mode: PlanningMode,
    pub start_location: Option<(f64, f64)>,
    pub end_location: Option<(f64, f64)>,
    pub start_date: NaiveDate,
}

impl InputParameters {
    /// A stable hash of the parameters used to detect whether a replay
    /// would reproduce this version, per spec §3 "input-parameter hash".
    pub fn hash(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.city.hash(&mut hasher);
        self.duration_days.hash(&mut hasher);
        self.interests.hash(&mut hasher);
        (self.pace as u8 as i32).hash(&mut hasher);
        (self.walking_tolerance as u8 as i32).hash(&mut hasher);
        (self.indoor_outdoor as u8 as i32).hash(&mut hasher);
        self.must_see.hash(&mut hasher);
        (self.mode as u8 as i32).hash(&mut hasher);
        self.start_date.to_string().hash(&mut hasher);
        if let Some((lat, lng)) = self.start_location {
            lat.to_bits().hash(&mut hasher);
            lng.to_bits().hash(&mut hasher);
        }
        if let Some((lat, lng)) = self.end_location {
            lat.to_bits().hash(&mut hasher);
            lng.to_bits().hash(&mut hasher);
        }
        hasher.finish()
    }
}

/// One POI stop within a `Day`, per spec §3 "Itinerary".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayAssignment {
    pub poi: Slug,
    pub poi_name: String,
    pub estimated_hours: f64,
    pub coordinates: Option<(f64, f64)>,
    /// Walking time/distance to the next POI in this day, `None` for the
    /// last stop of the day.
    pub walk_minutes_to_next: Option<f64>,
    pub walk_km_to_next: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Day {
    pub day_number: u32,
    pub assignments: Vec<DayAssignment>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Rounds every field of `Scores` to 2 decimals, per spec §3/§8 invariant 9.
pub fn rounded_scores(scores: &Scores) -> Scores {
    Scores {
        distance_score: round2(scores.distance_score),
        coherence_score: round2(scores.coherence_score),
        overall_score: round2(scores.overall_score),
        total_distance_km: round2(scores.total_distance_km),
    }
}

/// One version of a tour document, per spec §3 "Tour".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TourDocument {
    pub tour_id: String,
    pub language: String,
    pub itinerary: Vec<Day>,
    pub scores: Scores,
    /// Backup candidates per starting POI. Authoritative on the tour
    /// document after the first replacement; before that, the generation
    /// record is authoritative (spec §9 open question 2).
    pub backup_pois: HashMap<Slug, Vec<BackupCandidate>>,
    pub rejected_pois: Vec<RejectedPoi>,
    pub input_parameters: InputParameters,
    pub solver_stats: Option<SolverStats>,
    /// The distance-cache pairs bundled with this tour, so replacements
    /// don't need to re-query the provider for already-known pairs
    /// (spec §3 "Distance cache").
    #[serde(default)]
    pub distance_cache: Matrix,
}

/// A version's audit-trail entry inside `metadata.json`, per spec §4.8.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: u32,
    pub version_string: String,
    pub timestamp: i64,
    pub user_id: String,
    pub input_hash: u64,
    pub optimization_score: f64,
    pub constraint_violation_count: u32,
}

/// Per-(tour, language) version bookkeeping plus tour-wide identity, per
/// spec §4.8 "metadata.json".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub tour_id: String,
    pub city: String,
    pub languages: Vec<String>,
    pub current_version: HashMap<String, u32>,
    pub version_history: HashMap<String, Vec<VersionEntry>>,
    pub created_by: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Metadata {
    pub fn new(tour_id: impl Into<String>, city: impl Into<String>, created_by: impl Into<String>, now: i64) -> Self {
        Self {
            tour_id: tour_id.into(),
            city: city.into(),
            languages: Vec::new(),
            current_version: HashMap::new(),
            version_history: HashMap::new(),
            created_by: created_by.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn current_version_for(&self, language: &str) -> u32 {
        self.current_version.get(language).copied().unwrap_or(0)
    }
}

/// Inputs used, scores, constraint violations, and the selection decision
/// for one tour version, per spec §4.8 "generation_record".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub version: u32,
    pub version_string: String,
    pub language: String,
    pub timestamp: i64,
    pub user_id: String,
    pub input_parameters: InputParameters,
    pub scores: Scores,
    pub constraint_violation_count: u32,
    pub solver_status: Option<SolverStatus>,
    pub backup_pois: HashMap<Slug, Vec<BackupCandidate>>,
    pub rejected_pois: Vec<RejectedPoi>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptType {
    Standard,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptLink {
    pub poi: String,
    pub poi_id: Slug,
    pub transcript_path: String,
    pub transcript_version: u32,
    pub transcript_type: TranscriptType,
    pub linked_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptLinks {
    pub links: Vec<TranscriptLink>,
}

impl TranscriptLinks {
    pub fn find_mut(&mut self, poi_id: &str) -> Option<&mut TranscriptLink> {
        self.links.iter_mut().find(|l| l.poi_id == poi_id)
    }
}

/// Version string, e.g. `v3_2026-03-12`, per spec §4.8 "Version numbering".
pub fn version_string(version: u32, date: NaiveDate) -> String {
    format!("v{version}_{date}")
}

/// A minimal tour-listing row, per spec §4.8 "Listing".
#[derive(Debug, Clone)]
pub struct TourSummary {
    pub tour_id: String,
    pub city: String,
    pub updated_at: i64,
    pub current_version_by_language: HashMap<String, u32>,
}

//! Top-level planning pipeline: the operation behind `trip plan` / `POST
//! /tours` (spec §6). Wires the leaf components together in the order spec
//! §2's data-flow table lays out: C1 (an already-loaded `Catalog`) feeds
//! C4 (`selector::reconcile`); C4's starting set feeds C2 (`distance::
//! compute_all`) and C3 (`CoherenceMatrix::build`); those feed C5/C6
//! (`sequencer::solve` or `greedy::sequence`, chosen by `PlanningMode`);
//! the scheduled itinerary is handed to C8 (`TourStore::save`).
//!
//! The original has no single top-level orchestrator module; this call
//! order is inferred from reading the individual agent files together —
//! `original_source/src/trip_planner/poi_selector_agent.py` (selection),
//! `itinerary_optimizer.py` (distance matrix + optimize), and
//! `tour_manager.py` (save) — which is the sequence each expects its
//! inputs to already exist in when it runs.

use chrono::NaiveDate;
use tracing::{info, instrument, warn};

use crate::catalog::Catalog;
use crate::coherence::CoherenceMatrix;
use crate::combo::Issue;
use crate::config::{IndoorOutdoorPreference, Pace, PlannerConfig, WalkingTolerance};
use crate::distance;
use crate::error::Result;
use crate::geo_provider::GeoProvider;
use crate::greedy;
use crate::poi::Slug;
use crate::reoptimizer::build_day;
use crate::selector::{self, Selector, SelectionRequest};
use crate::sequencer::{self, SequencerInput};
use crate::store::{SaveInputs, SaveOutcome, TourStore};
use crate::tour::{InputParameters, PlanningMode, TourDocument};

/// The exact call spec §3 "Input parameters" says every tour version
/// records, before it's reduced to an `InputParameters` for persistence.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub city: String,
    pub duration_days: u32,
    pub interests: Vec<String>,
    pub pace: Pace,
    pub walking_tolerance: WalkingTolerance,
    pub indoor_outdoor: IndoorOutdoorPreference,
    pub must_see: Vec<Slug>,
    pub avoid: Vec<Slug>,
    pub mode: PlanningMode,
    pub language: String,
    pub start_location: Option<(f64, f64)>,
    pub end_location: Option<(f64, f64)>,
    pub start_date: NaiveDate,
    pub user_id: String,
}

#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub save: SaveOutcome,
    /// Warnings surfaced during selector reconciliation (dropped unknown
    /// POIs, reinserted must-sees, budget trims) — never fail the request,
    /// per spec §7 "Propagation policy".
    pub selection_issues: Vec<Issue>,
}

/// `start_date`'s weekday in spec §3's Sunday=0 convention.
fn weekday_of(date: NaiveDate) -> u8 {
    date.format("%w").to_string().parse().unwrap_or(0)
}

/// Runs the full pipeline and persists a brand-new tour (version 1) for
/// `request.language`. Callers needing other languages of the same
/// itinerary call this once per language, each producing its own
/// independent version-1 document (spec §8 scenario S6 "Language
/// isolation").
#[instrument(skip(store, catalog, selector_port, provider, config, request), fields(city = %request.city, language = %request.language))]
pub fn plan_tour(
    store: &TourStore,
    catalog: &Catalog,
    selector_port: &impl Selector,
    provider: &(impl GeoProvider + Sync),
    config: &PlannerConfig,
    request: PlanRequest,
    now: i64,
) -> Result<PlanOutcome> {
    let candidate_slugs: Vec<Slug> = catalog.list().iter().map(|p| p.slug.clone()).collect();
    let selection_request = SelectionRequest {
        city: request.city.clone(),
        duration_days: request.duration_days,
        interests: request.interests.clone(),
        pace: request.pace,
        walking_tolerance: request.walking_tolerance,
        indoor_outdoor: request.indoor_outdoor,
        must_see: request.must_see.clone(),
        avoid: request.avoid.clone(),
    };

    // Classifies a port failure into the right `Error` variant; retrying a
    // transient one is left to the port implementation or its caller.
    let decision = selector_port.select(&selection_request, &candidate_slugs).map_err(|e| e.into_error(false))?;
    let (final_selection, selection_issues) = selector::reconcile(catalog, &selection_request, decision, config);
    info!(
        starting = final_selection.starting_pois.len(),
        rejected = final_selection.rejected_pois.len(),
        issues = selection_issues.len(),
        "selector output reconciled"
    );

    let starting_pois: Vec<&crate::poi::Poi> = final_selection
        .starting_pois
        .iter()
        .filter_map(|slug| catalog.get(slug).ok())
        .collect();
    if starting_pois.len() != final_selection.starting_pois.len() {
        warn!("some reconciled starting POIs vanished from the catalog between reconcile and lookup");
    }

    let distances = distance::compute_all(&starting_pois, provider, config)?;
    let coherence = CoherenceMatrix::build(&starting_pois);
    let combo_groups = catalog.combo_groups();
    let trip_start_weekday = weekday_of(request.start_date);

    let (day_assignments, solver_stats) = match request.mode {
        PlanningMode::Ilp => {
            let input = SequencerInput {
                pois: starting_pois.clone(),
                must_see: request.must_see.clone(),
                combo_groups,
                distances: &distances,
                coherence: &coherence,
                day_count: request.duration_days as usize,
                trip_start_weekday,
                start_location: request.start_location,
                end_location: request.end_location,
                pace: request.pace,
            };
            let output = sequencer::solve(input, config)?;
            (output.day_assignments, Some(output.solver_stats))
        }
        PlanningMode::Simple => {
            let result = greedy::sequence(&starting_pois, &request.must_see, &distances, &coherence, request.pace, config);
            (result.day_assignments, None)
        }
    };

    let itinerary = day_assignments
        .iter()
        .enumerate()
        .map(|(idx, slugs)| build_day(idx as u32 + 1, slugs, catalog, &distances, config))
        .collect();
    let scores = sequencer::score_from_days(&day_assignments, &distances, &coherence, config);

    let input_parameters = InputParameters {
        city: request.city.clone(),
        duration_days: request.duration_days,
        interests: request.interests,
        pace: request.pace,
        walking_tolerance: request.walking_tolerance,
        indoor_outdoor: request.indoor_outdoor,
        must_see: request.must_see,
        mode: request.mode,
        start_location: request.start_location,
        end_location: request.end_location,
        start_date: request.start_date,
    };

    let document = TourDocument {
        tour_id: String::new(),
        language: request.language.clone(),
        itinerary,
        scores,
        backup_pois: final_selection.backup_pois,
        rejected_pois: final_selection.rejected_pois,
        input_parameters,
        solver_stats,
        distance_cache: distances,
    };

    let save = store.save(
        None,
        &request.city,
        &request.language,
        document,
        SaveInputs { user_id: request.user_id, constraint_violation_count: 0 },
        now,
    )?;

    Ok(PlanOutcome { save, selection_issues })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combo::TicketType;
    use crate::geo_provider::StaticGeoProvider;
    use crate::poi::Poi;
    use crate::selector::{BackupCandidate, ScriptedSelector, SelectionDecision};
    use std::collections::HashMap;

    fn open_poi(slug: &str, lat: f64, lng: f64) -> Poi {
        Poi {
            slug: slug.to_string(),
            name: slug.to_string(),
            city: "rome".to_string(),
            location: Some(crate::poi::GeoPoint {
                latitude: lat,
                longitude: lng,
                source: crate::poi::CoordinateSource::Manual,
                collected_at: 0,
            }),
            estimated_visit_minutes: 120,
            opening_hours: crate::poi::OpeningHours::new((0..7).map(|d| crate::poi::Period { day_of_week: d, open_hhmm: 0, close_hhmm: 2359 }).collect()),
            ..Default::default()
        }
    }

    fn tempdir() -> std::path::PathBuf {
        let mut dir = std::env::temp_dir();
        let nanos = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().subsec_nanos();
        dir.push(format!("tour-planner-planner-test-{nanos}"));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn plan_tour_simple_mode_produces_a_saved_version_one() {
        let a = open_poi("a", 41.89, 12.49);
        let b = open_poi("b", 41.90, 12.50);
        let c = open_poi("c", 41.88, 12.48);
        let catalog = Catalog::from_parts("rome", vec![a.clone(), b.clone(), c.clone()], vec![]);

        let decision = SelectionDecision {
            starting_pois: vec!["a".into(), "b".into(), "c".into()],
            backup_pois: HashMap::new(),
            rejected_pois: vec![],
            reasoning_summary: "test fixture".into(),
        };
        let selector_port = ScriptedSelector::new(decision);
        let provider = StaticGeoProvider::new(4.0);
        let config = PlannerConfig::default();
        let dir = tempdir();
        let store = TourStore::new(&dir);

        let request = PlanRequest {
            city: "rome".into(),
            duration_days: 1,
            interests: vec!["history".into()],
            pace: Pace::Normal,
            walking_tolerance: WalkingTolerance::Moderate,
            indoor_outdoor: IndoorOutdoorPreference::Balanced,
            must_see: vec![],
            avoid: vec![],
            mode: PlanningMode::Simple,
            language: "en".into(),
            start_location: None,
            end_location: None,
            start_date: NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(),
            user_id: "alice".into(),
        };

        let outcome = plan_tour(&store, &catalog, &selector_port, &provider, &config, request, 1_700_000_000).unwrap();
        assert_eq!(outcome.save.version, 1);

        let document = store.load_current("rome", &outcome.save.tour_id, "en").unwrap();
        let total: usize = document.itinerary.iter().map(|d| d.assignments.len()).sum();
        assert_eq!(total, 3);
        assert!(document.solver_stats.is_none(), "simple mode never invokes the CP solver");
    }

    #[test]
    fn plan_tour_reinserts_a_must_see_the_selector_dropped() {
        let colosseum = open_poi("colosseum", 41.89, 12.49);
        let forum = open_poi("forum", 41.892, 12.485);
        let catalog = Catalog::from_parts("rome", vec![colosseum, forum], vec![]);

        // Selector's decision omits the must-see entirely.
        let decision = SelectionDecision {
            starting_pois: vec!["forum".into()],
            backup_pois: HashMap::new(),
            rejected_pois: vec![],
            reasoning_summary: "incomplete".into(),
        };
        let selector_port = ScriptedSelector::new(decision);
        let provider = StaticGeoProvider::new(4.0);
        let config = PlannerConfig::default();
        let dir = tempdir();
        let store = TourStore::new(&dir);

        let request = PlanRequest {
            city: "rome".into(),
            duration_days: 1,
            interests: vec![],
            pace: Pace::Normal,
            walking_tolerance: WalkingTolerance::Moderate,
            indoor_outdoor: IndoorOutdoorPreference::Balanced,
            must_see: vec!["colosseum".into()],
            avoid: vec![],
            mode: PlanningMode::Simple,
            language: "en".into(),
            start_location: None,
            end_location: None,
            start_date: NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(),
            user_id: "alice".into(),
        };

        let outcome = plan_tour(&store, &catalog, &selector_port, &provider, &config, request, 1_700_000_000).unwrap();
        assert!(outcome.selection_issues.iter().any(|i| i.message.contains("reinserted must-see")));

        let document = store.load_current("rome", &outcome.save.tour_id, "en").unwrap();
        let all_pois: Vec<&str> = document.itinerary.iter().flat_map(|d| d.assignments.iter().map(|a| a.poi.as_str())).collect();
        assert!(all_pois.contains(&"colosseum"));
    }

    #[test]
    fn plan_tour_ilp_mode_keeps_combo_group_together() {
        let colosseum = open_poi("colosseum", 41.89, 12.49);
        let forum = open_poi("forum", 41.892, 12.485);
        let mut colosseum_combo = colosseum.clone();
        colosseum_combo.combo_group_ids = vec!["pass".into()];
        let mut forum_combo = forum.clone();
        forum_combo.combo_group_ids = vec!["pass".into()];
        let pantheon = open_poi("pantheon", 41.899, 12.4768);

        let group = crate::combo::ComboGroup {
            id: "pass".into(),
            city: "rome".into(),
            members: vec!["colosseum".into(), "forum".into()],
            constraints: crate::combo::ComboConstraints {
                must_visit_together: true,
                max_separation_hours: 4.0,
                visit_order: crate::combo::VisitOrder::Flexible,
                same_day_required: true,
                ticket_type: TicketType::SameDayAnyOrder,
            },
        };
        let catalog = Catalog::from_parts("rome", vec![colosseum_combo, forum_combo, pantheon], vec![group]);

        let decision = SelectionDecision {
            starting_pois: vec!["colosseum".into(), "forum".into(), "pantheon".into()],
            backup_pois: HashMap::from([(
                "pantheon".to_string(),
                vec![BackupCandidate { poi: "colosseum".into(), similarity_score: 0.7, reason: "nearby".into() }],
            )]),
            rejected_pois: vec![],
            reasoning_summary: "test".into(),
        };
        let selector_port = ScriptedSelector::new(decision);
        let provider = StaticGeoProvider::new(4.0);
        let config = PlannerConfig::default();
        let dir = tempdir();
        let store = TourStore::new(&dir);

        let request = PlanRequest {
            city: "rome".into(),
            duration_days: 2,
            interests: vec!["history".into()],
            pace: Pace::Normal,
            walking_tolerance: WalkingTolerance::Moderate,
            indoor_outdoor: IndoorOutdoorPreference::Balanced,
            must_see: vec![],
            avoid: vec![],
            mode: PlanningMode::Ilp,
            language: "en".into(),
            start_location: None,
            end_location: None,
            start_date: NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(),
            user_id: "alice".into(),
        };

        let outcome = plan_tour(&store, &catalog, &selector_port, &provider, &config, request, 1_700_000_000).unwrap();
        let document = store.load_current("rome", &outcome.save.tour_id, "en").unwrap();
        assert!(document.solver_stats.is_some());

        let day_of = |slug: &str| document.itinerary.iter().position(|d| d.assignments.iter().any(|a| a.poi == slug)).unwrap();
        assert_eq!(day_of("colosseum"), day_of("forum"), "combo-group members must share a day");
    }
}

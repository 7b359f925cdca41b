//! Re-optimizer (C7): the three-tier strategy dispatcher for `replace_poi`
//! / `replace_pois_batch` edit events, grounded in the original's
//! `itinerary_reoptimizer.py::ItineraryReoptimizer` (`_determine_strategy`,
//! `_local_swap_optimization`, `_day_level_optimization`,
//! `_full_tour_optimization`).

use std::collections::{HashMap, HashSet};

use chrono::{TimeZone, Utc};
use tracing::{info, instrument};

use crate::catalog::Catalog;
use crate::coherence::CoherenceMatrix;
use crate::combo::ComboGroup;
use crate::config::PlannerConfig;
use crate::distance::{self, Matrix};
use crate::error::{Error, Result};
use crate::geo_provider::GeoProvider;
use crate::greedy;
use crate::poi::{Poi, Slug};
use crate::selector::BackupCandidate;
use crate::sequencer::{self, SequencerInput, SolverStats};
use crate::store::{SaveInputs, SaveOutcome, TourStore};
use crate::tour::{Day, DayAssignment, TourDocument, TranscriptLink, TranscriptLinks, TranscriptType};

/// One `{original_poi, replacement_poi, day}` record from spec §4.7.
#[derive(Debug, Clone)]
pub struct ReplacementEvent {
    pub original_poi: Slug,
    pub replacement_poi: Slug,
    pub day: u32,
}

#[derive(Debug, Clone)]
pub struct ReplaceRequest {
    pub city: String,
    pub tour_id: String,
    pub language: String,
    pub replacements: Vec<ReplacementEvent>,
    pub user_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    LocalSwap,
    DayLevel,
    FullTour,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::LocalSwap => "local_swap",
            Tier::DayLevel => "day_level",
            Tier::FullTour => "full_tour",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReoptimizeOutcome {
    pub save: SaveOutcome,
    pub tier: Tier,
}

/// Pre-flight validation, per spec §4.7: every check must pass or the
/// event is rejected with a specific error; nothing is mutated until all
/// checks pass.
fn validate(document: &TourDocument, backups: &HashMap<Slug, Vec<BackupCandidate>>, request: &ReplaceRequest) -> Result<()> {
    if request.replacements.is_empty() {
        return Err(Error::invalid("REPLACEMENT_EMPTY", "replace request carries no replacements"));
    }

    let itinerary_pois: HashSet<&str> = document.itinerary.iter().flat_map(|d| d.assignments.iter().map(|a| a.poi.as_str())).collect();

    for event in &request.replacements {
        if !itinerary_pois.contains(event.original_poi.as_str()) {
            return Err(Error::not_found(
                "REPLACEMENT_ORIGINAL_NOT_IN_TOUR",
                format!("'{}' is not in the current itinerary", event.original_poi),
            ));
        }
        let allowed = backups.get(&event.original_poi).map(|list| list.iter().any(|b| b.poi == event.replacement_poi)).unwrap_or(false);
        if !allowed {
            return Err(Error::invalid(
                "REPLACEMENT_NOT_A_BACKUP",
                format!("'{}' is not in the backup list for '{}'", event.replacement_poi, event.original_poi),
            ));
        }
    }
    Ok(())
}

/// Resolves the backup list the pre-flight check and backup-maintenance
/// logic treat as authoritative: the tour document after the first
/// replacement, the generation record's selection output otherwise (spec
/// §9 open question 2).
fn effective_backups(document: &TourDocument, generation_backups: &HashMap<Slug, Vec<BackupCandidate>>) -> HashMap<Slug, Vec<BackupCandidate>> {
    if document.backup_pois.is_empty() {
        generation_backups.clone()
    } else {
        document.backup_pois.clone()
    }
}

/// Strategy selection per spec §4.7: single replacement on a day with <=5
/// POIs is `local_swap`; otherwise <=2 affected days is `day_level`;
/// anything broader is `full_tour`.
pub fn classify(document: &TourDocument, replacements: &[ReplacementEvent]) -> Tier {
    if replacements.len() == 1 {
        let day_num = replacements[0].day;
        if let Some(day) = document.itinerary.iter().find(|d| d.day_number == day_num) {
            if day.assignments.len() <= 5 {
                return Tier::LocalSwap;
            }
        }
    }

    let affected_days: HashSet<u32> = replacements.iter().map(|r| r.day).collect();
    if affected_days.len() <= 2 {
        Tier::DayLevel
    } else {
        Tier::FullTour
    }
}

pub(crate) fn day_assignment_for(poi: &Poi, prior: Option<&DayAssignment>) -> DayAssignment {
    DayAssignment {
        poi: poi.slug.clone(),
        poi_name: poi.name.clone(),
        estimated_hours: poi.estimated_visit_minutes as f64 / 60.0,
        coordinates: poi.coordinates(),
        walk_minutes_to_next: prior.and_then(|p| p.walk_minutes_to_next),
        walk_km_to_next: prior.and_then(|p| p.walk_km_to_next),
    }
}

pub(crate) fn recompute_day_legs(day: &mut Day, distances: &Matrix, config: &PlannerConfig) {
    let n = day.assignments.len();
    for i in 0..n {
        let (minutes, km) = if i + 1 < n {
            let a = &day.assignments[i].poi;
            let b = &day.assignments[i + 1].poi;
            let km = sequencer::distance_km(distances, a, b, config);
            (km / config.walking_speed_kmh * 60.0, km)
        } else {
            (0.0, 0.0)
        };
        let has_next = i + 1 < n;
        day.assignments[i].walk_minutes_to_next = has_next.then_some(minutes);
        day.assignments[i].walk_km_to_next = has_next.then_some(km);
    }
}

fn day_slugs(document: &TourDocument) -> Vec<Vec<Slug>> {
    document.itinerary.iter().map(|d| d.assignments.iter().map(|a| a.poi.clone()).collect()).collect()
}

/// Builds a fresh `Day` (positions/legs recomputed) from an ordered list of
/// POI slugs, reusing catalog lookups for name/coordinates/duration.
pub(crate) fn build_day(day_number: u32, sequence: &[Slug], catalog: &Catalog, distances: &Matrix, config: &PlannerConfig) -> Day {
    let mut assignments: Vec<DayAssignment> = sequence
        .iter()
        .filter_map(|slug| catalog.get(slug).ok())
        .map(|poi| day_assignment_for(poi, None))
        .collect();
    let mut day = Day { day_number, assignments: std::mem::take(&mut assignments) };
    recompute_day_legs(&mut day, distances, config);
    day
}

/// Tier 1: swap the replacement in at the original's position within its
/// day, leaving every other day byte-identical (spec §4.7/§8 scenario S4).
fn local_swap(document: &mut TourDocument, event: &ReplacementEvent, catalog: &Catalog, distances: &Matrix, config: &PlannerConfig) -> Result<()> {
    let replacement = catalog.get(&event.replacement_poi)?;
    let day = document
        .itinerary
        .iter_mut()
        .find(|d| d.day_number == event.day)
        .ok_or_else(|| Error::not_found("REOPTIMIZE_DAY_NOT_FOUND", format!("day {} not found", event.day)))?;
    let position = day
        .assignments
        .iter()
        .position(|a| a.poi == event.original_poi)
        .ok_or_else(|| Error::not_found("REOPTIMIZE_POI_NOT_IN_DAY", format!("'{}' not found in day {}", event.original_poi, event.day)))?;

    day.assignments[position] = day_assignment_for(replacement, None);
    recompute_day_legs(day, distances, config);
    Ok(())
}

/// Tier 2: re-run the Greedy Sequencer + 2-opt on each affected day
/// independently, other days untouched.
fn day_level(
    document: &mut TourDocument,
    events: &[ReplacementEvent],
    catalog: &Catalog,
    distances: &Matrix,
    coherence: &CoherenceMatrix,
    config: &PlannerConfig,
) -> Result<()> {
    let by_day: HashMap<u32, Vec<&ReplacementEvent>> = events.iter().fold(HashMap::new(), |mut acc, e| {
        acc.entry(e.day).or_default().push(e);
        acc
    });

    for (day_number, day_events) in &by_day {
        let day_idx = document
            .itinerary
            .iter()
            .position(|d| d.day_number == *day_number)
            .ok_or_else(|| Error::not_found("REOPTIMIZE_DAY_NOT_FOUND", format!("day {day_number} not found")))?;

        let mut slugs: Vec<Slug> = document.itinerary[day_idx].assignments.iter().map(|a| a.poi.clone()).collect();
        for event in day_events {
            if let Some(pos) = slugs.iter().position(|s| s == &event.original_poi) {
                slugs[pos] = event.replacement_poi.clone();
            } else {
                return Err(Error::not_found("REOPTIMIZE_POI_NOT_IN_DAY", format!("'{}' not found in day {day_number}", event.original_poi)));
            }
        }

        let pois: Vec<&Poi> = slugs.iter().filter_map(|s| catalog.get(s).ok()).collect();
        let priority = vec![slugs[0].clone()];
        let resequenced = greedy::resequence_day(&pois, &priority, distances, coherence, config);
        document.itinerary[day_idx] = build_day(*day_number, &resequenced, catalog, distances, config);
    }
    Ok(())
}

/// Tier 3: apply every replacement, then rerun the full Sequencer over all
/// selected POIs, holding the selected set (not the sequencing) fixed.
fn full_tour(
    document: &mut TourDocument,
    events: &[ReplacementEvent],
    catalog: &Catalog,
    combo_groups: &[&ComboGroup],
    distances: &Matrix,
    coherence: &CoherenceMatrix,
    config: &PlannerConfig,
) -> Result<Option<SolverStats>> {
    let replace_map: HashMap<&str, &str> = events.iter().map(|e| (e.original_poi.as_str(), e.replacement_poi.as_str())).collect();

    let mut all_slugs: Vec<Slug> = Vec::new();
    for day in &document.itinerary {
        for a in &day.assignments {
            let slug = replace_map.get(a.poi.as_str()).copied().unwrap_or(a.poi.as_str());
            all_slugs.push(slug.to_string());
        }
    }

    let pois: Vec<&Poi> = all_slugs.iter().filter_map(|s| catalog.get(s).ok()).collect();
    let must_see: Vec<Slug> = all_slugs.first().cloned().into_iter().collect();

    let trip_start_weekday = document.input_parameters.start_date.format("%w").to_string().parse::<u8>().unwrap_or(0);

    let input = SequencerInput {
        pois,
        must_see,
        combo_groups: combo_groups.to_vec(),
        distances,
        coherence,
        day_count: document.itinerary.len().max(1),
        trip_start_weekday,
        start_location: document.input_parameters.start_location,
        end_location: document.input_parameters.end_location,
        pace: document.input_parameters.pace,
    };

    let output = sequencer::solve(input, config)?;
    document.itinerary = output
        .day_assignments
        .into_iter()
        .enumerate()
        .map(|(idx, slugs)| build_day(idx as u32 + 1, &slugs, catalog, distances, config))
        .collect();
    document.scores = output.scores;
    Ok(Some(output.solver_stats))
}

/// After replacing O with R: R's new backup list starts with O (similarity
/// 1.0, "can swap back"), then O's prior backups, then R's own prior
/// backups, de-duplicated preserving order; O's own entry is removed, per
/// spec §4.7 "Backup-list maintenance".
fn maintain_backups(backups: &mut HashMap<Slug, Vec<BackupCandidate>>, original: &str, replacement: &str) {
    let original_backups = backups.remove(original).unwrap_or_default();
    let replacement_prior = backups.get(replacement).cloned().unwrap_or_default();

    let mut new_list = vec![BackupCandidate { poi: original.to_string(), similarity_score: 1.0, reason: "can swap back".to_string() }];
    let mut seen: HashSet<Slug> = new_list.iter().map(|b| b.poi.clone()).collect();

    for candidate in original_backups.into_iter().chain(replacement_prior) {
        if candidate.poi == replacement {
            continue;
        }
        if seen.insert(candidate.poi.clone()) {
            new_list.push(candidate);
        }
    }

    backups.insert(replacement.to_string(), new_list);
}

/// Updates the transcript link for `original`'s POI id to point at
/// `replacement`, reusing whatever transcript version is already recorded
/// for `replacement` (or `1` if it has none yet), per spec §4.7
/// "Transcript-link maintenance".
fn maintain_transcript_link(links: &mut TranscriptLinks, catalog: &Catalog, original: &str, replacement: &str, now: i64) -> Result<()> {
    let replacement_poi = catalog.get(replacement)?;
    let reused_version = links.links.iter().find(|l| l.poi_id == replacement).map(|l| l.transcript_version).unwrap_or(1);

    if let Some(existing) = links.find_mut(original) {
        existing.poi = replacement_poi.name.clone();
        existing.poi_id = replacement.to_string();
        existing.transcript_path = format!("content/{}/{}.md", replacement_poi.city, replacement_poi.slug);
        existing.transcript_version = reused_version;
        existing.linked_at = now;
    } else {
        links.links.push(TranscriptLink {
            poi: replacement_poi.name.clone(),
            poi_id: replacement.to_string(),
            transcript_path: format!("content/{}/{}.md", replacement_poi.city, replacement_poi.slug),
            transcript_version: reused_version,
            transcript_type: TranscriptType::Standard,
            linked_at: now,
        });
    }
    Ok(())
}

/// Entry point: dispatches a replacement event to the right tier, extends
/// the distance cache, maintains backups/transcript links, and commits a
/// new tour version, per spec §4.7.
#[instrument(skip(store, catalog, provider, config, request), fields(tour_id = %request.tour_id, language = %request.language))]
pub fn reoptimize(
    store: &TourStore,
    catalog: &Catalog,
    provider: &(impl GeoProvider + Sync),
    config: &PlannerConfig,
    request: ReplaceRequest,
    now: i64,
) -> Result<ReoptimizeOutcome> {
    let mut document = store.load_current(&request.city, &request.tour_id, &request.language)?;
    let metadata = store.load_metadata(&request.city, &request.tour_id)?;
    let current_version = metadata.current_version_for(&request.language);
    let version_save_date = metadata
        .version_history
        .get(&request.language)
        .and_then(|entries| entries.iter().find(|e| e.version == current_version))
        .map(|entry| Utc.timestamp_opt(entry.timestamp, 0).single().unwrap_or_else(Utc::now).date_naive());
    let generation = version_save_date.and_then(|date| {
        store.load_generation_record(&request.city, &request.tour_id, &request.language, current_version, date).ok()
    });
    let generation_backups = generation.as_ref().map(|g| g.backup_pois.clone()).unwrap_or_default();

    let backups = effective_backups(&document, &generation_backups);
    validate(&document, &backups, &request)?;

    let tier = classify(&document, &request.replacements);
    info!(tier = tier.as_str(), replacements = request.replacements.len(), "re-optimizer strategy selected");

    // Distance-cache extension: every new POI against every existing POI
    // in the tour, both directions, never re-querying known pairs.
    let existing_slugs: HashSet<Slug> = document.itinerary.iter().flat_map(|d| d.assignments.iter().map(|a| a.poi.clone())).collect();
    let new_pois: Vec<&Poi> = request
        .replacements
        .iter()
        .filter_map(|e| catalog.get(&e.replacement_poi).ok())
        .filter(|p| !existing_slugs.contains(&p.slug))
        .collect();
    let existing_pois: Vec<&Poi> = existing_slugs.iter().filter_map(|s| catalog.get(s).ok()).collect();
    document.distance_cache = distance::extend(&new_pois, &existing_pois, provider, &document.distance_cache, config)?;

    let mut all_pois_for_coherence: Vec<&Poi> = existing_pois.clone();
    all_pois_for_coherence.extend(new_pois.iter().copied());
    let coherence = CoherenceMatrix::build(&all_pois_for_coherence);

    let mut solver_stats = document.solver_stats.clone();
    match tier {
        Tier::LocalSwap => {
            let distances = document.distance_cache.clone();
            local_swap(&mut document, &request.replacements[0], catalog, &distances, config)?;
            document.scores = sequencer::score_from_days(&day_slugs(&document), &distances, &coherence, config);
        }
        Tier::DayLevel => {
            let distances = document.distance_cache.clone();
            day_level(&mut document, &request.replacements, catalog, &distances, &coherence, config)?;
            document.scores = sequencer::score_from_days(&day_slugs(&document), &distances, &coherence, config);
        }
        Tier::FullTour => {
            let combo_groups = catalog.combo_groups();
            let distances = document.distance_cache.clone();
            solver_stats = full_tour(&mut document, &request.replacements, catalog, &combo_groups, &distances, &coherence, config)?;
        }
    }
    document.solver_stats = solver_stats;

    let mut backups = backups;
    for event in &request.replacements {
        maintain_backups(&mut backups, &event.original_poi, &event.replacement_poi);
    }
    document.backup_pois = backups;

    let mut links = store.load_transcript_links(&request.city, &request.tour_id, &request.language).unwrap_or_default();
    for event in &request.replacements {
        maintain_transcript_link(&mut links, catalog, &event.original_poi, &event.replacement_poi, now)?;
    }

    // The version-advancing write must commit before transcript links are
    // updated, per spec §4.7 "Atomicity": a failure here must leave the
    // previous version as canonical, which `store.save` alone already
    // guarantees (it only advances `current_version` after both the
    // versioned file and generation record are written). Only once that
    // has succeeded do we update the links that reference the new version.
    let constraint_violation_count = 0;
    let save = store.save(
        Some(&request.tour_id),
        &request.city,
        &request.language,
        document,
        SaveInputs { user_id: request.user_id.clone(), constraint_violation_count },
        now,
    )?;
    store.save_transcript_links(&request.city, &request.tour_id, &request.language, &links)?;

    Ok(ReoptimizeOutcome { save, tier })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tour::Day as TourDay;

    fn doc_with_day(day_assignments: Vec<Vec<&str>>) -> TourDocument {
        let itinerary = day_assignments
            .into_iter()
            .enumerate()
            .map(|(idx, slugs)| TourDay {
                day_number: idx as u32 + 1,
                assignments: slugs
                    .into_iter()
                    .map(|s| DayAssignment {
                        poi: s.to_string(),
                        poi_name: s.to_string(),
                        estimated_hours: 2.0,
                        coordinates: None,
                        walk_minutes_to_next: None,
                        walk_km_to_next: None,
                    })
                    .collect(),
            })
            .collect();
        TourDocument {
            tour_id: "rome-tour-test".into(),
            language: "en".into(),
            itinerary,
            scores: sequencer::Scores { distance_score: 0.8, coherence_score: 0.7, overall_score: 0.75, total_distance_km: 1.0 },
            backup_pois: HashMap::new(),
            rejected_pois: Vec::new(),
            input_parameters: crate::tour::InputParameters {
                city: "rome".into(),
                duration_days: 3,
                interests: vec![],
                pace: crate::config::Pace::Normal,
                walking_tolerance: crate::config::WalkingTolerance::Moderate,
                indoor_outdoor: crate::config::IndoorOutdoorPreference::Balanced,
                must_see: vec![],
                mode: crate::tour::PlanningMode::Ilp,
                start_location: None,
                end_location: None,
                start_date: chrono::NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(),
            },
            solver_stats: None,
            distance_cache: Matrix::default(),
        }
    }

    #[test]
    fn single_replacement_on_small_day_is_local_swap() {
        let document = doc_with_day(vec![vec!["a", "b", "c"]]);
        let events = vec![ReplacementEvent { original_poi: "a".into(), replacement_poi: "x".into(), day: 1 }];
        assert_eq!(classify(&document, &events), Tier::LocalSwap);
    }

    #[test]
    fn replacements_on_three_days_is_full_tour() {
        let document = doc_with_day(vec![vec!["a"], vec!["b"], vec!["c"]]);
        let events = vec![
            ReplacementEvent { original_poi: "a".into(), replacement_poi: "x".into(), day: 1 },
            ReplacementEvent { original_poi: "b".into(), replacement_poi: "y".into(), day: 2 },
            ReplacementEvent { original_poi: "c".into(), replacement_poi: "z".into(), day: 3 },
        ];
        assert_eq!(classify(&document, &events), Tier::FullTour);
    }

    #[test]
    fn backup_swap_maintains_symmetry() {
        let mut backups = HashMap::new();
        backups.insert(
            "forum".to_string(),
            vec![BackupCandidate { poi: "palatine".into(), similarity_score: 0.8, reason: "nearby".into() }],
        );
        maintain_backups(&mut backups, "forum", "palatine");
        let updated = backups.get("palatine").unwrap();
        assert_eq!(updated[0].poi, "forum");
        assert!(!backups.contains_key("forum"));
    }
}

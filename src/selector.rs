//! POI Selector (C4): the `Selector` port plus the core-side validation and
//! repair logic spec §4.4 requires around whatever the port returns. The
//! original delegates selection entirely to an LLM
//! (`poi_selector_agent.py::POISelectorAgent.select_pois`) with no
//! deterministic fallback — this crate mirrors that: it ships the trait and
//! a scripted test double, never a heuristic selector.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::catalog::Catalog;
use crate::combo::Issue;
use crate::config::{IndoorOutdoorPreference, Pace, PlannerConfig, WalkingTolerance};
use crate::error::PortError;
use crate::poi::Slug;

#[derive(Debug, Clone)]
pub struct SelectionRequest {
    pub city: String,
    pub duration_days: u32,
    pub interests: Vec<String>,
    pub pace: Pace,
    pub walking_tolerance: WalkingTolerance,
    pub indoor_outdoor: IndoorOutdoorPreference,
    pub must_see: Vec<Slug>,
    pub avoid: Vec<Slug>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupCandidate {
    pub poi: Slug,
    pub similarity_score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedPoi {
    pub poi: Slug,
    pub reason: String,
}

/// The raw output of a `Selector` port call, before catalog validation.
#[derive(Debug, Clone, Default)]
pub struct SelectionDecision {
    pub starting_pois: Vec<Slug>,
    pub backup_pois: HashMap<Slug, Vec<BackupCandidate>>,
    pub rejected_pois: Vec<RejectedPoi>,
    pub reasoning_summary: String,
}

/// The port the core consumes to choose a starting set, backups, and
/// rejections from a candidate pool (spec §4.4/§6). The concrete
/// LLM-backed implementation is out of scope; this crate ships only the
/// trait and a deterministic test double.
pub trait Selector {
    fn select(&self, request: &SelectionRequest, candidate_slugs: &[Slug]) -> Result<SelectionDecision, PortError>;
}

/// A deterministic test double returning a pre-scripted decision
/// regardless of the request, analogous to the original's
/// `test-google-progressive.py` stand-ins and the teacher crate's
/// canned-response test fixtures.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSelector {
    decision: SelectionDecision,
}

impl ScriptedSelector {
    pub fn new(decision: SelectionDecision) -> Self {
        Self { decision }
    }
}

impl Selector for ScriptedSelector {
    fn select(&self, _request: &SelectionRequest, _candidate_slugs: &[Slug]) -> Result<SelectionDecision, PortError> {
        Ok(self.decision.clone())
    }
}

/// The validated, repaired selection the rest of the pipeline consumes.
#[derive(Debug, Clone, Default)]
pub struct FinalSelection {
    pub starting_pois: Vec<Slug>,
    pub backup_pois: HashMap<Slug, Vec<BackupCandidate>>,
    pub rejected_pois: Vec<RejectedPoi>,
    pub reasoning_summary: String,
}

/// Reconciles a raw `SelectionDecision` against the catalog, enforcing the
/// guarantees in spec §4.4: must-see POIs always present, starting-set
/// budget respected, every catalog POI classified exactly once, invalid
/// backups dropped rather than failing the request.
#[instrument(skip(catalog, decision, config), fields(city = %catalog.city()))]
pub fn reconcile(
    catalog: &Catalog,
    request: &SelectionRequest,
    mut decision: SelectionDecision,
    config: &PlannerConfig,
) -> (FinalSelection, Vec<Issue>) {
    let mut issues = Vec::new();

    decision.starting_pois.retain(|slug| {
        let known = catalog.get(slug).is_ok();
        if !known {
            warn!(poi = %slug, "dropping unknown POI from starting set");
            issues.push(Issue::warning(format!("dropped unknown starting POI '{slug}'")));
        }
        known
    });
    decision.rejected_pois.retain(|r| {
        let known = catalog.get(&r.poi).is_ok();
        if !known {
            warn!(poi = %r.poi, "dropping unknown POI from rejected list");
        }
        known
    });
    for backups in decision.backup_pois.values_mut() {
        backups.retain(|b| {
            let known = catalog.get(&b.poi).is_ok();
            let in_range = (config.backup_min_similarity..=1.0).contains(&b.similarity_score);
            if !known {
                warn!(poi = %b.poi, "dropping unknown backup POI");
            } else if !in_range {
                warn!(poi = %b.poi, similarity = b.similarity_score, "dropping backup with out-of-range similarity");
                issues.push(Issue::warning(format!(
                    "backup '{}' has out-of-range similarity {:.2}",
                    b.poi, b.similarity_score
                )));
            }
            known && in_range
        });
    }
    decision.backup_pois.retain(|starting, _| decision.starting_pois.contains(starting));

    let starting_set: HashSet<Slug> = decision.starting_pois.iter().cloned().collect();
    decision.rejected_pois.retain(|r| !starting_set.contains(&r.poi));

    for must_see in &request.must_see {
        if catalog.get(must_see).is_err() {
            continue;
        }
        if !decision.starting_pois.contains(must_see) {
            warn!(poi = %must_see, "must-see POI missing from starting set, reinserting");
            decision.starting_pois.push(must_see.clone());
            decision.rejected_pois.retain(|r| &r.poi != must_see);
            issues.push(Issue::warning(format!("reinserted must-see POI '{must_see}'")));
        }
    }

    enforce_time_budget(catalog, request, &mut decision, config, &mut issues);

    let mut classified: HashSet<Slug> = decision.starting_pois.iter().cloned().collect();
    classified.extend(decision.rejected_pois.iter().map(|r| r.poi.clone()));
    classified.extend(decision.backup_pois.values().flatten().map(|b| b.poi.clone()));

    for poi in catalog.list() {
        if !classified.contains(&poi.slug) {
            warn!(poi = %poi.slug, "POI unclassified by selector, marking rejected");
            decision.rejected_pois.push(RejectedPoi {
                poi: poi.slug.clone(),
                reason: "not addressed by selector output".to_string(),
            });
        }
    }

    let final_selection = FinalSelection {
        starting_pois: decision.starting_pois,
        backup_pois: decision.backup_pois,
        rejected_pois: decision.rejected_pois,
        reasoning_summary: decision.reasoning_summary,
    };
    (final_selection, issues)
}

fn enforce_time_budget(
    catalog: &Catalog,
    request: &SelectionRequest,
    decision: &mut SelectionDecision,
    config: &PlannerConfig,
    issues: &mut Vec<Issue>,
) {
    let budget_hours = request.duration_days as f64 * request.pace.hours_per_day();
    let must_see: HashSet<&Slug> = request.must_see.iter().collect();

    let mut total_hours = 0.0;
    let mut kept = Vec::new();
    let mut overflow = Vec::new();
    for slug in &decision.starting_pois {
        let minutes = catalog.get(slug).map(|p| p.estimated_visit_minutes).unwrap_or(config.default_visit_duration_minutes);
        let hours = minutes as f64 / 60.0;
        if must_see.contains(slug) || total_hours + hours <= budget_hours {
            total_hours += hours;
            kept.push(slug.clone());
        } else {
            overflow.push(slug.clone());
        }
    }

    if !overflow.is_empty() {
        warn!(dropped = overflow.len(), budget_hours, "trimming starting set to fit pace budget");
        issues.push(Issue::warning(format!(
            "trimmed {} POI(s) from starting set to fit {:.1}h budget",
            overflow.len(),
            budget_hours
        )));
    }
    for slug in overflow {
        decision.rejected_pois.push(RejectedPoi { poi: slug, reason: "exceeds trip duration's walking-hours budget".to_string() });
    }
    decision.starting_pois = kept;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poi::Poi;

    fn catalog_with(pois: Vec<Poi>) -> Catalog {
        Catalog::from_parts("rome", pois, Vec::new())
    }

    #[test]
    fn must_see_always_present_even_if_selector_omits_it() {
        let colosseum = Poi::minimal("colosseum", "Colosseum", "rome");
        let catalog = catalog_with(vec![colosseum]);
        let request = SelectionRequest {
            city: "rome".into(),
            duration_days: 2,
            interests: vec![],
            pace: Pace::Normal,
            walking_tolerance: WalkingTolerance::Moderate,
            indoor_outdoor: IndoorOutdoorPreference::Balanced,
            must_see: vec!["colosseum".into()],
            avoid: vec![],
        };
        let decision = SelectionDecision::default();
        let config = PlannerConfig::default();
        let (result, issues) = reconcile(&catalog, &request, decision, &config);
        assert!(result.starting_pois.contains(&"colosseum".to_string()));
        assert!(issues.iter().any(|i| i.message.contains("reinserted must-see")));
    }

    #[test]
    fn unknown_backup_similarity_is_dropped() {
        let poi = Poi::minimal("forum", "Forum", "rome");
        let backup = Poi::minimal("palatine", "Palatine Hill", "rome");
        let catalog = catalog_with(vec![poi, backup]);
        let mut decision = SelectionDecision::default();
        decision.starting_pois.push("forum".into());
        decision.backup_pois.insert(
            "forum".into(),
            vec![BackupCandidate { poi: "palatine".into(), similarity_score: 0.1, reason: "nearby".into() }],
        );
        let request = SelectionRequest {
            city: "rome".into(),
            duration_days: 3,
            interests: vec![],
            pace: Pace::Normal,
            walking_tolerance: WalkingTolerance::Moderate,
            indoor_outdoor: IndoorOutdoorPreference::Balanced,
            must_see: vec![],
            avoid: vec![],
        };
        let config = PlannerConfig::default();
        let (result, _issues) = reconcile(&catalog, &request, decision, &config);
        assert!(result.backup_pois.get("forum").unwrap().is_empty());
    }
}

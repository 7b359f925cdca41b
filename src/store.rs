//! Tour Store (C8): versioned on-disk persistence for tours, grounded in
//! the original's `tour_manager.py::TourManager.save_tour` — same file
//! layout (`metadata.json`, per-version `tour_<v>_<L>.json`, current
//! `tour_<L>.json`, `generation_record_<v>_<L>.json`,
//! `transcript_links_<L>.json`), re-expressed with Rust's typed documents
//! instead of raw dicts and an explicit per-tour file lock instead of no
//! concurrency control at all (spec §5).
//!
//! Exclusively owns tour files on disk (spec §3 "Ownership"): no other
//! module writes under `<root>/tours/`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, TimeZone, Utc};
use rand::Rng;
use tracing::{info, instrument};

use crate::error::{Error, Result};
use crate::tour::{
    rounded_scores, version_string, GenerationRecord, Metadata, TourDocument, TourSummary, TranscriptLinks,
    VersionEntry,
};

/// Guards the per-tour file lock for the lifetime of a `save` transaction,
/// satisfying spec §5 "Concurrent edits to the same tour must serialize
/// via a per-tour mutex (file lock acceptable)."
struct TourLock {
    path: PathBuf,
}

impl TourLock {
    fn acquire(tour_dir: &Path) -> Result<Self> {
        fs::create_dir_all(tour_dir)?;
        let path = tour_dir.join(".lock");
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(Error::conflict("TOUR_LOCKED", format!("tour directory '{}' is locked by a concurrent edit", tour_dir.display())))
            }
            Err(e) => Err(Error::from(e)),
        }
    }
}

impl Drop for TourLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

pub struct TourStore<'a> {
    root: &'a Path,
}

/// Everything the caller supplies beyond the itinerary/scores already on
/// `TourDocument`, to fill out the generation record, per spec §4.8.
pub struct SaveInputs {
    pub user_id: String,
    pub constraint_violation_count: u32,
}

#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub tour_id: String,
    pub version: u32,
    pub version_string: String,
}

impl<'a> TourStore<'a> {
    pub fn new(root: &'a Path) -> Self {
        Self { root }
    }

    fn tours_root(&self) -> PathBuf {
        self.root.join("tours")
    }

    fn tour_dir(&self, city: &str, tour_id: &str) -> PathBuf {
        self.tours_root().join(city).join(tour_id)
    }

    /// Generates a world-unique-with-overwhelming-probability tour id, per
    /// spec §3: `<city-slug>-tour-<yyyymmdd>-<hhmmss>-<6-hex>`.
    pub fn new_tour_id(city: &str, now: i64) -> String {
        let dt = Utc.timestamp_opt(now, 0).single().unwrap_or_else(Utc::now);
        let mut rng = rand::thread_rng();
        let hex: String = (0..6).map(|_| std::char::from_digit(rng.gen_range(0..16), 16).unwrap()).collect();
        format!("{city}-tour-{}-{}-{hex}", dt.format("%Y%m%d"), dt.format("%H%M%S"))
    }

    fn metadata_path(&self, city: &str, tour_id: &str) -> PathBuf {
        self.tour_dir(city, tour_id).join("metadata.json")
    }

    fn current_tour_path(&self, city: &str, tour_id: &str, language: &str) -> PathBuf {
        self.tour_dir(city, tour_id).join(format!("tour_{language}.json"))
    }

    fn versioned_tour_path(&self, city: &str, tour_id: &str, language: &str, version_str: &str) -> PathBuf {
        self.tour_dir(city, tour_id).join(format!("tour_{version_str}_{language}.json"))
    }

    fn generation_record_path(&self, city: &str, tour_id: &str, language: &str, version_str: &str) -> PathBuf {
        self.tour_dir(city, tour_id).join(format!("generation_record_{version_str}_{language}.json"))
    }

    fn transcript_links_path(&self, city: &str, tour_id: &str, language: &str) -> PathBuf {
        self.tour_dir(city, tour_id).join(format!("transcript_links_{language}.json"))
    }

    pub fn load_metadata(&self, city: &str, tour_id: &str) -> Result<Metadata> {
        let path = self.metadata_path(city, tour_id);
        if !path.exists() {
            return Err(Error::not_found("TOUR_NOT_FOUND", format!("no tour '{tour_id}' in city '{city}'")));
        }
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn load_current(&self, city: &str, tour_id: &str, language: &str) -> Result<TourDocument> {
        let path = self.current_tour_path(city, tour_id, language);
        if !path.exists() {
            return Err(Error::not_found(
                "TOUR_LANGUAGE_NOT_FOUND",
                format!("tour '{tour_id}' has no saved itinerary for language '{language}'"),
            ));
        }
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn load_version(&self, city: &str, tour_id: &str, language: &str, version: u32) -> Result<TourDocument> {
        let metadata = self.load_metadata(city, tour_id)?;
        let entry = metadata
            .version_history
            .get(language)
            .and_then(|versions| versions.iter().find(|v| v.version == version))
            .ok_or_else(|| Error::not_found("TOUR_VERSION_NOT_FOUND", format!("tour '{tour_id}' has no version {version} for language '{language}'")))?;
        let path = self.versioned_tour_path(city, tour_id, language, &entry.version_string);
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn load_generation_record(&self, city: &str, tour_id: &str, language: &str, version: u32, version_date: NaiveDate) -> Result<GenerationRecord> {
        let vstr = version_string(version, version_date);
        let path = self.generation_record_path(city, tour_id, language, &vstr);
        let text = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn load_transcript_links(&self, city: &str, tour_id: &str, language: &str) -> Result<TranscriptLinks> {
        let path = self.transcript_links_path(city, tour_id, language);
        if !path.exists() {
            return Ok(TranscriptLinks::default());
        }
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Persists `links` for `language`. Callers (the Re-optimizer) are
    /// expected to call this only after the corresponding `save` for the
    /// same edit has already committed, per spec §4.7 "Atomicity": if
    /// `save` fails mid-commit the previous version stays canonical and
    /// the links are left untouched rather than pointing at a version that
    /// was never actually written.
    pub fn save_transcript_links(&self, city: &str, tour_id: &str, language: &str, links: &TranscriptLinks) -> Result<()> {
        let dir = self.tour_dir(city, tour_id);
        fs::create_dir_all(&dir)?;
        let path = self.transcript_links_path(city, tour_id, language);
        fs::write(path, serde_json::to_string_pretty(links)?)?;
        Ok(())
    }

    /// Appends a new version of `document` for `(tour_id, language)`,
    /// creating the tour if `tour_id` is `None`. Write order follows spec
    /// §5 "Ordering guarantees": the versioned file and generation record
    /// land first; only then is `tour_<L>.json` overwritten and
    /// `metadata.json`'s `current_version` pointer advanced. A failure at
    /// any point before the metadata write leaves the previous version as
    /// canonical (spec §4.7 "Atomicity" / §7 "a failed planning request
    /// never invalidates an existing tour's current pointer").
    #[instrument(skip(self, document, inputs), fields(tour_id, language = %language))]
    pub fn save(
        &self,
        tour_id: Option<&str>,
        city: &str,
        language: &str,
        mut document: TourDocument,
        inputs: SaveInputs,
        now: i64,
    ) -> Result<SaveOutcome> {
        let tour_id = tour_id.map(str::to_string).unwrap_or_else(|| Self::new_tour_id(city, now));
        let tour_dir = self.tour_dir(city, &tour_id);
        let _lock = TourLock::acquire(&tour_dir)?;

        let mut metadata = match self.load_metadata(city, &tour_id) {
            Ok(m) => m,
            Err(Error::NotFound { .. }) => Metadata::new(&tour_id, city, &inputs.user_id, now),
            Err(e) => return Err(e),
        };

        let version = metadata.current_version_for(language) + 1;
        let version_date = Utc.timestamp_opt(now, 0).single().unwrap_or_else(Utc::now).date_naive();
        let vstr = version_string(version, version_date);

        document.tour_id = tour_id.clone();
        document.language = language.to_string();
        // Scores are a persisted-document invariant (spec §3, §8 invariant 9),
        // not something every caller can be trusted to have rounded already.
        document.scores = rounded_scores(&document.scores);

        let record = GenerationRecord {
            version,
            version_string: vstr.clone(),
            language: language.to_string(),
            timestamp: now,
            user_id: inputs.user_id.clone(),
            input_parameters: document.input_parameters.clone(),
            scores: document.scores.clone(),
            constraint_violation_count: inputs.constraint_violation_count,
            solver_status: document.solver_stats.as_ref().map(|s| s.status),
            backup_pois: document.backup_pois.clone(),
            rejected_pois: document.rejected_pois.clone(),
        };

        // 1. Versioned file. 2. Generation record. Both must exist before
        // the current pointer is touched.
        fs::write(self.versioned_tour_path(city, &tour_id, language, &vstr), serde_json::to_string_pretty(&document)?)?;
        fs::write(self.generation_record_path(city, &tour_id, language, &vstr), serde_json::to_string_pretty(&record)?)?;

        // 3. Overwrite current-language pointer file.
        fs::write(self.current_tour_path(city, &tour_id, language), serde_json::to_string_pretty(&document)?)?;

        // 4. Advance metadata last.
        if !metadata.languages.iter().any(|l| l == language) {
            metadata.languages.push(language.to_string());
        }
        metadata.current_version.insert(language.to_string(), version);
        metadata.version_history.entry(language.to_string()).or_default().push(VersionEntry {
            version,
            version_string: vstr.clone(),
            timestamp: now,
            user_id: inputs.user_id,
            input_hash: document.input_parameters.hash(),
            optimization_score: document.scores.overall_score,
            constraint_violation_count: inputs.constraint_violation_count,
        });
        metadata.updated_at = now;
        fs::write(self.metadata_path(city, &tour_id), serde_json::to_string_pretty(&metadata)?)?;

        info!(tour_id = %tour_id, version, "tour version saved");
        Ok(SaveOutcome { tour_id, version, version_string: vstr })
    }

    /// Lists all tours under all cities, sorted by `updated_at` desc, per
    /// spec §4.8 "Listing".
    pub fn list(&self) -> Result<Vec<TourSummary>> {
        let mut summaries = Vec::new();
        let root = self.tours_root();
        if !root.is_dir() {
            return Ok(summaries);
        }
        for city_entry in fs::read_dir(&root)? {
            let city_entry = city_entry?;
            if !city_entry.path().is_dir() {
                continue;
            }
            for tour_entry in fs::read_dir(city_entry.path())? {
                let tour_entry = tour_entry?;
                let path = tour_entry.path();
                if !path.is_dir() {
                    continue;
                }
                let metadata_path = path.join("metadata.json");
                if !metadata_path.exists() {
                    continue;
                }
                let text = fs::read_to_string(&metadata_path)?;
                let metadata: Metadata = serde_json::from_str(&text)?;
                summaries.push(TourSummary {
                    tour_id: metadata.tour_id,
                    city: metadata.city,
                    updated_at: metadata.updated_at,
                    current_version_by_language: metadata.current_version,
                });
            }
        }
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IndoorOutdoorPreference, Pace, WalkingTolerance};
    use crate::sequencer::Scores;
    use crate::tour::{InputParameters, PlanningMode};

    fn sample_document() -> TourDocument {
        TourDocument {
            tour_id: String::new(),
            language: String::new(),
            itinerary: Vec::new(),
            scores: Scores { distance_score: 0.8, coherence_score: 0.7, overall_score: 0.75, total_distance_km: 3.2 },
            backup_pois: HashMap::new(),
            rejected_pois: Vec::new(),
            input_parameters: InputParameters {
                city: "rome".into(),
                duration_days: 2,
                interests: vec!["history".into()],
                pace: Pace::Normal,
                walking_tolerance: WalkingTolerance::Moderate,
                indoor_outdoor: IndoorOutdoorPreference::Balanced,
                must_see: vec![],
                mode: PlanningMode::Ilp,
                start_location: None,
                end_location: None,
                start_date: NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(),
            },
            solver_stats: None,
            distance_cache: crate::distance::Matrix::default(),
        }
    }

    #[test]
    fn save_then_load_round_trips_and_versions_monotonically() {
        let dir = tempfile_dir();
        let store = TourStore::new(&dir);
        let inputs = SaveInputs { user_id: "alice".into(), constraint_violation_count: 0 };
        let first = store.save(None, "rome", "en", sample_document(), inputs, 1_700_000_000).unwrap();
        assert_eq!(first.version, 1);

        let inputs2 = SaveInputs { user_id: "alice".into(), constraint_violation_count: 0 };
        let second = store.save(Some(&first.tour_id), "rome", "en", sample_document(), inputs2, 1_700_000_100).unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(second.tour_id, first.tour_id);

        let metadata = store.load_metadata("rome", &first.tour_id).unwrap();
        assert_eq!(metadata.current_version_for("en"), 2);
        assert_eq!(metadata.version_history.get("en").unwrap().len(), 2);
    }

    #[test]
    fn languages_are_isolated() {
        let dir = tempfile_dir();
        let store = TourStore::new(&dir);
        let en_inputs = SaveInputs { user_id: "alice".into(), constraint_violation_count: 0 };
        let first = store.save(None, "rome", "en", sample_document(), en_inputs, 1_700_000_000).unwrap();

        let zh_inputs = SaveInputs { user_id: "alice".into(), constraint_violation_count: 0 };
        store.save(Some(&first.tour_id), "rome", "zh-tw", sample_document(), zh_inputs, 1_700_000_050).unwrap();

        let en2_inputs = SaveInputs { user_id: "alice".into(), constraint_violation_count: 0 };
        store.save(Some(&first.tour_id), "rome", "en", sample_document(), en2_inputs, 1_700_000_100).unwrap();

        let metadata = store.load_metadata("rome", &first.tour_id).unwrap();
        assert_eq!(metadata.current_version_for("en"), 2);
        assert_eq!(metadata.current_version_for("zh-tw"), 1);
        assert!(metadata.languages.contains(&"en".to_string()));
        assert!(metadata.languages.contains(&"zh-tw".to_string()));
    }

    fn tempfile_dir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        let mut rng = rand::thread_rng();
        let suffix: u64 = rng.gen();
        dir.push(format!("tour-planner-test-{suffix}"));
        fs::create_dir_all(&dir).unwrap();
        dir
    }
}

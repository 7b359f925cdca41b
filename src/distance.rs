//! Distance Cache (C2): memoizes pairwise travel times/distances per
//! transport mode, with incremental extension so new POIs don't force a
//! quadratic re-query of already-known pairs.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::config::PlannerConfig;
use crate::error::Result;
use crate::geo_provider::{DistanceRowStatus, GeoProvider, TravelMode};
use crate::poi::Poi;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PairDistance {
    pub duration_minutes: f64,
    pub distance_km: f64,
}

fn mode_key(mode: TravelMode) -> &'static str {
    match mode {
        TravelMode::Walking => "walking",
        TravelMode::Transit => "transit",
        TravelMode::Driving => "driving",
    }
}

/// For a city: every known ordered pair with at least one mode computed.
/// Pairs are keyed mode-independently (`origin, dest`) so modes populate
/// incrementally, per spec §3.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Matrix {
    pub generated_at: i64,
    pub poi_count: usize,
    /// `(origin_slug, dest_slug, mode) -> distance`. Missing coordinate
    /// pairs are simply absent, never defaulted (spec §4.2).
    pairs: HashMap<(String, String, String), PairDistance>,
}

impl Matrix {
    pub fn lookup(&self, origin_id: &str, dest_id: &str, mode: TravelMode) -> Option<PairDistance> {
        if origin_id == dest_id {
            return Some(PairDistance { duration_minutes: 0.0, distance_km: 0.0 });
        }
        self.pairs.get(&(origin_id.to_string(), dest_id.to_string(), mode_key(mode).to_string())).copied()
    }

    fn insert(&mut self, origin_id: &str, dest_id: &str, mode: TravelMode, value: PairDistance) {
        self.pairs.insert((origin_id.to_string(), dest_id.to_string(), mode_key(mode).to_string()), value);
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    fn merge(&mut self, other: Matrix) {
        for (key, value) in other.pairs {
            self.pairs.entry(key).or_insert(value);
        }
    }
}

/// Batch size cap per origin/destination dimension, per spec §4.2/§6.
pub const BATCH_SIZE_LIMIT: usize = 25;

const MODES: [TravelMode; 3] = [TravelMode::Walking, TravelMode::Transit, TravelMode::Driving];

/// Loads a persisted matrix for `city`, or an empty one if none exists.
pub fn load(root: &Path, city: &str) -> Result<Matrix> {
    let path = matrix_path(root, city);
    if !path.exists() {
        return Ok(Matrix::default());
    }
    let text = fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&text)?)
}

pub fn persist(root: &Path, city: &str, matrix: &Matrix) -> Result<()> {
    let path = matrix_path(root, city);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(matrix)?)?;
    Ok(())
}

fn matrix_path(root: &Path, city: &str) -> std::path::PathBuf {
    root.join("distance_cache").join(format!("{city}.json"))
}

/// Computes the full N×N matrix for `pois`, batching origin/destination
/// lists at `config.distance_batch_size` (capped at `BATCH_SIZE_LIMIT`) and
/// fanning batches out across a rayon pool sized to `config.search_workers`
/// (spec §5).
#[instrument(skip(pois, provider, config), fields(poi_count = pois.len()))]
pub fn compute_all(
    pois: &[&Poi],
    provider: &(impl GeoProvider + Sync),
    config: &PlannerConfig,
) -> Result<Matrix> {
    let coords: Vec<(&str, (f64, f64))> = pois
        .iter()
        .filter_map(|p| p.coordinates().map(|c| (p.slug.as_str(), c)))
        .collect();

    let matrix = build_matrix(&coords, &coords, provider, config)?;
    info!(pairs = matrix.pair_count(), "computed full distance matrix");
    Ok(matrix)
}

/// Computes only the `new ↔ existing` rows and columns (both directions)
/// and merges into `existing_matrix`. Never re-queries pairs already
/// present — a no-op when `new_pois` is empty, and idempotent when called
/// twice for the same new POI (spec §8 invariant 7).
#[instrument(skip(new_pois, existing_pois, provider, existing_matrix, config))]
pub fn extend(
    new_pois: &[&Poi],
    existing_pois: &[&Poi],
    provider: &(impl GeoProvider + Sync),
    existing_matrix: &Matrix,
    config: &PlannerConfig,
) -> Result<Matrix> {
    if new_pois.is_empty() {
        return Ok(existing_matrix.clone());
    }

    let new_coords: Vec<(&str, (f64, f64))> = new_pois
        .iter()
        .filter_map(|p| p.coordinates().map(|c| (p.slug.as_str(), c)))
        .collect();
    let existing_coords: Vec<(&str, (f64, f64))> = existing_pois
        .iter()
        .filter_map(|p| p.coordinates().map(|c| (p.slug.as_str(), c)))
        .collect();

    let mut delta = build_matrix(&new_coords, &existing_coords, provider, config)?;
    let reverse = build_matrix(&existing_coords, &new_coords, provider, config)?;
    delta.merge(reverse);
    let within_new = build_matrix(&new_coords, &new_coords, provider, config)?;
    delta.merge(within_new);

    let mut merged = existing_matrix.clone();
    merged.poi_count = existing_matrix.poi_count + new_pois.len();
    merged.merge(delta);
    info!(added_pois = new_pois.len(), pairs = merged.pair_count(), "extended distance matrix");
    Ok(merged)
}

fn build_matrix(
    origins: &[(&str, (f64, f64))],
    destinations: &[(&str, (f64, f64))],
    provider: &(impl GeoProvider + Sync),
    config: &PlannerConfig,
) -> Result<Matrix> {
    let batch_size = config.distance_batch_size.min(BATCH_SIZE_LIMIT).max(1);
    let origin_batches: Vec<&[(&str, (f64, f64))]> = origins.chunks(batch_size).collect();
    let dest_batches: Vec<&[(&str, (f64, f64))]> = destinations.chunks(batch_size).collect();

    let tasks: Vec<(&[(&str, (f64, f64))], &[(&str, (f64, f64))])> = origin_batches
        .iter()
        .flat_map(|o| dest_batches.iter().map(move |d| (*o, *d)))
        .collect();

    let partials: Vec<Result<Matrix>> = tasks
        .par_iter()
        .map(|(origin_batch, dest_batch)| query_batch(origin_batch, dest_batch, provider))
        .collect();

    let mut matrix = Matrix { generated_at: 0, poi_count: 0, pairs: HashMap::new() };
    for partial in partials {
        matrix.merge(partial?);
    }
    Ok(matrix)
}

fn query_batch(
    origin_batch: &[(&str, (f64, f64))],
    dest_batch: &[(&str, (f64, f64))],
    provider: &(impl GeoProvider + Sync),
) -> Result<Matrix> {
    let mut matrix = Matrix { generated_at: 0, poi_count: 0, pairs: HashMap::new() };
    if origin_batch.is_empty() || dest_batch.is_empty() {
        return Ok(matrix);
    }

    let origin_coords: Vec<(f64, f64)> = origin_batch.iter().map(|(_, c)| *c).collect();
    let dest_coords: Vec<(f64, f64)> = dest_batch.iter().map(|(_, c)| *c).collect();

    for mode in MODES {
        let rows = provider.distance_matrix(&origin_coords, &dest_coords, mode).map_err(|e| e.into_error(false))?;

        for (i, row) in rows.iter().enumerate() {
            let (origin_id, _) = origin_batch[i];
            for (j, cell) in row.iter().enumerate() {
                let (dest_id, _) = dest_batch[j];
                if origin_id == dest_id {
                    continue;
                }
                if cell.status != DistanceRowStatus::Ok {
                    continue;
                }
                if let (Some(duration_s), Some(distance_m)) = (cell.duration_seconds, cell.distance_meters) {
                    matrix.insert(
                        origin_id,
                        dest_id,
                        mode,
                        PairDistance {
                            duration_minutes: duration_s as f64 / 60.0,
                            distance_km: distance_m as f64 / 1000.0,
                        },
                    );
                }
            }
        }
    }

    Ok(matrix)
}

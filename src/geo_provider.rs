//! `GeoProvider` port (spec §6): the interface the core uses to reach the
//! Google Maps API (Places, Geocoding, Distance Matrix). The concrete
//! client is an out-of-scope external collaborator (spec §1) — this module
//! defines only the trait and the data it exchanges, plus a deterministic
//! in-memory implementation for tests.

use std::collections::HashMap;

use crate::error::PortError;
use crate::poi::{GeoPoint, OpeningHours};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TravelMode {
    Walking,
    Transit,
    Driving,
}

#[derive(Debug, Clone)]
pub struct PlaceDetails {
    pub coords: GeoPoint,
    pub periods: OpeningHours,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub rating: Option<f64>,
    pub price_level: Option<i32>,
    pub types: Vec<String>,
    pub wheelchair_accessible: Option<bool>,
    pub place_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceRowStatus {
    Ok,
    NotFound,
    ZeroResults,
}

#[derive(Debug, Clone, Copy)]
pub struct DistanceRow {
    pub duration_seconds: Option<i64>,
    pub distance_meters: Option<i64>,
    pub status: DistanceRowStatus,
}

/// The port the core consumes for Places/Geocoding/Distance Matrix calls.
/// Every call is blocking I/O with its own per-call timeout (spec §5); the
/// port reports transient vs. permanent failures explicitly rather than
/// the core guessing from a status code it never sees.
pub trait GeoProvider {
    fn place_details(&self, name: &str, city: &str) -> Result<PlaceDetails, PortError>;

    fn geocode(&self, name: &str, city: &str) -> Result<GeoPoint, PortError>;

    /// Batch size per dimension is capped at 25 by the port contract (spec
    /// §6); callers are responsible for chunking `origins`/`destinations`
    /// accordingly (see `crate::distance::BATCH_SIZE_LIMIT`).
    fn distance_matrix(
        &self,
        origins: &[(f64, f64)],
        destinations: &[(f64, f64)],
        mode: TravelMode,
    ) -> Result<Vec<Vec<DistanceRow>>, PortError>;
}

/// A deterministic in-memory `GeoProvider` for tests: returns pre-seeded
/// place details and a straight-line-derived distance matrix (at a fixed
/// assumed walking speed) instead of calling out to Maps.
#[derive(Debug, Clone, Default)]
pub struct StaticGeoProvider {
    places: HashMap<String, PlaceDetails>,
    walking_speed_kmh: f64,
}

impl StaticGeoProvider {
    pub fn new(walking_speed_kmh: f64) -> Self {
        Self { places: HashMap::new(), walking_speed_kmh }
    }

    pub fn with_place(mut self, name: impl Into<String>, details: PlaceDetails) -> Self {
        self.places.insert(name.into(), details);
        self
    }
}

impl GeoProvider for StaticGeoProvider {
    fn place_details(&self, name: &str, _city: &str) -> Result<PlaceDetails, PortError> {
        self.places
            .get(name)
            .cloned()
            .ok_or_else(|| PortError::permanent(format!("no seeded place details for '{name}'")))
    }

    fn geocode(&self, name: &str, city: &str) -> Result<GeoPoint, PortError> {
        self.place_details(name, city).map(|d| d.coords)
    }

    fn distance_matrix(
        &self,
        origins: &[(f64, f64)],
        destinations: &[(f64, f64)],
        mode: TravelMode,
    ) -> Result<Vec<Vec<DistanceRow>>, PortError> {
        let speed = match mode {
            TravelMode::Walking => self.walking_speed_kmh,
            TravelMode::Transit => self.walking_speed_kmh * 5.0,
            TravelMode::Driving => self.walking_speed_kmh * 8.0,
        };
        Ok(origins
            .iter()
            .map(|from| {
                destinations
                    .iter()
                    .map(|to| {
                        let km = crate::haversine::haversine_km(*from, *to);
                        let hours = km / speed;
                        DistanceRow {
                            duration_seconds: Some((hours * 3600.0).round() as i64),
                            distance_meters: Some((km * 1000.0).round() as i64),
                            status: DistanceRowStatus::Ok,
                        }
                    })
                    .collect()
            })
            .collect())
    }
}

//! The POI data model: a typed `POI` with an optional `OpeningHours` that
//! owns `Periods`, replacing the original's `poi['metadata']['operation_hours']
//! ['periods']` nested-dict pattern (spec §9). Callers traverse explicit
//! `Option`s, never raise-on-miss lookups.

use serde::{Deserialize, Serialize};

/// Where a POI's coordinates came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateSource {
    Api,
    Geocoder,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndoorOutdoor {
    Indoor,
    Outdoor,
    Mixed,
    Unknown,
}

/// Geographic point plus provenance, per spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub source: CoordinateSource,
    /// Unix timestamp (seconds) the coordinates were collected.
    pub collected_at: i64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }

    pub fn as_tuple(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }
}

/// A single opening period: `day_of_week` is 0..6 with Sunday = 0, and
/// `open_hhmm`/`close_hhmm` are 4-digit HHMM values in 0..2359.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub day_of_week: u8,
    pub open_hhmm: u16,
    pub close_hhmm: u16,
}

impl Period {
    pub fn admits(&self, day_of_week: u8, hhmm: u16) -> bool {
        self.day_of_week == day_of_week && self.open_hhmm <= hhmm && hhmm <= self.close_hhmm
    }
}

/// An ordered list of opening periods. Owns its periods rather than the
/// original's bare list-of-dicts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningHours {
    pub periods: Vec<Period>,
}

impl OpeningHours {
    pub fn new(periods: Vec<Period>) -> Self {
        Self { periods }
    }

    /// A POI is open at `hhmm` local time on `day_of_week` iff some period
    /// admits it, per spec §3.
    pub fn is_open(&self, day_of_week: u8, hhmm: u16) -> bool {
        self.periods.iter().any(|p| p.admits(day_of_week, hhmm))
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }
}

/// A single preferred booking slot, HHMM-to-HHMM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferredSlot {
    pub start_hhmm: u16,
    pub end_hhmm: u16,
}

impl PreferredSlot {
    pub fn contains(&self, hhmm: u16) -> bool {
        self.start_hhmm <= hhmm && hhmm <= self.end_hhmm
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookingInfo {
    pub required: bool,
    pub advance_days: Option<i32>,
    #[serde(default)]
    pub preferred_slots: Vec<PreferredSlot>,
    pub url: Option<String>,
}

impl BookingInfo {
    /// Whether `hhmm` satisfies this POI's preferred-slot constraint. A POI
    /// with booking required but no preferred slots declared has no
    /// additional constraint beyond opening hours (spec §4.5).
    pub fn admits_preferred(&self, hhmm: u16) -> bool {
        if !self.required || self.preferred_slots.is_empty() {
            return true;
        }
        self.preferred_slots.iter().any(|s| s.contains(hhmm))
    }
}

/// A stable, lowercase, hyphenated identifier.
pub type Slug = String;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    pub slug: Slug,
    pub name: String,
    pub city: String,

    pub location: Option<GeoPoint>,

    #[serde(default = "default_visit_minutes")]
    pub estimated_visit_minutes: i32,

    #[serde(default)]
    pub indoor_outdoor: Option<IndoorOutdoor>,

    #[serde(default)]
    pub opening_hours: OpeningHours,

    #[serde(default)]
    pub booking: BookingInfo,

    /// Combo-group slugs this POI claims membership in; resolved to full
    /// `ComboGroup`s by the catalog at enrichment time.
    #[serde(default)]
    pub combo_group_ids: Vec<String>,

    pub address: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub rating: Option<f64>,
    pub wheelchair_accessible: Option<bool>,
    pub historical_period: Option<String>,
    pub construction_date: Option<String>,

    /// Free-text notes carried over from the original `metadata.notes`
    /// field (spec SPEC_FULL §3); no planning semantics.
    pub notes: Option<String>,

    /// Explicit `must_visit_after` annotations (POI slugs), honored as hard
    /// precedence constraints by the Sequencer alongside coherence-derived
    /// precedence (spec §4.5).
    #[serde(default)]
    pub must_visit_after: Vec<Slug>,

    /// Combo groups resolved by the catalog at load time. Not part of the
    /// on-disk record; populated during enrichment.
    #[serde(skip)]
    pub combo_groups: Vec<crate::combo::ComboGroup>,
}

fn default_visit_minutes() -> i32 {
    120
}

impl Poi {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.location.as_ref().map(|p| p.as_tuple())
    }

    /// A bare POI with only identity fields set, for tests that only care
    /// about one or two fields.
    #[cfg(test)]
    pub fn minimal(slug: &str, name: &str, city: &str) -> Self {
        Self {
            slug: slug.to_string(),
            name: name.to_string(),
            city: city.to_string(),
            estimated_visit_minutes: default_visit_minutes(),
            ..Default::default()
        }
    }
}

//! Shared test fixtures for tour-planner's integration tests.
//!
//! Mirrors the teacher crate's `tests/fixtures/mod.rs` split: real-ish
//! location data plus small builders, re-exported for every integration
//! test file to share.

pub mod rome;

pub use rome::*;

use tour_planner::catalog::Catalog;
use tour_planner::combo::{ComboConstraints, ComboGroup, TicketType, VisitOrder};
use tour_planner::poi::{CoordinateSource, GeoPoint, OpeningHours, Period, Poi};

/// A POI open every day, all hours — for scenarios where opening-hours
/// feasibility isn't the thing under test.
pub fn open_all_week() -> OpeningHours {
    OpeningHours::new((0..7).map(|d| Period { day_of_week: d, open_hhmm: 0, close_hhmm: 2359 }).collect())
}

pub fn poi(slug: &str, name: &str, lat: f64, lng: f64) -> Poi {
    Poi {
        slug: slug.to_string(),
        name: name.to_string(),
        city: "rome".to_string(),
        location: Some(GeoPoint { latitude: lat, longitude: lng, source: CoordinateSource::Manual, collected_at: 0 }),
        estimated_visit_minutes: 120,
        opening_hours: open_all_week(),
        ..Default::default()
    }
}

/// Attaches combo-group id membership to a POI's `combo_group_ids`, so
/// `Catalog::validate`'s bidirectional-invariant check passes alongside
/// the `ComboGroup.members` side set up by `combo_group`.
pub fn with_combo_ids(mut p: Poi, ids: &[&str]) -> Poi {
    p.combo_group_ids = ids.iter().map(|s| s.to_string()).collect();
    p
}

pub fn combo_group(id: &str, members: &[&str], must_visit_together: bool, ticket_type: TicketType) -> ComboGroup {
    ComboGroup {
        id: id.to_string(),
        city: "rome".to_string(),
        members: members.iter().map(|m| m.to_string()).collect(),
        constraints: ComboConstraints {
            must_visit_together,
            max_separation_hours: 4.0,
            visit_order: VisitOrder::Flexible,
            same_day_required: must_visit_together,
            ticket_type,
        },
    }
}

pub fn catalog_from(pois: Vec<Poi>, groups: Vec<ComboGroup>) -> Catalog {
    Catalog::from_parts("rome", pois, groups)
}
